//! Check-config command - validates a configuration without serving.

use anyhow::{Context as _, Result};
use clap::Args;

use super::Context;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {}

pub async fn run(_args: CheckConfigArgs, ctx: &Context) -> Result<()> {
    let loaded = spoa_auth_config::load_config(ctx.config_path.as_deref())
        .context("failed to load configuration")?;
    loaded
        .config
        .validate()
        .with_context(|| format!("{} is invalid", loaded.source.display()))?;
    spoa_auth::wiring::agent_config(&loaded.config, ctx.listen)?;

    println!("{}: ok", loaded.source.display());
    for (action, kind) in loaded.config.effective_actions() {
        println!("  {} -> {}", action, kind.as_str());
    }
    for warning in &loaded.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}
