//! Serve command - runs the agent until interrupted.

use anyhow::{Context as _, Result};
use clap::Args;
use spoa_auth::wiring;
use spoa_auth_oidc::CallbackServer;
use spoa_auth_spop::AgentServer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::Context;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {}

pub async fn run(_args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = spoa_auth_config::load_config(ctx.config_path.as_deref())
        .context("failed to load configuration")?;
    let config = &loaded.config;

    // Logging depends on the config, so it starts here.
    let _guard = spoa_auth::logging::init(&config.logging, ctx.verbose)?;
    tracing::info!(config = %loaded.source.display(), "Loaded configuration");
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    config.validate().context("invalid configuration")?;
    let agent_config = wiring::agent_config(config, ctx.listen)?;
    let authenticators = wiring::build_authenticators(config).await?;

    let shutdown = CancellationToken::new();

    let callback = match (&authenticators.oidc, &config.oidc) {
        (Some(engine), Some(section)) => {
            let addr = section.callback_socket_addr()?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind OIDC callback address {}", addr))?;
            let server = CallbackServer::new(engine.clone(), addr);
            let token = shutdown.clone();
            Some(tokio::spawn(server.serve(listener, async move {
                token.cancelled().await
            })))
        }
        _ => None,
    };

    let agent = AgentServer::new(authenticators.router, agent_config);
    let listener = agent
        .bind()
        .await
        .with_context(|| format!("failed to bind {}", agent.config().bind_address))?;

    let token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested");
        token.cancel();
    });

    let token = shutdown.clone();
    let served = agent
        .serve(listener, async move { token.cancelled().await })
        .await;
    shutdown.cancel();

    if let Some(callback) = callback {
        callback
            .await
            .context("OIDC callback server task failed")?
            .context("OIDC callback server failed")?;
    }
    served.context("SPOP agent failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
