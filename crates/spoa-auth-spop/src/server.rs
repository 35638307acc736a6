//! TCP listener for proxy connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use spoa_auth_types::AuthenticatorRouter;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::config::AgentConfig;
use crate::connection::Connection;

/// Accepts proxy connections and runs one [`Connection`] task per socket.
pub struct AgentServer {
    router: AuthenticatorRouter,
    config: Arc<AgentConfig>,
}

impl AgentServer {
    pub fn new(router: AuthenticatorRouter, config: AgentConfig) -> Self {
        Self {
            router,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Bind the configured address.
    ///
    /// Returns the listener so callers (and tests binding port 0) can learn
    /// the actual address before serving.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.config.bind_address).await
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Once shutdown is requested no new connections are accepted; live ones
    /// are served to completion before this returns.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send,
    ) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            actions = ?self.router.actions(),
            "Starting SPOP agent"
        );

        let tracker = TaskTracker::new();
        tokio::pin!(shutdown);

        loop {
            let (socket, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        // Transient (e.g. EMFILE); keep accepting.
                        tracing::warn!(error = %err, "Failed to accept connection");
                        continue;
                    }
                },
            };

            if let Err(err) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %err, "Could not set TCP_NODELAY");
            }

            let connection = Connection::new(self.router.clone(), Arc::clone(&self.config), peer);
            let span = tracing::info_span!("spop_connection", peer = %peer);
            tracker.spawn(
                async move {
                    tracing::debug!("Accepted proxy connection");
                    match connection.run(socket).await {
                        Ok(()) => tracing::debug!("Connection closed"),
                        Err(err) if err.is_transport_failure() => {
                            tracing::debug!(error = %err, "Connection lost");
                        }
                        Err(err) => tracing::warn!(error = %err, "Connection closed on error"),
                    }
                }
                .instrument(span),
            );
        }

        drop(listener);
        tracker.close();
        tracing::info!(
            live_connections = tracker.len(),
            "Stopped accepting, waiting for live connections"
        );
        tracker.wait().await;
        tracing::info!("SPOP agent stopped");
        Ok(())
    }

    /// Bind and serve in the background; returns the bound address.
    pub async fn spawn(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<SocketAddr> {
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = self.serve(listener, shutdown).await {
                tracing::error!(error = %err, "SPOP agent failed");
            }
        });
        Ok(addr)
    }
}
