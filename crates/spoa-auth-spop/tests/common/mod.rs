//! Shared helpers: an agent on an ephemeral port and a minimal proxy peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use spoa_auth_spop::{Action, AgentConfig, AgentServer, Frame, FrameCodec, Payload};
use spoa_auth_types::testing::{EchoAuthenticator, FailingAuthenticator};
use spoa_auth_types::{AuthError, AuthenticatorRouter, TypedData};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;

/// Default read deadline so a broken agent fails the test instead of hanging it.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// An agent serving in the background until dropped.
pub struct TestAgent {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestAgent {
    /// Agent with `echo`, `slow-echo` and `broken` actions.
    pub async fn start() -> Result<Self> {
        Self::start_with(AgentConfig::new("127.0.0.1:0".parse()?)).await
    }

    pub async fn start_with(config: AgentConfig) -> Result<Self> {
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register("echo", Arc::new(EchoAuthenticator::new("user")))?
            .register(
                "slow-echo",
                Arc::new(EchoAuthenticator::new("user").with_delay(Duration::from_millis(300))),
            )?
            .register(
                "broken",
                Arc::new(FailingAuthenticator::new(AuthError::Upstream(
                    "connection refused".into(),
                ))),
            )?;

        let (tx, rx) = oneshot::channel::<()>();
        let server = AgentServer::new(builder.build(), config);
        let addr = server
            .spawn(async move {
                let _ = rx.await;
            })
            .await?;

        Ok(Self {
            addr,
            shutdown: Some(tx),
        })
    }

    /// Stop accepting new connections.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Plays the proxy side of the protocol.
pub struct TestProxy {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestProxy {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::default()),
        })
    }

    /// Connect and complete a HELLO exchange with the given capabilities.
    pub async fn established(addr: SocketAddr, capabilities: &str, max_frame_size: u32) -> Result<Self> {
        let mut proxy = Self::connect(addr).await?;
        proxy.send(hello(capabilities, max_frame_size)).await?;
        let reply = proxy.recv().await?.context("agent closed during handshake")?;
        anyhow::ensure!(
            reply.frame_type == spoa_auth_spop::FrameType::AgentHello,
            "expected AGENT-HELLO, got {:?}",
            reply.frame_type
        );
        Ok(proxy)
    }

    pub async fn send(&mut self, frame: Frame) -> Result<()> {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Next frame, or `None` once the agent closed the socket.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        match tokio::time::timeout(READ_TIMEOUT, self.framed.next()).await {
            Ok(Some(frame)) => Ok(Some(frame?)),
            Ok(None) => Ok(None),
            Err(_) => anyhow::bail!("no frame within {:?}", READ_TIMEOUT),
        }
    }

    /// Write raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.framed.get_mut().write_all(bytes).await?;
        Ok(())
    }
}

pub fn hello(capabilities: &str, max_frame_size: u32) -> Frame {
    Frame::haproxy_hello(vec![
        ("supported-versions".into(), TypedData::from("2.0")),
        ("max-frame-size".into(), TypedData::Uint32(max_frame_size)),
        ("capabilities".into(), TypedData::from(capabilities)),
        ("engine-id".into(), TypedData::from("test-engine")),
    ])
}

/// Variables set by an ACK, in order.
pub fn ack_vars(frame: &Frame) -> Vec<(String, TypedData)> {
    match &frame.payload {
        Payload::Actions(actions) => actions
            .iter()
            .filter_map(|action| match action {
                Action::SetVar { name, value, .. } => Some((name.clone(), value.clone())),
                Action::UnsetVar { .. } => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn var<'a>(vars: &'a [(String, TypedData)], name: &str) -> Option<&'a TypedData> {
    vars.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}
