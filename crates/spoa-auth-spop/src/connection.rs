//! Per-connection multiplexer.
//!
//! One [`Connection`] serves one proxy socket. The read side runs in the
//! calling task: it performs the HELLO exchange, then reads frames and spawns
//! one task per NOTIFY. Every frame the agent sends goes through a single
//! writer task fed by a channel, so concurrent evaluations never interleave
//! bytes on the socket.
//!
//! Frames of different streams are evaluated and acknowledged independently.
//! Within one stream, ACKs leave in the order the NOTIFY frames arrived.
//!
//! ```text
//! AwaitingHello ──HELLO ok──▶ Established ──DISCONNECT / error──▶ Closing ──▶ Closed
//!       │                                                           ▲
//!       └──────────────── bad HELLO / timeout ──────────────────────┘
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use spoa_auth_types::{AuthError, AuthenticatorRouter, RouterError, Verdict};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::FrameCodec;
use crate::config::AgentConfig;
use crate::error::{DisconnectStatus, ProtocolError, Result};
use crate::frame::{Action, Frame, FrameType, Message, Payload, VarScope, decode_messages};
use crate::handshake::{Negotiated, negotiate};
use crate::reassembly::{Fragment, ReassemblyBuffer};

type Reader<S> = FramedRead<ReadHalf<S>, FrameCodec>;
type Writer<S> = FramedWrite<WriteHalf<S>, FrameCodec>;

/// Lifecycle of a proxy connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingHello,
    Established,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::AwaitingHello => "awaiting_hello",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Frames queued for the writer task.
#[derive(Debug)]
enum Outbound {
    /// Dropped once the connection is closing.
    Ack(Frame),
    /// Written unconditionally; the writer stops after it.
    Disconnect(Frame),
}

/// A single proxy connection.
pub struct Connection {
    router: AuthenticatorRouter,
    config: Arc<AgentConfig>,
    peer: SocketAddr,
    state: ConnectionState,
}

impl Connection {
    pub fn new(router: AuthenticatorRouter, config: Arc<AgentConfig>, peer: SocketAddr) -> Self {
        Self {
            router,
            config,
            peer,
            state: ConnectionState::AwaitingHello,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(
                peer = %self.peer,
                from = self.state.as_str(),
                to = next.as_str(),
                "Connection state change"
            );
            self.state = next;
        }
    }

    /// Serve the connection until the peer leaves or a protocol error occurs.
    ///
    /// Protocol errors are reported to the peer with AGENT-DISCONNECT before
    /// being returned.
    pub async fn run<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (rd, wr) = tokio::io::split(stream);
        let mut reader = FramedRead::new(rd, FrameCodec::new(self.config.max_frame_size));
        let mut writer = FramedWrite::new(wr, FrameCodec::new(self.config.max_frame_size));

        let negotiated = match self.handshake(&mut reader).await {
            Ok(negotiated) => negotiated,
            Err(err) => {
                self.transition(ConnectionState::Closing);
                if !err.is_transport_failure() {
                    send_disconnect(&mut writer, err.status()).await;
                }
                self.transition(ConnectionState::Closed);
                return Err(err);
            }
        };

        reader
            .decoder_mut()
            .set_max_frame_size(negotiated.max_frame_size);
        writer
            .encoder_mut()
            .set_max_frame_size(negotiated.max_frame_size);
        if let Err(err) = writer.send(negotiated.agent_hello()).await {
            self.transition(ConnectionState::Closed);
            return Err(err);
        }
        self.transition(ConnectionState::Established);

        tracing::info!(
            peer = %self.peer,
            engine_id = negotiated.engine_id.as_deref().unwrap_or("-"),
            max_frame_size = negotiated.max_frame_size,
            pipelining = negotiated.pipelining,
            fragmentation = negotiated.fragmentation,
            actions = ?self.router.actions(),
            "Handshake complete"
        );

        if negotiated.healthcheck {
            tracing::debug!(peer = %self.peer, "Healthcheck answered, closing");
            self.transition(ConnectionState::Closing);
            self.transition(ConnectionState::Closed);
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.max_in_flight + 4);
        let writer_task = tokio::spawn(write_loop(writer, rx, cancel.clone(), self.peer));

        let read_result = self
            .read_loop(&mut reader, &negotiated, tx, &cancel)
            .await;
        self.transition(ConnectionState::Closing);
        cancel.cancel();

        let write_result = match writer_task.await {
            Ok(result) => result,
            Err(join_err) => Err(ProtocolError::Io(std::io::Error::other(join_err))),
        };
        self.transition(ConnectionState::Closed);

        read_result.and(write_result)
    }

    async fn handshake<S>(&mut self, reader: &mut Reader<S>) -> Result<Negotiated>
    where
        S: AsyncRead + AsyncWrite,
    {
        let deadline = self.config.handshake_timeout;
        let frame = match tokio::time::timeout(deadline, reader.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => return Err(ProtocolError::ConnectionClosed),
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    duration_ms: deadline.as_millis() as u64,
                });
            }
        };
        negotiate(&frame, self.config.max_frame_size)
    }

    async fn read_loop<S>(
        &mut self,
        reader: &mut Reader<S>,
        negotiated: &Negotiated,
        tx: mpsc::Sender<Outbound>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut order = StreamOrder::default();
        let mut reassembly = ReassemblyBuffer::new(
            self.config.max_reassembly_bytes,
            self.config.max_pending_fragments,
        );

        loop {
            let next = tokio::select! {
                // The writer stopped; nothing more can be answered.
                _ = cancel.cancelled() => return Ok(()),
                next = reader.next() => next,
            };

            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => return self.fail(err, &tx).await,
                None => {
                    tracing::debug!(peer = %self.peer, "Peer closed the connection");
                    return Ok(());
                }
            };

            match frame.frame_type {
                FrameType::Notify | FrameType::Unset => {
                    let (stream_id, frame_id) = (frame.stream_id, frame.frame_id);
                    let messages =
                        match collect_notify(frame, negotiated.fragmentation, &mut reassembly) {
                            Ok(Some(messages)) => messages,
                            Ok(None) => continue,
                            Err(err) => return self.fail(err, &tx).await,
                        };

                    let permit = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        permit = Arc::clone(&semaphore).acquire_owned() => {
                            permit.map_err(|_| ProtocolError::ConnectionClosed)?
                        }
                    };

                    let evaluation = Evaluation {
                        router: self.router.clone(),
                        deadline: self.config.processing_timeout,
                        scope: self.config.var_scope,
                        stream_id,
                        frame_id,
                    };
                    let (previous, done) = order.enqueue(stream_id);
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let ordered = async {
                            let actions = evaluation.run(messages).await;
                            if let Some(previous) = previous {
                                // An abandoned predecessor closes the channel.
                                let _ = previous.await;
                            }
                            actions
                        };
                        let actions = tokio::select! {
                            _ = cancel.cancelled() => return,
                            actions = ordered => actions,
                        };
                        let ack = Frame::ack(stream_id, frame_id, actions);
                        if tx.send(Outbound::Ack(ack)).await.is_err() {
                            tracing::trace!(stream_id, frame_id, "Writer gone, ACK dropped");
                        }
                        let _ = done.send(());
                    });
                }
                FrameType::HaproxyDisconnect => {
                    let (status, message) = frame.disconnect_status().unwrap_or_default();
                    tracing::info!(
                        peer = %self.peer,
                        status,
                        message = %message,
                        "Proxy closed the connection"
                    );
                    self.transition(ConnectionState::Closing);
                    cancel.cancel();
                    let status = DisconnectStatus::Normal;
                    // Writer may already be gone; nothing left to do then.
                    let _ = tx
                        .send(Outbound::Disconnect(Frame::agent_disconnect(
                            status.code(),
                            status.message(),
                        )))
                        .await;
                    return Ok(());
                }
                FrameType::Unknown(tag) => {
                    tracing::debug!(
                        peer = %self.peer,
                        frame_type = tag,
                        stream_id = frame.stream_id,
                        "Skipping frame of unknown type"
                    );
                }
                other => {
                    return self
                        .fail(
                            ProtocolError::UnexpectedFrame {
                                frame_type: other.name(),
                                state: "established",
                            },
                            &tx,
                        )
                        .await;
                }
            }
        }
    }

    async fn fail(&mut self, err: ProtocolError, tx: &mpsc::Sender<Outbound>) -> Result<()> {
        self.transition(ConnectionState::Closing);
        if !err.is_transport_failure() {
            let status = err.status();
            tracing::warn!(
                peer = %self.peer,
                error = %err,
                status = status.code(),
                "Protocol error, disconnecting"
            );
            let _ = tx
                .send(Outbound::Disconnect(Frame::agent_disconnect(
                    status.code(),
                    status.message(),
                )))
                .await;
        }
        Err(err)
    }
}

/// Extract the messages of a complete NOTIFY, buffering fragments.
///
/// Returns `None` while a fragmented frame is still incomplete or was aborted.
fn collect_notify(
    frame: Frame,
    fragmentation: bool,
    reassembly: &mut ReassemblyBuffer,
) -> Result<Option<Vec<Message>>> {
    let frame = match frame.payload {
        Payload::Messages(messages) if !frame.flags.is_abort() => return Ok(Some(messages)),
        payload => Frame { payload, ..frame },
    };

    if !fragmentation && !frame.flags.is_abort() {
        return Err(ProtocolError::InvalidFragment {
            reason: "fragmented NOTIFY without negotiated fragmentation".to_string(),
            status: DisconnectStatus::FragmentationNotSupported,
        });
    }

    match reassembly.accept(&frame)? {
        Fragment::Complete(payload) => decode_messages(&payload).map(Some),
        Fragment::Incomplete | Fragment::Aborted => Ok(None),
    }
}

/// Per-stream ACK ordering.
///
/// Each stream maps to the completion signal of its most recent frame. A new
/// frame on the same stream waits for that signal before queueing its ACK.
/// Entries whose frame is done are pruned on the next enqueue, so the map
/// never outgrows the frames still in flight.
#[derive(Debug, Default)]
struct StreamOrder {
    tails: HashMap<u64, oneshot::Receiver<()>>,
}

impl StreamOrder {
    /// Register a frame on `stream_id`.
    ///
    /// Returns the signal of the frame to wait for, if any, and the sender
    /// to fire once this frame's ACK is queued.
    fn enqueue(&mut self, stream_id: u64) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        self.tails
            .retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));
        let (done, tail) = oneshot::channel();
        (self.tails.insert(stream_id, tail), done)
    }
}

/// Evaluation of one NOTIFY.
struct Evaluation {
    router: AuthenticatorRouter,
    deadline: Duration,
    scope: VarScope,
    stream_id: u64,
    frame_id: u64,
}

impl Evaluation {
    /// Route every message and collect the resulting SET-VAR actions.
    ///
    /// Failures never escape: they become deny verdicts so the NOTIFY is
    /// still acknowledged. The processing timeout bounds the whole frame,
    /// not each message.
    async fn run(self, messages: Vec<Message>) -> Vec<Action> {
        let deadline = Instant::now() + self.deadline;
        let mut actions = Vec::new();
        for message in messages {
            let Some(verdict) = self.evaluate(&message, deadline).await else {
                continue;
            };
            tracing::debug!(
                stream_id = self.stream_id,
                frame_id = self.frame_id,
                action = %message.name,
                decision = verdict.decision.as_str(),
                "Message evaluated"
            );
            actions.extend(verdict.variables.into_iter().map(|var| Action::SetVar {
                scope: self.scope,
                name: var.name,
                value: var.value,
            }));
        }
        actions
    }

    async fn evaluate(&self, message: &Message, deadline: Instant) -> Option<Verdict> {
        let dispatch = self.router.dispatch(&message.name, &message.args);
        let verdict = match tokio::time::timeout_at(deadline, dispatch).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(RouterError::UnknownAction(action))) => {
                tracing::warn!(
                    stream_id = self.stream_id,
                    frame_id = self.frame_id,
                    action = %action,
                    "No authenticator registered for action"
                );
                return None;
            }
            Ok(Err(RouterError::Authenticator { action, source })) => {
                tracing::warn!(
                    stream_id = self.stream_id,
                    frame_id = self.frame_id,
                    action = %action,
                    error = %source,
                    "Authenticator failed"
                );
                Verdict::from_failure(&source)
            }
            Ok(Err(err)) => {
                tracing::error!(action = %message.name, error = %err, "Dispatch failed");
                Verdict::from_failure(&AuthError::Internal(err.to_string()))
            }
            Err(_) => {
                let elapsed_ms = self.deadline.as_millis() as u64;
                tracing::warn!(
                    stream_id = self.stream_id,
                    frame_id = self.frame_id,
                    action = %message.name,
                    timeout_ms = elapsed_ms,
                    "Authenticator timed out"
                );
                Verdict::from_failure(&AuthError::Timeout(elapsed_ms))
            }
        };
        Some(verdict)
    }
}

async fn write_loop<S>(
    mut writer: Writer<S>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
    peer: SocketAddr,
) -> Result<()>
where
    S: AsyncWrite,
{
    let result = async {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Ack(frame) => {
                    if cancel.is_cancelled() {
                        continue;
                    }
                    match writer.send(frame).await {
                        Ok(()) => {}
                        Err(err @ ProtocolError::FrameTooLarge { .. }) => {
                            tracing::error!(peer = %peer, error = %err, "ACK exceeds negotiated frame size");
                            send_disconnect(&mut writer, err.status()).await;
                            return Err(err);
                        }
                        Err(err) => return Err(err),
                    }
                }
                Outbound::Disconnect(frame) => {
                    writer.send(frame).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
    .await;

    cancel.cancel();
    result
}

async fn send_disconnect<S>(writer: &mut Writer<S>, status: DisconnectStatus)
where
    S: AsyncWrite,
{
    let frame = Frame::agent_disconnect(status.code(), status.message());
    if let Err(err) = writer.send(frame).await {
        tracing::debug!(error = %err, "Could not send AGENT-DISCONNECT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_MAX_FRAME_SIZE;
    use spoa_auth_types::testing::{EchoAuthenticator, StaticAuthenticator};
    use spoa_auth_types::{Attributes, TypedData, vars};
    use tokio::io::DuplexStream;
    use tokio_util::codec::Framed;

    fn router() -> AuthenticatorRouter {
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register("echo", Arc::new(EchoAuthenticator::new("user")))
            .unwrap()
            .register(
                "slow",
                Arc::new(StaticAuthenticator::new(Verdict::allow("late")).with_delay(Duration::from_secs(60))),
            )
            .unwrap();
        builder.build()
    }

    fn start(config: AgentConfig) -> (Framed<DuplexStream, FrameCodec>, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let conn = Connection::new(router(), Arc::new(config), "127.0.0.1:1".parse().unwrap());
        let handle = tokio::spawn(conn.run(server));
        (Framed::new(client, FrameCodec::new(DEFAULT_MAX_FRAME_SIZE)), handle)
    }

    fn hello(caps: &str) -> Frame {
        Frame::haproxy_hello(vec![
            ("supported-versions".into(), TypedData::from("2.0")),
            ("max-frame-size".into(), TypedData::Uint32(16380)),
            ("capabilities".into(), TypedData::from(caps)),
        ])
    }

    async fn established(config: AgentConfig) -> (Framed<DuplexStream, FrameCodec>, tokio::task::JoinHandle<Result<()>>) {
        let (mut peer, handle) = start(config);
        peer.send(hello("pipelining,fragmentation")).await.unwrap();
        let reply = peer.next().await.unwrap().unwrap();
        assert_eq!(reply.frame_type, FrameType::AgentHello);
        (peer, handle)
    }

    fn set_vars(frame: &Frame) -> Vec<(String, TypedData)> {
        match &frame.payload {
            Payload::Actions(actions) => actions
                .iter()
                .filter_map(|a| match a {
                    Action::SetVar { name, value, .. } => Some((name.clone(), value.clone())),
                    Action::UnsetVar { .. } => None,
                })
                .collect(),
            other => panic!("not an ACK payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notify_is_acknowledged_with_same_ids() {
        let (mut peer, _handle) = established(AgentConfig::default()).await;
        let notify = Frame::notify(
            7,
            3,
            vec![Message::new("echo", Attributes::new().with("user", "alice"))],
        );
        peer.send(notify).await.unwrap();

        let ack = peer.next().await.unwrap().unwrap();
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!((ack.stream_id, ack.frame_id), (7, 3));
        let vars = set_vars(&ack);
        assert!(vars.contains(&(vars::AUTHENTICATED.to_string(), TypedData::Bool(true))));
        assert!(vars.contains(&(vars::IDENTITY.to_string(), TypedData::from("alice"))));
    }

    #[tokio::test]
    async fn test_unknown_action_still_acknowledged() {
        let (mut peer, _handle) = established(AgentConfig::default()).await;
        peer.send(Frame::notify(1, 1, vec![Message::new("nope", Attributes::new())]))
            .await
            .unwrap();
        let ack = peer.next().await.unwrap().unwrap();
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert!(set_vars(&ack).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_timeout_denies() {
        let config = AgentConfig::default().with_processing_timeout(Duration::from_millis(50));
        let (mut peer, _handle) = established(config).await;
        peer.send(Frame::notify(2, 1, vec![Message::new("slow", Attributes::new())]))
            .await
            .unwrap();
        let ack = peer.next().await.unwrap().unwrap();
        let vars = set_vars(&ack);
        assert!(vars.contains(&(vars::AUTHENTICATED.to_string(), TypedData::Bool(false))));
        assert!(vars.contains(&(vars::ERROR_REASON.to_string(), TypedData::from("upstream_timeout"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_covers_whole_notify() {
        let config = AgentConfig::default().with_processing_timeout(Duration::from_millis(50));
        let (mut peer, _handle) = established(config).await;
        let started = Instant::now();
        peer.send(Frame::notify(
            4,
            1,
            vec![
                Message::new("slow", Attributes::new()),
                Message::new("slow", Attributes::new()),
            ],
        ))
        .await
        .unwrap();

        let ack = peer.next().await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        let timeouts = set_vars(&ack)
            .into_iter()
            .filter(|(name, value)| name == vars::ERROR_REASON && value == &TypedData::from("upstream_timeout"))
            .count();
        assert_eq!(timeouts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acks_follow_arrival_order_within_stream() {
        let config = AgentConfig::default().with_processing_timeout(Duration::from_millis(500));
        let (mut peer, _handle) = established(config).await;
        let echo = || Message::new("echo", Attributes::new().with("user", "bob"));
        peer.send(Frame::notify(1, 1, vec![Message::new("slow", Attributes::new())]))
            .await
            .unwrap();
        peer.send(Frame::notify(1, 2, vec![echo()])).await.unwrap();
        peer.send(Frame::notify(2, 1, vec![echo()])).await.unwrap();

        let mut acked = Vec::new();
        for _ in 0..3 {
            let ack = peer.next().await.unwrap().unwrap();
            assert_eq!(ack.frame_type, FrameType::Ack);
            acked.push((ack.stream_id, ack.frame_id));
        }
        // Stream 2 is not held back by the slow frame on stream 1.
        assert_eq!(acked, vec![(2, 1), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_stream_order_chains_and_prunes() {
        let mut order = StreamOrder::default();
        let (first, first_done) = order.enqueue(1);
        assert!(first.is_none());

        let (second, second_done) = order.enqueue(1);
        let mut second = second.unwrap();
        assert!(matches!(second.try_recv(), Err(TryRecvError::Empty)));
        first_done.send(()).unwrap();
        assert!(second.try_recv().is_ok());

        let (other, _other_done) = order.enqueue(2);
        assert!(other.is_none());

        second_done.send(()).unwrap();
        let (fresh, _fresh_done) = order.enqueue(3);
        assert!(fresh.is_none());
        // Stream 1 finished and was pruned.
        assert!(!order.tails.contains_key(&1));
        assert_eq!(order.tails.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_gets_single_reply() {
        let (mut peer, handle) = established(AgentConfig::default()).await;
        peer.send(Frame::haproxy_disconnect(0, "bye")).await.unwrap();
        let reply = peer.next().await.unwrap().unwrap();
        assert_eq!(reply.frame_type, FrameType::AgentDisconnect);
        assert_eq!(reply.disconnect_status().map(|(s, _)| s), Some(0));
        assert!(peer.next().await.is_none());
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_version_disconnects() {
        let (mut peer, handle) = start(AgentConfig::default());
        let mut bad = hello("pipelining");
        bad.payload = Payload::KvList(vec![
            ("supported-versions".into(), TypedData::from("1.0")),
            ("max-frame-size".into(), TypedData::Uint32(16380)),
            ("capabilities".into(), TypedData::from("")),
        ]);
        peer.send(bad).await.unwrap();
        let reply = peer.next().await.unwrap().unwrap();
        assert_eq!(reply.frame_type, FrameType::AgentDisconnect);
        assert_eq!(
            reply.disconnect_status().map(|(s, _)| s),
            Some(DisconnectStatus::BadVersion.code())
        );
        assert!(matches!(
            handle.await.unwrap(),
            Err(ProtocolError::UnsupportedVersion { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let config = AgentConfig::default().with_handshake_timeout(Duration::from_millis(100));
        let (mut peer, handle) = start(config);
        let reply = peer.next().await.unwrap().unwrap();
        assert_eq!(
            reply.disconnect_status().map(|(s, _)| s),
            Some(DisconnectStatus::Timeout.code())
        );
        assert!(matches!(
            handle.await.unwrap(),
            Err(ProtocolError::Timeout { duration_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_fragment_without_negotiation_rejected() {
        let (mut peer, handle) = start(AgentConfig::default());
        peer.send(hello("pipelining")).await.unwrap();
        peer.next().await.unwrap().unwrap();

        peer.send(Frame {
            frame_type: FrameType::Notify,
            flags: crate::frame::FrameFlags::continuation(),
            stream_id: 1,
            frame_id: 1,
            payload: Payload::Raw(bytes::Bytes::from_static(b"\x04echo")),
        })
        .await
        .unwrap();
        let reply = peer.next().await.unwrap().unwrap();
        assert_eq!(
            reply.disconnect_status().map(|(s, _)| s),
            Some(DisconnectStatus::FragmentationNotSupported.code())
        );
        assert!(handle.await.unwrap().is_err());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::AwaitingHello.as_str(), "awaiting_hello");
        assert_eq!(ConnectionState::Closed.as_str(), "closed");
    }
}
