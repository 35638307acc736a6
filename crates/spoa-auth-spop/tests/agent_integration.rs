//! End-to-end tests over real TCP connections.

mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use common::{TestAgent, TestProxy, ack_vars, hello, var};
use spoa_auth_spop::{
    AgentConfig, DisconnectStatus, Frame, FrameFlags, FrameType, Message, Payload, encode_frame,
};
use spoa_auth_types::{Attributes, TypedData, vars};

fn notify(stream_id: u64, frame_id: u64, action: &str, user: &str) -> Frame {
    Frame::notify(
        stream_id,
        frame_id,
        vec![Message::new(action, Attributes::new().with("user", user))],
    )
}

fn disconnect_code(frame: &Frame) -> Option<u32> {
    frame.disconnect_status().map(|(code, _)| code)
}

#[tokio::test]
async fn test_notify_ack_carries_ids_and_verdict() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    proxy.send(notify(42, 7, "echo", "alice")).await?;
    let ack = proxy.recv().await?.context("no ACK")?;

    assert_eq!(ack.frame_type, FrameType::Ack);
    assert_eq!((ack.stream_id, ack.frame_id), (42, 7));
    let vars = ack_vars(&ack);
    assert_eq!(var(&vars, vars::AUTHENTICATED), Some(&TypedData::Bool(true)));
    assert_eq!(var(&vars, vars::IDENTITY), Some(&TypedData::from("alice")));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_streams_never_swap_variables() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    proxy.send(notify(1, 1, "slow-echo", "slow-user")).await?;
    proxy.send(notify(2, 1, "echo", "fast-user")).await?;

    let first = proxy.recv().await?.context("no first ACK")?;
    let second = proxy.recv().await?.context("no second ACK")?;

    // The fast stream overtakes the slow one.
    assert_eq!(first.stream_id, 2);
    assert_eq!(second.stream_id, 1);
    assert_eq!(
        var(&ack_vars(&first), vars::IDENTITY),
        Some(&TypedData::from("fast-user"))
    );
    assert_eq!(
        var(&ack_vars(&second), vars::IDENTITY),
        Some(&TypedData::from("slow-user"))
    );
    Ok(())
}

#[tokio::test]
async fn test_many_in_flight_all_acknowledged() -> Result<()> {
    let config = AgentConfig::new("127.0.0.1:0".parse()?).with_max_in_flight(4);
    let agent = TestAgent::start_with(config).await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    for stream in 0..32u64 {
        proxy
            .send(notify(stream, 1, "echo", &format!("user-{stream}")))
            .await?;
    }

    let mut seen = Vec::new();
    for _ in 0..32 {
        let ack = proxy.recv().await?.context("missing ACK")?;
        let identity = var(&ack_vars(&ack), vars::IDENTITY)
            .and_then(TypedData::as_str)
            .map(str::to_string);
        assert_eq!(identity, Some(format!("user-{}", ack.stream_id)));
        seen.push(ack.stream_id);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..32).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_authenticator_failure_is_deny_with_reason() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    proxy.send(notify(3, 1, "broken", "alice")).await?;
    let vars = ack_vars(&proxy.recv().await?.context("no ACK")?);

    assert_eq!(var(&vars, vars::AUTHENTICATED), Some(&TypedData::Bool(false)));
    assert_eq!(var(&vars, vars::HAS_ERROR), Some(&TypedData::Bool(true)));
    assert_eq!(
        var(&vars, vars::ERROR_REASON),
        Some(&TypedData::from("upstream_unavailable"))
    );
    Ok(())
}

#[tokio::test]
async fn test_proxy_disconnect() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    proxy.send(Frame::haproxy_disconnect(0, "normal")).await?;
    let reply = proxy.recv().await?.context("no AGENT-DISCONNECT")?;
    assert_eq!(reply.frame_type, FrameType::AgentDisconnect);
    assert_eq!(disconnect_code(&reply), Some(0));
    assert!(proxy.recv().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_version_rejected() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::connect(agent.addr).await?;

    let mut frame = hello("pipelining", 16380);
    if let Payload::KvList(items) = &mut frame.payload {
        items[0].1 = TypedData::from("1.0");
    }
    proxy.send(frame).await?;

    let reply = proxy.recv().await?.context("no reply")?;
    assert_eq!(reply.frame_type, FrameType::AgentDisconnect);
    assert_eq!(disconnect_code(&reply), Some(DisconnectStatus::BadVersion.code()));
    assert!(proxy.recv().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_healthcheck_closes_after_hello() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::connect(agent.addr).await?;

    let mut frame = hello("", 16380);
    if let Payload::KvList(items) = &mut frame.payload {
        items.push(("healthcheck".into(), TypedData::Bool(true)));
    }
    proxy.send(frame).await?;

    let reply = proxy.recv().await?.context("no AGENT-HELLO")?;
    assert_eq!(reply.frame_type, FrameType::AgentHello);
    assert!(proxy.recv().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_fragmented_notify_is_reassembled() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining,fragmentation", 16380).await?;

    // Payload of a complete NOTIFY: skip prefix(4) + type(1) + flags(4) + two one-byte ids.
    let whole = encode_frame(&notify(5, 1, "echo", "fragmented-user"), 16380)?;
    let payload = whole.slice(11..);
    let (head, tail) = payload.split_at(payload.len() / 2);

    proxy
        .send(Frame {
            frame_type: FrameType::Notify,
            flags: FrameFlags::continuation(),
            stream_id: 5,
            frame_id: 1,
            payload: Payload::Raw(Bytes::copy_from_slice(head)),
        })
        .await?;
    proxy
        .send(Frame {
            frame_type: FrameType::Unset,
            flags: FrameFlags::fin(),
            stream_id: 5,
            frame_id: 1,
            payload: Payload::Raw(Bytes::copy_from_slice(tail)),
        })
        .await?;

    let ack = proxy.recv().await?.context("no ACK")?;
    assert_eq!((ack.stream_id, ack.frame_id), (5, 1));
    assert_eq!(
        var(&ack_vars(&ack), vars::IDENTITY),
        Some(&TypedData::from("fragmented-user"))
    );
    Ok(())
}

#[tokio::test]
async fn test_oversized_inbound_frame_disconnects() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 256).await?;

    // Length prefix announcing more than the negotiated 256 bytes.
    proxy.send_raw(&[0, 0, 2, 0]).await?;

    let reply = proxy.recv().await?.context("no AGENT-DISCONNECT")?;
    assert_eq!(disconnect_code(&reply), Some(DisconnectStatus::FrameTooBig.code()));
    Ok(())
}

#[tokio::test]
async fn test_ack_over_negotiated_size_is_never_truncated() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 256).await?;

    // The NOTIFY fits in 256 bytes but the identity echoed back does not.
    proxy.send(notify(9, 1, "echo", &"x".repeat(230))).await?;

    let reply = proxy.recv().await?.context("no reply")?;
    assert_eq!(reply.frame_type, FrameType::AgentDisconnect);
    assert_eq!(disconnect_code(&reply), Some(DisconnectStatus::FrameTooBig.code()));
    Ok(())
}

#[tokio::test]
async fn test_unknown_frame_type_is_skipped() -> Result<()> {
    let agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    proxy
        .send(Frame {
            frame_type: FrameType::Unknown(77),
            flags: FrameFlags::fin(),
            stream_id: 0,
            frame_id: 0,
            payload: Payload::Raw(Bytes::from_static(b"future")),
        })
        .await?;
    proxy.send(notify(1, 2, "echo", "bob")).await?;

    let ack = proxy.recv().await?.context("no ACK")?;
    assert_eq!((ack.stream_id, ack.frame_id), (1, 2));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_keeps_live_connections() -> Result<()> {
    let mut agent = TestAgent::start().await?;
    let mut proxy = TestProxy::established(agent.addr, "pipelining", 16380).await?;

    agent.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    proxy.send(notify(1, 1, "echo", "still-here")).await?;
    let ack = proxy.recv().await?.context("no ACK after shutdown")?;
    assert_eq!(
        var(&ack_vars(&ack), vars::IDENTITY),
        Some(&TypedData::from("still-here"))
    );

    assert!(TestProxy::connect(agent.addr).await.is_err());
    Ok(())
}
