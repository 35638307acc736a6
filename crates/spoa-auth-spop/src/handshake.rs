//! HELLO negotiation.

use spoa_auth_types::TypedData;

use crate::codec::MIN_FRAME_SIZE;
use crate::error::{DisconnectStatus, ProtocolError, Result};
use crate::frame::{Frame, FrameType};

/// The only protocol version this agent speaks.
pub const SUPPORTED_VERSION: &str = "2.0";

pub const CAPABILITY_PIPELINING: &str = "pipelining";
pub const CAPABILITY_FRAGMENTATION: &str = "fragmentation";

const AGENT_CAPABILITIES: [&str; 2] = [CAPABILITY_PIPELINING, CAPABILITY_FRAGMENTATION];

/// Outcome of a successful HELLO exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: &'static str,
    /// Largest frame either side may send, prefix excluded.
    pub max_frame_size: usize,
    pub pipelining: bool,
    pub fragmentation: bool,
    /// The peer only checks liveness; the connection closes after the reply.
    pub healthcheck: bool,
    pub engine_id: Option<String>,
}

impl Negotiated {
    fn capabilities(&self) -> String {
        let mut caps = Vec::new();
        if self.pipelining {
            caps.push(CAPABILITY_PIPELINING);
        }
        if self.fragmentation {
            caps.push(CAPABILITY_FRAGMENTATION);
        }
        caps.join(",")
    }

    /// The AGENT-HELLO answering the peer's HELLO.
    pub fn agent_hello(&self) -> Frame {
        Frame::agent_hello(vec![
            ("version".to_string(), TypedData::from(self.version)),
            (
                "max-frame-size".to_string(),
                TypedData::Uint32(u32::try_from(self.max_frame_size).unwrap_or(u32::MAX)),
            ),
            ("capabilities".to_string(), TypedData::String(self.capabilities())),
        ])
    }
}

/// Validate a HAPROXY-HELLO and compute the connection parameters.
///
/// `agent_max_frame_size` is what this agent is willing to receive; the
/// negotiated size is the smaller of the two announcements.
pub fn negotiate(frame: &Frame, agent_max_frame_size: usize) -> Result<Negotiated> {
    if frame.frame_type != FrameType::HaproxyHello {
        return Err(ProtocolError::UnexpectedFrame {
            frame_type: frame.frame_type.name(),
            state: "awaiting hello",
        });
    }
    let items = frame
        .kv_items()
        .ok_or_else(|| ProtocolError::malformed("HELLO without key-value payload"))?;
    let lookup = |key: &str| items.iter().find(|(k, _)| k == key).map(|(_, v)| v);

    let versions = lookup("supported-versions")
        .and_then(TypedData::as_str)
        .ok_or_else(|| handshake_error("supported-versions missing", DisconnectStatus::NoVersion))?;
    if !versions
        .split(',')
        .any(|v| v.trim() == SUPPORTED_VERSION)
    {
        return Err(ProtocolError::UnsupportedVersion {
            offered: versions.to_string(),
        });
    }

    let peer_max = match lookup("max-frame-size") {
        Some(TypedData::Uint32(size)) => *size as usize,
        Some(other) => {
            return Err(handshake_error(
                format!("max-frame-size has type {}", other.type_name()),
                DisconnectStatus::NoFrameSize,
            ));
        }
        None => {
            return Err(handshake_error(
                "max-frame-size missing",
                DisconnectStatus::NoFrameSize,
            ));
        }
    };
    if peer_max < MIN_FRAME_SIZE {
        return Err(handshake_error(
            format!("max-frame-size {} below minimum {}", peer_max, MIN_FRAME_SIZE),
            DisconnectStatus::BadFrameSize,
        ));
    }

    let capabilities = lookup("capabilities")
        .and_then(TypedData::as_str)
        .ok_or_else(|| {
            handshake_error("capabilities missing", DisconnectStatus::NoCapabilities)
        })?;
    let offered: Vec<&str> = capabilities
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    let both = |cap: &str| offered.contains(&cap) && AGENT_CAPABILITIES.contains(&cap);

    let healthcheck = matches!(lookup("healthcheck"), Some(TypedData::Bool(true)));
    let engine_id = lookup("engine-id")
        .and_then(TypedData::as_str)
        .map(str::to_string);

    Ok(Negotiated {
        version: SUPPORTED_VERSION,
        max_frame_size: peer_max.min(agent_max_frame_size),
        pipelining: both(CAPABILITY_PIPELINING),
        fragmentation: both(CAPABILITY_FRAGMENTATION),
        healthcheck,
        engine_id,
    })
}

fn handshake_error(reason: impl Into<String>, status: DisconnectStatus) -> ProtocolError {
    ProtocolError::Handshake {
        reason: reason.into(),
        status,
    }
}
