//! Protocol error types.
//!
//! Every variant is connection-fatal: the multiplexer reports it to the peer
//! with an AGENT-DISCONNECT frame carrying [`ProtocolError::status`] and
//! closes only the affected connection.

use std::io;

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Status codes carried by DISCONNECT frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectStatus {
    Normal = 0,
    Io = 1,
    Timeout = 2,
    FrameTooBig = 3,
    InvalidFrame = 4,
    NoVersion = 5,
    NoFrameSize = 6,
    NoCapabilities = 7,
    BadVersion = 8,
    BadFrameSize = 9,
    FragmentationNotSupported = 10,
    InterlacedFrames = 11,
    FrameIdNotFound = 12,
    ResourceAllocation = 13,
    Unknown = 99,
}

impl DisconnectStatus {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Io,
            2 => Self::Timeout,
            3 => Self::FrameTooBig,
            4 => Self::InvalidFrame,
            5 => Self::NoVersion,
            6 => Self::NoFrameSize,
            7 => Self::NoCapabilities,
            8 => Self::BadVersion,
            9 => Self::BadFrameSize,
            10 => Self::FragmentationNotSupported,
            11 => Self::InterlacedFrames,
            12 => Self::FrameIdNotFound,
            13 => Self::ResourceAllocation,
            _ => Self::Unknown,
        }
    }

    /// Human-readable message sent alongside the code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Io => "I/O error",
            Self::Timeout => "a timeout occurred",
            Self::FrameTooBig => "frame is too big",
            Self::InvalidFrame => "invalid frame received",
            Self::NoVersion => "version value not found",
            Self::NoFrameSize => "max-frame-size value not found",
            Self::NoCapabilities => "capabilities value not found",
            Self::BadVersion => "unsupported version",
            Self::BadFrameSize => "max-frame-size too big or too small",
            Self::FragmentationNotSupported => "payload fragmentation is not supported",
            Self::InterlacedFrames => "invalid interlaced frames",
            Self::FrameIdNotFound => "frame-id not found",
            Self::ResourceAllocation => "resource allocation error",
            Self::Unknown => "an unknown error occurred",
        }
    }
}

/// Errors raised while reading, writing or interpreting frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The bytes do not form a valid frame.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// A frame exceeds the negotiated max-frame-size.
    ///
    /// Raised on decode before the body is buffered, and on encode instead of
    /// truncating.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// The peer offered no protocol version we speak.
    #[error("unsupported protocol version: {offered}")]
    UnsupportedVersion { offered: String },

    /// The HELLO exchange failed for a reason other than the version.
    #[error("handshake failed: {reason}")]
    Handshake {
        reason: String,
        status: DisconnectStatus,
    },

    /// Fragments arrived out of sequence or exceeded the reassembly bounds.
    #[error("invalid fragment: {reason}")]
    InvalidFragment {
        reason: String,
        status: DisconnectStatus,
    },

    /// A frame type that is not valid in the current state.
    #[error("unexpected {frame_type} frame while {state}")]
    UnexpectedFrame {
        frame_type: &'static str,
        state: &'static str,
    },

    /// Deadline elapsed waiting on the peer.
    #[error("operation timed out after {duration_ms} ms")]
    Timeout { duration_ms: u64 },

    /// The peer closed the connection mid-exchange.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Status code reported to the peer for this error.
    pub fn status(&self) -> DisconnectStatus {
        match self {
            Self::MalformedFrame { .. } | Self::UnexpectedFrame { .. } => {
                DisconnectStatus::InvalidFrame
            }
            Self::FrameTooLarge { .. } => DisconnectStatus::FrameTooBig,
            Self::UnsupportedVersion { .. } => DisconnectStatus::BadVersion,
            Self::Handshake { status, .. } | Self::InvalidFragment { status, .. } => *status,
            Self::Timeout { .. } => DisconnectStatus::Timeout,
            Self::ConnectionClosed | Self::Io(_) => DisconnectStatus::Io,
        }
    }

    /// Whether the transport is still usable for a final DISCONNECT frame.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}
