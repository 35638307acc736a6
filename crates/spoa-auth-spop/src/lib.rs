//! Stream Processing Offload Protocol (SPOP) agent engine.
//!
//! HAProxy's SPOE filter offloads request processing to external agents over
//! SPOP: a binary protocol of length-prefixed frames exchanged on long-lived
//! TCP connections. This crate implements the agent side:
//!
//! - [`varint`] and [`frame`] - wire encoding of integers, typed values and frames
//! - [`codec`] - whole-buffer encode/decode plus a `tokio_util` codec
//! - [`handshake`] - HELLO negotiation of version, frame size and capabilities
//! - [`reassembly`] - bounded buffering of fragmented NOTIFY frames
//! - [`connection`] - the per-connection multiplexer dispatching NOTIFY
//!   messages through an [`AuthenticatorRouter`](spoa_auth_types::AuthenticatorRouter)
//! - [`server`] - the TCP listener
//!
//! # Example
//!
//! ```ignore
//! use spoa_auth_spop::{AgentConfig, AgentServer};
//!
//! let server = AgentServer::new(router, AgentConfig::new("0.0.0.0:12345".parse()?));
//! let listener = server.bind().await?;
//! server.serve(listener, async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod reassembly;
pub mod server;
pub mod varint;

pub use codec::{FrameCodec, decode_frame, encode_frame};
pub use config::AgentConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{DisconnectStatus, ProtocolError, Result};
pub use frame::{Action, Frame, FrameFlags, FrameType, Message, Payload, VarScope};
pub use handshake::Negotiated;
pub use server::AgentServer;
