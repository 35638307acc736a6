//! Agent listener configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::frame::VarScope;

/// Default number of NOTIFY frames evaluated concurrently per connection.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default deadline for the proxy's HELLO after accept.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for one authenticator invocation.
pub const DEFAULT_PROCESSING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ceiling on bytes held for partially received frames (1 MB).
pub const DEFAULT_MAX_REASSEMBLY_BYTES: usize = 1024 * 1024;

/// Default ceiling on partially received frames per connection.
pub const DEFAULT_MAX_PENDING_FRAGMENTS: usize = 64;

/// Configuration of the SPOP listener and its connections.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address to accept proxy connections on.
    pub bind_address: SocketAddr,

    /// Max-frame-size announced in AGENT-HELLO.
    pub max_frame_size: usize,

    /// Concurrent authenticator invocations per connection.
    /// Reading stops while the limit is reached.
    pub max_in_flight: usize,

    pub handshake_timeout: Duration,

    /// Deadline for one NOTIFY; expiry yields a deny with an upstream-failure reason.
    pub processing_timeout: Duration,

    pub max_reassembly_bytes: usize,
    pub max_pending_fragments: usize,

    /// Scope of the variables set in ACK frames.
    pub var_scope: VarScope,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 12345)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            processing_timeout: DEFAULT_PROCESSING_TIMEOUT,
            max_reassembly_bytes: DEFAULT_MAX_REASSEMBLY_BYTES,
            max_pending_fragments: DEFAULT_MAX_PENDING_FRAGMENTS,
            var_scope: VarScope::Session,
        }
    }
}

impl AgentConfig {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the per-connection concurrency limit (at least one).
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit.max(1);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    /// Bound the reassembly buffer.
    pub fn with_reassembly_limits(mut self, max_bytes: usize, max_pending: usize) -> Self {
        self.max_reassembly_bytes = max_bytes;
        self.max_pending_fragments = max_pending;
        self
    }

    pub fn with_var_scope(mut self, scope: VarScope) -> Self {
        self.var_scope = scope;
        self
    }
}
