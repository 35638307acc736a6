//! spoa-auth - HAProxy SPOE authentication agent.
//!
//! The binary loads configuration, sets up logging and runs the SPOP agent
//! alongside the OIDC callback server. The pieces are exposed here so they
//! can be assembled in tests.

pub mod logging;
pub mod wiring;
