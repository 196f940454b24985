//! Sentinel clients
//!
//! Two ways of asking a sentinel deployment for the current master:
//! - [`SentinelSession`]: one long-lived, reconnecting connection per group
//!   of interchangeable endpoints, lookups serialized through a worker task
//! - [`DirectSentinel`]: a fresh connection to one endpoint per lookup

pub mod connector;
pub mod direct;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::{Connector, TcpConnector};
pub use direct::DirectSentinel;
pub use session::{
    ReconnectPolicy, SentinelSession, SessionConfig, SessionState, SessionStatus,
};
