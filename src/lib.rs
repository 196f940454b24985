pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod resolver;
pub mod sentinel;
pub mod tunnel;

pub use config::TunnelConfig;
pub use error::{Error, Result};
pub use events::{EventPublisher, TunnelEvent};
pub use protocol::MasterAddr;
pub use resolver::{AddressRewrite, MasterResolver, Resolver, Source};
pub use sentinel::{DirectSentinel, SentinelSession, SessionConfig};
pub use tunnel::TunnelServer;
