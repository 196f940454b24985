//! Direct sentinel client
//!
//! Talks to a single sentinel address with a fresh connection per lookup.
//! Nothing is kept between calls, so there is nothing to reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufStream;
use tokio::time::timeout;

use super::connector::{Connector, TcpConnector, dial};
use crate::error::{Error, Result};
use crate::events::{EventPublisher, TunnelEvent};
use crate::protocol::{LinkStatus, MasterAddr, get_master_addr_by_name};
use crate::sentinel::session::SessionConfig;

pub struct DirectSentinel<C: Connector = TcpConnector> {
    addr: String,
    connector: C,
    dial_timeout: Duration,
    io_timeout: Option<Duration>,
    events: Arc<EventPublisher>,
}

impl DirectSentinel {
    pub fn new(addr: impl Into<String>, config: &SessionConfig, events: Arc<EventPublisher>) -> Self {
        Self::with_connector(TcpConnector, addr, config, events)
    }
}

impl<C: Connector> DirectSentinel<C> {
    pub fn with_connector(
        connector: C,
        addr: impl Into<String>,
        config: &SessionConfig,
        events: Arc<EventPublisher>,
    ) -> Self {
        Self {
            addr: addr.into(),
            connector,
            dial_timeout: config.dial_timeout,
            io_timeout: config.io_timeout,
            events,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dial, ask for the master of `db` and hang up.
    pub async fn resolve(&self, db: &str) -> Result<MasterAddr> {
        let stream = match dial(&self.connector, &self.addr, self.dial_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.events.publish(TunnelEvent::DialFailed {
                    sentinel: self.addr.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        let mut stream = BufStream::new(stream);

        let (result, _) = match self.io_timeout {
            Some(limit) => timeout(limit, get_master_addr_by_name(&mut stream, db))
                .await
                .unwrap_or((Err(Error::IoTimeout), LinkStatus::Broken)),
            None => get_master_addr_by_name(&mut stream, db).await,
        };

        if let Err(e) = &result {
            self.events.publish(TunnelEvent::LookupFailed {
                db: db.to_string(),
                error: e.to_string(),
            });
        }
        result
    }
}
