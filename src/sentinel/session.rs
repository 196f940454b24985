//! Sentinel Session
//!
//! One reconnecting client for a group of interchangeable sentinel
//! endpoints. Callers share a cheap handle; a single worker task owns the
//! physical connection and services lookups strictly one at a time, so at
//! most one request is ever outstanding on the wire.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;

use super::connector::{Connector, TcpConnector, dial};
use crate::error::{Error, Result};
use crate::events::{EventPublisher, TunnelEvent};
use crate::protocol::{LinkStatus, MasterAddr, get_master_addr_by_name};

/// Per-attempt dial timeout
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(300);

/// Deadline for writing a request and reading its reply
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Pending lookups a session buffers before callers wait to enqueue
const REQUEST_QUEUE_DEPTH: usize = 1024;

/// When a request-level failure (framing violation, null reply) should
/// also replace the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Sweep the endpoint list after any failed lookup
    #[default]
    Always,
    /// Only sweep when the connection itself failed
    ConnectionErrors,
}

impl ReconnectPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "connection-errors" => Some(Self::ConnectionErrors),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub dial_timeout: Duration,
    /// `None` leaves established connections without a deadline
    pub io_timeout: Option<Duration>,
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last sweep reached no endpoint; the next lookup sweeps again
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Endpoint of the live connection
    pub endpoint: Option<String>,
}

struct LookupRequest {
    db: String,
    reply: oneshot::Sender<Result<MasterAddr>>,
}

/// Handle to a sentinel session. Clones share the same worker.
#[derive(Clone)]
pub struct SentinelSession {
    endpoints: Arc<[String]>,
    requests: mpsc::Sender<LookupRequest>,
    status: watch::Receiver<SessionStatus>,
}

impl SentinelSession {
    /// Connect over TCP to the first reachable endpoint and start the worker.
    pub async fn connect(
        endpoints: Vec<String>,
        config: SessionConfig,
        events: Arc<EventPublisher>,
    ) -> Result<Self> {
        Self::connect_with(TcpConnector, endpoints, config, events).await
    }

    /// Like [`SentinelSession::connect`], dialing through `connector`.
    ///
    /// Fails with [`Error::NoSentinelReachable`] when no endpoint accepts a
    /// connection.
    pub async fn connect_with<C: Connector>(
        connector: C,
        endpoints: Vec<String>,
        config: SessionConfig,
        events: Arc<EventPublisher>,
    ) -> Result<Self> {
        let endpoints: Arc<[String]> = endpoints.into();
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Disconnected,
            endpoint: None,
        });

        let mut worker = Worker {
            endpoints: endpoints.clone(),
            connector,
            config,
            conn: None,
            status: status_tx,
            events,
        };

        if !worker.reconnect().await {
            return Err(Error::NoSentinelReachable);
        }

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        tokio::spawn(worker.run(rx));

        Ok(Self {
            endpoints,
            requests: tx,
            status: status_rx,
        })
    }

    /// Ask the sentinel group for the master of `db`.
    ///
    /// Waits until the worker has serviced every earlier request and
    /// answered this one. Each call receives exactly one reply.
    pub async fn resolve(&self, db: &str) -> Result<MasterAddr> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(LookupRequest {
                db: db.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }
}

/// Owns the connection. Only this task reads, writes or replaces it.
struct Worker<C: Connector> {
    endpoints: Arc<[String]>,
    connector: C,
    config: SessionConfig,
    conn: Option<BufStream<C::Stream>>,
    status: watch::Sender<SessionStatus>,
    events: Arc<EventPublisher>,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self, mut requests: mpsc::Receiver<LookupRequest>) {
        while let Some(request) = requests.recv().await {
            let (result, sweep) = self.serve(&request.db).await;

            // Caller may have given up; the reply is dropped then.
            let _ = request.reply.send(result);

            if sweep {
                self.conn = None;
                self.reconnect().await;
            }
        }

        self.conn = None;
        self.set_status(SessionState::Disconnected, None);
        log::debug!("sentinel session for [{}] stopped", self.endpoints.join(", "));
    }

    /// Service one lookup.
    ///
    /// Returns the reply plus whether the connection should be replaced
    /// once the reply has been delivered. A broken connection is replaced
    /// before replying and the request is re-issued once on the new one.
    async fn serve(&mut self, db: &str) -> (Result<MasterAddr>, bool) {
        if self.conn.is_none() && !self.reconnect().await {
            return (Err(Error::SentinelsExhausted), false);
        }

        let mut reissued = false;
        loop {
            let (result, link) = self.query(db).await;
            let err = match result {
                Ok(addr) => return (Ok(addr), false),
                Err(e) => e,
            };

            self.events.publish(TunnelEvent::LookupFailed {
                db: db.to_string(),
                error: err.to_string(),
            });
            // Only a null reply is known to have been read in full. Any
            // other decode failure may leave bytes of the reply unread.
            let reply_consumed = matches!(err, Error::NullReply(_));
            let failed = Error::LookupFailed {
                db: db.to_string(),
                source: Box::new(err),
            };

            if !link.is_broken() {
                let sweep =
                    self.config.reconnect_policy == ReconnectPolicy::Always || !reply_consumed;
                return (Err(failed), sweep);
            }

            self.conn = None;
            self.set_status(SessionState::Faulted, None);
            if reissued {
                return (Err(failed), false);
            }
            if !self.reconnect().await {
                return (Err(Error::SentinelsExhausted), false);
            }
            let endpoint = self.status.borrow().endpoint.clone();
            if let Some(sentinel) = endpoint {
                self.events.publish(TunnelEvent::Reconnected { sentinel });
            }
            reissued = true;
        }
    }

    async fn query(&mut self, db: &str) -> (Result<MasterAddr>, LinkStatus) {
        let Some(conn) = self.conn.as_mut() else {
            return (Err(Error::PeerClosed), LinkStatus::Broken);
        };

        match self.config.io_timeout {
            Some(limit) => match timeout(limit, get_master_addr_by_name(conn, db)).await {
                Ok(outcome) => outcome,
                Err(_) => (Err(Error::IoTimeout), LinkStatus::Broken),
            },
            None => get_master_addr_by_name(conn, db).await,
        }
    }

    /// Walk the endpoint list once, adopting the first successful dial.
    async fn reconnect(&mut self) -> bool {
        self.set_status(SessionState::Connecting, None);
        let endpoints = self.endpoints.clone();

        for addr in endpoints.iter() {
            // Stale connection is closed before any new dial.
            self.conn = None;

            self.events.publish(TunnelEvent::Connecting {
                sentinel: addr.clone(),
            });
            match dial(&self.connector, addr, self.config.dial_timeout).await {
                Ok(stream) => {
                    self.conn = Some(BufStream::new(stream));
                    self.events.publish(TunnelEvent::Connected {
                        sentinel: addr.clone(),
                    });
                    self.set_status(SessionState::Connected, Some(addr.clone()));
                    return true;
                }
                Err(e) => {
                    self.events.publish(TunnelEvent::DialFailed {
                        sentinel: addr.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.events.publish(TunnelEvent::Exhausted {
            sentinels: endpoints.to_vec(),
        });
        self.set_status(SessionState::Faulted, None);
        false
    }

    fn set_status(&self, state: SessionState, endpoint: Option<String>) {
        self.status.send_replace(SessionStatus { state, endpoint });
    }
}
