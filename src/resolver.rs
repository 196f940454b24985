//! Master resolution
//!
//! [`Resolver`] asks its sources in priority order and returns the first
//! address any of them reports. It does not vote: the first answer wins.

use std::future::Future;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::events::{EventPublisher, TunnelEvent};
use crate::protocol::MasterAddr;
use crate::sentinel::{DirectSentinel, SentinelSession};

/// Anything that can name the current master of a database.
pub trait MasterResolver: Send + Sync {
    fn resolve(&self, db: &str) -> impl Future<Output = Result<MasterAddr>> + Send;
}

impl MasterResolver for SentinelSession {
    fn resolve(&self, db: &str) -> impl Future<Output = Result<MasterAddr>> + Send {
        SentinelSession::resolve(self, db)
    }
}

impl MasterResolver for DirectSentinel {
    fn resolve(&self, db: &str) -> impl Future<Output = Result<MasterAddr>> + Send {
        DirectSentinel::resolve(self, db)
    }
}

/// A configured resolution source.
pub enum Source {
    Session(SentinelSession),
    Direct(DirectSentinel),
}

impl Source {
    /// Endpoints behind this source, for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Source::Session(session) => session.endpoints().join(","),
            Source::Direct(client) => client.addr().to_string(),
        }
    }
}

impl MasterResolver for Source {
    async fn resolve(&self, db: &str) -> Result<MasterAddr> {
        match self {
            Source::Session(session) => session.resolve(db).await,
            Source::Direct(client) => client.resolve(db).await,
        }
    }
}

/// Literal prefix substitution applied to resolved `host:port` strings.
///
/// This is a naive string replacement of the first occurrence of `from`,
/// not a subnet match: `192.168.1` also matches inside `192.168.10.4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRewrite {
    pub from: String,
    pub to: String,
}

impl AddressRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn apply(&self, addr: &str) -> String {
        addr.replacen(&self.from, &self.to, 1)
    }
}

impl Default for AddressRewrite {
    fn default() -> Self {
        Self::new("192.168.1", "192.168.2")
    }
}

pub struct Resolver<S: MasterResolver = Source> {
    sources: Vec<S>,
    rewrite: Option<AddressRewrite>,
    events: Arc<EventPublisher>,
}

impl<S: MasterResolver> Resolver<S> {
    /// `rewrite` is `Some` only when address replacement is enabled.
    pub fn new(sources: Vec<S>, rewrite: Option<AddressRewrite>, events: Arc<EventPublisher>) -> Self {
        Self {
            sources,
            rewrite,
            events,
        }
    }

    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Resolve `db` to a `host:port` string.
    ///
    /// Sources are tried in order; the first success short-circuits the
    /// rest. Fails with [`Error::AllSentinelsFailed`] when every source fails.
    pub async fn resolve(&self, db: &str) -> Result<String> {
        let mut failures = Vec::new();

        for (index, source) in self.sources.iter().enumerate() {
            let master = match source.resolve(db).await {
                Ok(master) => master,
                Err(e) => {
                    log::debug!("source {} failed to resolve '{}': {}", index, db, e);
                    failures.push(format!("source {}: {}", index, e));
                    continue;
                }
            };

            let addr = master.to_string();
            self.events.publish(TunnelEvent::Resolved {
                db: db.to_string(),
                addr: addr.clone(),
            });

            let Some(rewrite) = &self.rewrite else {
                return Ok(addr);
            };
            let rewritten = rewrite.apply(&addr);
            self.events.publish(TunnelEvent::Rewritten {
                db: db.to_string(),
                from: addr,
                to: rewritten.clone(),
            });
            return Ok(rewritten);
        }

        self.events.publish(TunnelEvent::AllSourcesFailed {
            db: db.to_string(),
        });
        Err(Error::AllSentinelsFailed { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::sentinel::SessionConfig;
    use crate::sentinel::testing::{closed_addr, masters, spawn_tcp_sentinel};

    /// Source with a canned answer
    struct Canned {
        answer: Option<MasterAddr>,
        calls: AtomicUsize,
    }

    impl Canned {
        fn ok(host: &str, port: u16) -> Self {
            Self {
                answer: Some(MasterAddr::new(host, port)),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MasterResolver for Canned {
        async fn resolve(&self, _db: &str) -> Result<MasterAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().ok_or(Error::PeerClosed)
        }
    }

    fn events() -> Arc<EventPublisher> {
        Arc::new(EventPublisher::new())
    }

    #[tokio::test]
    async fn test_falls_back_to_second_source() {
        let resolver = Resolver::new(
            vec![
                Canned::failing(),
                Canned::ok("10.0.0.7", 6379),
                Canned::ok("10.0.0.8", 6379),
            ],
            None,
            events(),
        );

        assert_eq!(resolver.resolve("mymaster").await.unwrap(), "10.0.0.7:6379");
        let calls: Vec<usize> = resolver
            .sources()
            .iter()
            .map(|s| s.calls.load(Ordering::SeqCst))
            .collect();
        assert_eq!(calls, vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let events = events();
        let resolver = Resolver::new(
            vec![Canned::failing(), Canned::failing()],
            None,
            events.clone(),
        );

        let err = resolver.resolve("mymaster").await.unwrap_err();
        match &err {
            Error::AllSentinelsFailed { failures } => assert_eq!(failures.len(), 2),
            other => panic!("expected aggregate failure, got {:?}", other),
        }
        assert_eq!(err.to_string(), "all sentinels failed");
        assert_eq!(
            events.recent().last(),
            Some(&TunnelEvent::AllSourcesFailed {
                db: "mymaster".into()
            })
        );
    }

    #[tokio::test]
    async fn test_no_sources() {
        let resolver: Resolver<Canned> = Resolver::new(vec![], None, events());
        assert!(matches!(
            resolver.resolve("mymaster").await,
            Err(Error::AllSentinelsFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_rewrite_enabled() {
        let events = events();
        let resolver = Resolver::new(
            vec![Canned::ok("192.168.1.42", 6379)],
            Some(AddressRewrite::default()),
            events.clone(),
        );

        assert_eq!(resolver.resolve("mymaster").await.unwrap(), "192.168.2.42:6379");
        let recent = events.recent();
        assert_eq!(
            recent,
            vec![
                TunnelEvent::Resolved {
                    db: "mymaster".into(),
                    addr: "192.168.1.42:6379".into(),
                },
                TunnelEvent::Rewritten {
                    db: "mymaster".into(),
                    from: "192.168.1.42:6379".into(),
                    to: "192.168.2.42:6379".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rewrite_disabled() {
        let resolver = Resolver::new(vec![Canned::ok("192.168.1.42", 6379)], None, events());
        assert_eq!(resolver.resolve("mymaster").await.unwrap(), "192.168.1.42:6379");
    }

    #[test]
    fn test_rewrite_first_occurrence_only() {
        let rewrite = AddressRewrite::new("192.168.1", "192.168.2");
        assert_eq!(rewrite.apply("192.168.1.42:6379"), "192.168.2.42:6379");
        assert_eq!(rewrite.apply("192.168.1.192.168.1"), "192.168.2.192.168.1");
        assert_eq!(rewrite.apply("10.0.0.1:6379"), "10.0.0.1:6379");
        // Naive substitution, not a subnet match.
        assert_eq!(rewrite.apply("192.168.10.4:6379"), "192.168.20.4:6379");
    }

    #[tokio::test]
    async fn test_sources_over_tcp() {
        let (live, _) = spawn_tcp_sentinel(masters(&[("mymaster", "10.0.0.5", 6379)])).await;
        let config = SessionConfig::default();
        let session = SentinelSession::connect(vec![live.clone()], config, events())
            .await
            .unwrap();

        let resolver = Resolver::new(
            vec![
                Source::Direct(DirectSentinel::new(closed_addr().await, &config, events())),
                Source::Session(session),
            ],
            None,
            events(),
        );

        assert_eq!(resolver.resolve("mymaster").await.unwrap(), "10.0.0.5:6379");
        assert_eq!(resolver.sources()[1].describe(), live);
        assert!(matches!(
            resolver.resolve("unknown").await,
            Err(Error::AllSentinelsFailed { .. })
        ));
    }
}
