//! Tunnel Events
//!
//! Structured events emitted by the resolution engine. Every event is logged
//! through the `log` facade and kept in a short in-memory history.

use std::collections::VecDeque;

use log::Level;
use parking_lot::Mutex;

/// Number of events kept for `recent()`
const HISTORY_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// A database name resolved to a master address
    Resolved { db: String, addr: String },
    /// Resolved address after prefix rewriting
    Rewritten {
        db: String,
        from: String,
        to: String,
    },
    /// Dialing a sentinel endpoint
    Connecting { sentinel: String },
    /// Dial succeeded
    Connected { sentinel: String },
    /// Dial failed or timed out
    DialFailed { sentinel: String, error: String },
    /// A broken session connection was replaced
    Reconnected { sentinel: String },
    /// Every endpoint of a sentinel group failed during a sweep
    Exhausted { sentinels: Vec<String> },
    /// A lookup failed on one source
    LookupFailed { db: String, error: String },
    /// Every source of a resolver failed
    AllSourcesFailed { db: String },
}

impl TunnelEvent {
    /// Event name, in the style of sentinel pub/sub channels
    pub fn channel_name(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "+resolved",
            Self::Rewritten { .. } => "+rewritten",
            Self::Connecting { .. } => "+sentinel-connecting",
            Self::Connected { .. } => "+sentinel-connected",
            Self::DialFailed { .. } => "-sentinel-dial",
            Self::Reconnected { .. } => "+sentinel-reconnected",
            Self::Exhausted { .. } => "-sentinels-exhausted",
            Self::LookupFailed { .. } => "-lookup",
            Self::AllSourcesFailed { .. } => "-all-sentinels-failed",
        }
    }

    pub fn format_message(&self) -> String {
        match self {
            Self::Resolved { db, addr } => format!("'{}' resolved to master: {}", db, addr),
            Self::Rewritten { db, from, to } => format!(
                "'{}' resolved to master (after IP Address replacement): {} (was {})",
                db, to, from
            ),
            Self::Connecting { sentinel } => format!("connecting to sentinel {}", sentinel),
            Self::Connected { sentinel } => format!("connected to sentinel: {}", sentinel),
            Self::DialFailed { sentinel, error } => {
                format!("error reconnect to sentinel {}: {}", sentinel, error)
            }
            Self::Reconnected { sentinel } => {
                format!("reconnected successfully to sentinel {}", sentinel)
            }
            Self::Exhausted { sentinels } => format!(
                "failed to connect to any of the sentinel services [{}]",
                sentinels.join(", ")
            ),
            Self::LookupFailed { db, error } => {
                format!("error while receiving name '{}' from sentinel: {}", db, error)
            }
            Self::AllSourcesFailed { db } => format!("all sentinels failed for '{}'", db),
        }
    }

    fn level(&self) -> Level {
        match self {
            Self::Resolved { .. } | Self::Rewritten { .. } | Self::Reconnected { .. } => {
                Level::Info
            }
            Self::Connecting { .. } | Self::Connected { .. } => Level::Debug,
            Self::DialFailed { .. } | Self::LookupFailed { .. } => Level::Warn,
            Self::Exhausted { .. } | Self::AllSourcesFailed { .. } => Level::Error,
        }
    }
}

/// Event sink shared by sessions and resolvers
#[derive(Debug, Default)]
pub struct EventPublisher {
    history: Mutex<VecDeque<TunnelEvent>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the event and record it
    pub fn publish(&self, event: TunnelEvent) {
        log::log!(
            target: "sentinel_tunnel::events",
            event.level(),
            "{} {}",
            event.channel_name(),
            event.format_message()
        );

        let mut history = self.history.lock();
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Snapshot of the most recent events, oldest first
    pub fn recent(&self) -> Vec<TunnelEvent> {
        self.history.lock().iter().cloned().collect()
    }
}
