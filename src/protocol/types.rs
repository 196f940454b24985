use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Whether a sentinel connection can carry another request after a reply
/// (or a failed reply) has been read from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The stream is still framed correctly or at least still open.
    Usable,
    /// The peer closed, a read/write failed or timed out. Must be re-dialed.
    Broken,
}

impl LinkStatus {
    #[inline]
    pub fn is_broken(self) -> bool {
        self == LinkStatus::Broken
    }
}

/// Address of a master as reported by a sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MasterAddr {
    pub host: String,
    pub port: u16,
}

impl MasterAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build an address from the `[host, port]` bulk strings of a reply.
    pub fn from_reply(parts: Vec<Bytes>) -> Result<Self> {
        if parts.len() != 2 {
            return Err(Error::Framing(format!(
                "expected 2 elements in master address reply, got {}",
                parts.len()
            )));
        }

        let host = std::str::from_utf8(&parts[0])
            .map_err(|_| Error::Framing("master host is not valid utf8".into()))?;
        let port = std::str::from_utf8(&parts[1])
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| {
                Error::Framing(format!(
                    "invalid master port '{}'",
                    String::from_utf8_lossy(&parts[1])
                ))
            })?;

        Ok(Self::new(host, port))
    }
}

/// Formats as `host:port`, bracketing IPv6 hosts.
impl fmt::Display for MasterAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
