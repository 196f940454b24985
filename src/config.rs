//! Tunnel configuration
//!
//! One directive per line, `#` starts a comment:
//!
//! ```text
//! sentinel 10.0.0.1:26379 10.0.0.2:26379
//! database mymaster 127.0.0.1:6379
//! replace-ip-address yes
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::resolver::AddressRewrite;
use crate::sentinel::{ReconnectPolicy, SessionConfig};

/// How sentinel groups become resolution sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverMode {
    /// One reconnecting session per `sentinel` line
    #[default]
    Session,
    /// One per-lookup client per sentinel address
    Direct,
}

impl ResolverMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "session" => Some(Self::Session),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// A logical database exposed on a local listen address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub name: String,
    pub listen: String,
}

#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Groups of interchangeable sentinel endpoints, in priority order
    pub sentinels: Vec<Vec<String>>,
    pub databases: Vec<DatabaseConfig>,
    pub replace_ip_address: bool,
    pub rewrite: AddressRewrite,
    pub resolver_mode: ResolverMode,
    pub reconnect_policy: ReconnectPolicy,
    /// Milliseconds per dial attempt (default 300)
    pub dial_timeout_ms: u64,
    /// Milliseconds per lookup on an open connection, 0 disables (default 1000)
    pub io_timeout_ms: u64,
    pub loglevel: String,
    /// Empty means stderr
    pub logfile: String,
    /// Unknown directives skipped by the parser, as `line N: directive`
    pub ignored_directives: Vec<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            sentinels: Vec::new(),
            databases: Vec::new(),
            replace_ip_address: false,
            rewrite: AddressRewrite::default(),
            resolver_mode: ResolverMode::default(),
            reconnect_policy: ReconnectPolicy::default(),
            dial_timeout_ms: 300,
            io_timeout_ms: 1000,
            loglevel: "notice".to_string(),
            logfile: String::new(),
            ignored_directives: Vec::new(),
        }
    }
}

impl TunnelConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse config text. Unknown directives are skipped and recorded in
    /// `ignored_directives`; malformed known directives are errors.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let handled = parse_line(line, &mut config)
                .map_err(|e| Error::Config(format!("line {}: {}", line_num + 1, e)))?;
            if !handled {
                let directive = line.split_whitespace().next().unwrap_or_default();
                config
                    .ignored_directives
                    .push(format!("line {}: {}", line_num + 1, directive));
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentinels.is_empty() {
            return Err(Error::Config("no sentinel configured".into()));
        }
        for group in &self.sentinels {
            if group.is_empty() {
                return Err(Error::Config("empty sentinel group".into()));
            }
            for addr in group {
                validate_endpoint(addr)?;
            }
        }

        let mut seen = HashSet::new();
        for db in &self.databases {
            if !seen.insert(db.name.as_str()) {
                return Err(Error::Config(format!("duplicate database '{}'", db.name)));
            }
        }

        if self.dial_timeout_ms == 0 {
            return Err(Error::Config("dial-timeout-ms must be positive".into()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            dial_timeout: Duration::from_millis(self.dial_timeout_ms),
            io_timeout: (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms)),
            reconnect_policy: self.reconnect_policy,
        }
    }

    /// The rewrite to apply, if address replacement is enabled
    pub fn active_rewrite(&self) -> Option<AddressRewrite> {
        self.replace_ip_address.then(|| self.rewrite.clone())
    }
}

/// Apply one directive. Returns `Ok(false)` for an unknown directive.
fn parse_line(line: &str, config: &mut TunnelConfig) -> std::result::Result<bool, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let directive = parts[0].to_lowercase();
    let args = &parts[1..];

    match directive.as_str() {
        "sentinel" => {
            if args.is_empty() {
                return Err("sentinel directive requires at least one address".to_string());
            }
            config
                .sentinels
                .push(args.iter().map(|s| s.to_string()).collect());
        }
        "database" => {
            if args.len() != 2 {
                return Err("database directive requires: name listen-address".to_string());
            }
            config.databases.push(DatabaseConfig {
                name: args[0].to_string(),
                listen: args[1].to_string(),
            });
        }
        "replace-ip-address" => {
            config.replace_ip_address = parse_bool(single(args, "replace-ip-address")?)?;
        }
        "rewrite-prefix" => {
            if args.len() != 2 {
                return Err("rewrite-prefix requires: from to".to_string());
            }
            config.rewrite = AddressRewrite::new(args[0], args[1]);
        }
        "resolver-mode" => {
            let value = single(args, "resolver-mode")?;
            config.resolver_mode = ResolverMode::parse(value)
                .ok_or_else(|| format!("invalid resolver-mode '{}'", value))?;
        }
        "reconnect-policy" => {
            let value = single(args, "reconnect-policy")?;
            config.reconnect_policy = ReconnectPolicy::parse(value)
                .ok_or_else(|| format!("invalid reconnect-policy '{}'", value))?;
        }
        "dial-timeout-ms" => {
            config.dial_timeout_ms = parse_u64(single(args, "dial-timeout-ms")?, "dial-timeout-ms")?;
        }
        "io-timeout-ms" => {
            config.io_timeout_ms = parse_u64(single(args, "io-timeout-ms")?, "io-timeout-ms")?;
        }
        "loglevel" => {
            config.loglevel = single(args, "loglevel")?.to_string();
        }
        "logfile" => {
            config.logfile = single(args, "logfile")?.to_string();
        }
        _ => return Ok(false),
    }

    Ok(true)
}

fn single<'a>(args: &[&'a str], directive: &str) -> std::result::Result<&'a str, String> {
    match args {
        [value] => Ok(*value),
        _ => Err(format!("{} requires exactly one value", directive)),
    }
}

fn validate_endpoint(addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("sentinel address '{}' has no port", addr)))?;
    if host.is_empty() {
        return Err(Error::Config(format!("sentinel address '{}' has no host", addr)));
    }
    port.parse::<u16>()
        .map_err(|_| Error::Config(format!("invalid port in sentinel address '{}'", addr)))?;
    Ok(())
}

pub(crate) fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(format!("invalid boolean value: {}", s)),
    }
}

fn parse_u64(s: &str, field: &str) -> std::result::Result<u64, String> {
    s.parse()
        .map_err(|_| format!("invalid {} value: {}", field, s))
}
