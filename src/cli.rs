use crate::config::{ResolverMode, TunnelConfig, parse_bool};
use crate::error::{Error, Result};
use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sentinel-tunnel")]
#[command(version)]
#[command(about = "Local tunnels to Redis masters discovered through Sentinel", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: PathBuf,

    /// Log level (debug, verbose, notice, warning, nothing)
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Log file path
    #[arg(long)]
    pub logfile: Option<String>,

    /// Rewrite resolved addresses (yes/no)
    #[arg(long)]
    pub replace_ip_address: Option<String>,

    /// Source kind: session or direct
    #[arg(long)]
    pub resolver_mode: Option<String>,
}

impl Cli {
    /// Parse process arguments and load the validated configuration.
    pub fn load_config() -> Result<TunnelConfig> {
        Cli::parse().to_config()
    }

    pub fn to_config(&self) -> Result<TunnelConfig> {
        let mut config = TunnelConfig::from_file(&self.config_file)?;
        self.apply_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut TunnelConfig) -> Result<()> {
        if let Some(loglevel) = &self.loglevel {
            config.loglevel = loglevel.clone();
        }
        if let Some(logfile) = &self.logfile {
            config.logfile = logfile.clone();
        }
        if let Some(replace) = &self.replace_ip_address {
            config.replace_ip_address = parse_bool(replace).map_err(Error::Config)?;
        }
        if let Some(mode) = &self.resolver_mode {
            config.resolver_mode = ResolverMode::parse(mode)
                .ok_or_else(|| Error::Config(format!("invalid resolver-mode '{}'", mode)))?;
        }
        Ok(())
    }
}
