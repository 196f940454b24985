//! Process logger
//!
//! Backs the `log` facade for the tunnel binary. Lines follow the Redis
//! layout `pid:marker timestamp message`, where the marker encodes the
//! level, and go to stderr unless `logfile` names a file to append to.

use crate::config::TunnelConfig;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Verbosity names accepted by the `loglevel` directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl Verbosity {
    /// Unrecognised names fall back to `notice`.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice,
        }
    }

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose | Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

enum Sink {
    Stderr,
    File(Mutex<File>),
}

pub struct TunnelLogger {
    max_level: LevelFilter,
    sink: Sink,
}

impl TunnelLogger {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            max_level: Verbosity::parse(&config.loglevel).level_filter(),
            sink: open_sink(&config.logfile),
        }
    }

    fn line(record: &Record) -> String {
        format!(
            "{}:{} {} {}\n",
            std::process::id(),
            marker(record.level()),
            timestamp(),
            record.args()
        )
    }
}

/// An unopenable log file degrades to stderr rather than failing startup.
fn open_sink(logfile: &str) -> Sink {
    if logfile.is_empty() {
        return Sink::Stderr;
    }
    match OpenOptions::new().create(true).append(true).open(logfile) {
        Ok(file) => Sink::File(Mutex::new(file)),
        Err(e) => {
            eprintln!("cannot open log file '{}', using stderr: {}", logfile, e);
            Sink::Stderr
        }
    }
}

fn marker(level: Level) -> char {
    match level {
        Level::Error => '!',
        Level::Warn => '#',
        Level::Info => '*',
        Level::Debug => '-',
        Level::Trace => '.',
    }
}

impl Log for TunnelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::line(record);
        match &self.sink {
            Sink::Stderr => eprint!("{}", line),
            Sink::File(file) => {
                let _ = file.lock().write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Sink::File(file) = &self.sink {
            let _ = file.lock().flush();
        }
    }
}

/// Seconds since the epoch with millisecond precision
fn timestamp() -> String {
    use std::time::SystemTime;

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

/// Install the tunnel logger as the process-wide `log` backend.
pub fn init_logging(config: &TunnelConfig) -> Result<(), log::SetLoggerError> {
    let logger = TunnelLogger::new(config);
    let max_level = logger.max_level;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}
