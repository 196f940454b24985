use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Framing(String),

    #[error("null request: sentinel does not know master '{0}'")]
    NullReply(String),

    #[error("failed read line from sentinel")]
    PeerClosed,

    #[error("dial timeout connecting to {0}")]
    DialTimeout(String),

    #[error("sentinel did not answer in time")]
    IoTimeout,

    #[error("could not connect to any sentinels")]
    NoSentinelReachable,

    #[error("failed to connect to any of the sentinel services")]
    SentinelsExhausted,

    #[error("all sentinels failed")]
    AllSentinelsFailed { failures: Vec<String> },

    #[error("failed to retrieve db name from the sentinel, db_name:{db}: {source}")]
    LookupFailed {
        db: String,
        #[source]
        source: Box<Error>,
    },

    #[error("sentinel session is closed")]
    SessionClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error means the physical connection can no longer be used.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::PeerClosed | Error::DialTimeout(_) | Error::IoTimeout | Error::Io(_) => true,
            Error::LookupFailed { source, .. } => source.is_connection_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
