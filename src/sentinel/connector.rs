//! Sentinel dialing
//!
//! The session and the direct client reach sentinels through [`Connector`],
//! which lets tests substitute in-memory streams for TCP.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Opens byte streams to sentinel endpoints.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let addr = addr.to_string();
        async move {
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }
}

/// Dial `addr` with a bounded timeout.
pub async fn dial<C: Connector>(
    connector: &C,
    addr: &str,
    dial_timeout: Duration,
) -> Result<C::Stream> {
    match timeout(dial_timeout, connector.connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => Err(Error::DialTimeout(addr.to_string())),
    }
}
