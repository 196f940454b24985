//! In-process fake sentinels shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream, DuplexStream};
use tokio::net::TcpListener;
use tokio::time::timeout;

use super::connector::Connector;
use crate::protocol::{MasterAddr, Reply, read_multi_bulk};

/// How long the fake waits for bytes of a pipelined request before replying
const PIPELINE_PROBE: Duration = Duration::from_millis(15);

/// What a fake sentinel connection does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer every request from the master table
    Answer,
    /// Answer `n` requests, then close the connection
    AnswerThenClose(usize),
    /// Read requests, never answer
    Hang,
    /// Answer with a reply that breaks bulk framing
    Garble,
    /// Misstate the host length in the first reply, answer correctly after
    MisframeFirst,
    /// Answer with an absurd multi-bulk count
    HugeCount,
    /// Refuse the dial
    Refuse,
}

/// Ordering record kept by the fake sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Request(String),
    /// Logged just before the reply is written
    Reply(String),
    /// Bytes of another request arrived before the reply was written
    Interleaved,
}

pub type Masters = Arc<HashMap<String, MasterAddr>>;

pub fn masters(entries: &[(&str, &str, u16)]) -> Masters {
    Arc::new(
        entries
            .iter()
            .map(|(name, host, port)| (name.to_string(), MasterAddr::new(*host, *port)))
            .collect(),
    )
}

/// Serve the sentinel side of one connection.
pub async fn serve_fake<S>(
    stream: S,
    behavior: Behavior,
    masters: Masters,
    log: Arc<Mutex<Vec<Record>>>,
    probe_pipelining: bool,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufStream::new(stream);
    let mut answered = 0;

    loop {
        let (request, _) = read_multi_bulk(&mut stream).await;
        let name = match request {
            Ok(Reply::Bulks(parts)) if parts.len() == 3 => {
                String::from_utf8_lossy(&parts[2]).to_string()
            }
            _ => return,
        };
        log.lock().push(Record::Request(name.clone()));

        if behavior == Behavior::Hang {
            continue;
        }

        if probe_pipelining
            && let Ok(Ok(buf)) = timeout(PIPELINE_PROBE, stream.fill_buf()).await
            && !buf.is_empty()
        {
            log.lock().push(Record::Interleaved);
        }

        let reply = match (behavior, masters.get(&name)) {
            (Behavior::Garble, _) => b"*2\r\n+oops\r\n".to_vec(),
            (Behavior::HugeCount, _) => b"*9223372036854775807\r\n".to_vec(),
            (_, Some(addr)) => {
                let port = addr.port.to_string();
                let misframe = behavior == Behavior::MisframeFirst && answered == 0;
                format!(
                    "*2\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
                    addr.host.len() + usize::from(misframe),
                    addr.host,
                    port.len(),
                    port
                )
                .into_bytes()
            }
            (_, None) => b"*-1\r\n".to_vec(),
        };
        log.lock().push(Record::Reply(name));
        if stream.write_all(&reply).await.is_err() || stream.flush().await.is_err() {
            return;
        }

        answered += 1;
        if let Behavior::AnswerThenClose(n) = behavior
            && answered >= n
        {
            return;
        }
    }
}

/// Connector handing out in-memory streams to fake sentinels.
///
/// Each dial consumes the next scripted [`Behavior`], falling back to the
/// default once the script is empty.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Mutex<Behavior>,
    masters: Masters,
    pub log: Arc<Mutex<Vec<Record>>>,
    pub dialed: Mutex<Vec<String>>,
    dials: AtomicUsize,
    probe_pipelining: bool,
}

impl ScriptedConnector {
    pub fn new(script: &[Behavior], fallback: Behavior, masters: Masters) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback: Mutex::new(fallback),
            masters,
            log: Arc::new(Mutex::new(Vec::new())),
            dialed: Mutex::new(Vec::new()),
            dials: AtomicUsize::new(0),
            probe_pipelining: false,
        })
    }

    pub fn probing(script: &[Behavior], fallback: Behavior, masters: Masters) -> Arc<Self> {
        let mut connector = Self::new(script, fallback, masters);
        if let Some(c) = Arc::get_mut(&mut connector) {
            c.probe_pipelining = true;
        }
        connector
    }

    pub fn set_fallback(&self, behavior: Behavior) {
        *self.fallback.lock() = behavior;
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<Record> {
        self.log.lock().clone()
    }
}

impl Connector for Arc<ScriptedConnector> {
    type Stream = DuplexStream;

    fn connect(&self, addr: &str) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dialed.lock().push(addr.to_string());
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(*self.fallback.lock());
        let masters = self.masters.clone();
        let log = self.log.clone();
        let probe = self.probe_pipelining;

        async move {
            if behavior == Behavior::Refuse {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ));
            }
            let (client, server) = tokio::io::duplex(4096);
            tokio::spawn(serve_fake(server, behavior, masters, log, probe));
            Ok(client)
        }
    }
}

/// Fake sentinel listening on a loopback port.
pub async fn spawn_tcp_sentinel(masters: Masters) -> (String, Arc<Mutex<Vec<Record>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let log = Arc::new(Mutex::new(Vec::new()));
    let task_log = log.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_fake(
                socket,
                Behavior::Answer,
                masters.clone(),
                task_log.clone(),
                false,
            ));
        }
    });

    (addr, log)
}

/// A loopback address nothing listens on.
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}
