//! Tunnel listeners
//!
//! One TCP listener per configured database. Every accepted client triggers
//! a fresh master lookup and is then spliced to the master byte for byte.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::resolver::{MasterResolver, Resolver, Source};

/// Timeout for connecting to a resolved master
const MASTER_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TunnelServer<S: MasterResolver = Source> {
    resolver: Arc<Resolver<S>>,
    listeners: Vec<(String, TcpListener)>,
}

impl<S: MasterResolver + 'static> TunnelServer<S> {
    /// Bind a listener for every database. Fails if any address is taken.
    pub async fn bind(resolver: Arc<Resolver<S>>, databases: &[DatabaseConfig]) -> Result<Self> {
        let mut listeners = Vec::with_capacity(databases.len());
        for db in databases {
            let listener = TcpListener::bind(&db.listen).await.map_err(|e| {
                Error::Config(format!(
                    "cannot listen on {} for '{}': {}",
                    db.listen, db.name, e
                ))
            })?;
            log::info!("'{}' tunnel listening on {}", db.name, listener.local_addr()?);
            listeners.push((db.name.clone(), listener));
        }
        Ok(Self {
            resolver,
            listeners,
        })
    }

    pub fn local_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.listeners
            .iter()
            .filter_map(|(db, l)| l.local_addr().ok().map(|addr| (db.clone(), addr)))
            .collect()
    }

    /// Start accepting on every listener.
    pub fn run(self) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for (db, listener) in self.listeners {
            tasks.spawn(accept_loop(self.resolver.clone(), db, listener));
        }
        tasks
    }
}

async fn accept_loop<S: MasterResolver + 'static>(
    resolver: Arc<Resolver<S>>,
    db: String,
    listener: TcpListener,
) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let resolver = resolver.clone();
                let db = db.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, &resolver, &db).await {
                        log::warn!("'{}' client {} error: {}", db, addr, e);
                    }
                });
            }
            Err(e) => {
                log::error!("'{}' accept error: {}", db, e);
            }
        }
    }
}

/// Resolve the master for `db` and splice `client` to it.
async fn handle_client<S: MasterResolver>(
    mut client: TcpStream,
    resolver: &Resolver<S>,
    db: &str,
) -> Result<()> {
    client.set_nodelay(true)?;

    let master = resolver.resolve(db).await?;
    let mut upstream = match timeout(MASTER_CONNECT_TIMEOUT, TcpStream::connect(&master)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(Error::Io(e)),
        Err(_) => return Err(Error::DialTimeout(master.clone())),
    };
    upstream.set_nodelay(true)?;

    let (to_master, to_client) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    log::debug!(
        "'{}' connection to {} closed ({} bytes up, {} bytes down)",
        db,
        master,
        to_master,
        to_client
    );
    Ok(())
}
