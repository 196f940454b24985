use std::sync::Arc;

use sentinel_tunnel::cli::Cli;
use sentinel_tunnel::config::{ResolverMode, TunnelConfig};
use sentinel_tunnel::logging::init_logging;
use sentinel_tunnel::{
    DirectSentinel, EventPublisher, Resolver, SentinelSession, Source, TunnelServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Cli::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config)?;
    for ignored in &config.ignored_directives {
        log::warn!("ignoring unknown config directive at {}", ignored);
    }

    let events = Arc::new(EventPublisher::new());
    let sources = match create_sources(&config, &events).await {
        Ok(sources) => sources,
        Err(e) => {
            log::error!("connect to sentinels: {}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "{} sentinel source(s) ready, address replacement {}",
        sources.len(),
        if config.replace_ip_address { "on" } else { "off" }
    );

    let resolver = Arc::new(Resolver::new(sources, config.active_rewrite(), events));
    let server = TunnelServer::bind(resolver, &config.databases).await?;
    let mut tasks = server.run();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown signal received.");
        }
        _ = async {
            if tasks.is_empty() {
                std::future::pending::<()>().await;
            }
            tasks.join_next().await
        } => {
            log::error!("Tunnel listener stopped unexpectedly.");
        }
    }

    tasks.shutdown().await;
    log::info!("sentinel-tunnel shutting down...");
    Ok(())
}

/// Build resolution sources in configuration order
async fn create_sources(
    config: &TunnelConfig,
    events: &Arc<EventPublisher>,
) -> sentinel_tunnel::Result<Vec<Source>> {
    let session_config = config.session_config();
    let mut sources = Vec::new();

    match config.resolver_mode {
        ResolverMode::Session => {
            for group in &config.sentinels {
                let session =
                    SentinelSession::connect(group.clone(), session_config, events.clone())
                        .await?;
                sources.push(Source::Session(session));
            }
        }
        ResolverMode::Direct => {
            for addr in config.sentinels.iter().flatten() {
                sources.push(Source::Direct(DirectSentinel::new(
                    addr.clone(),
                    &session_config,
                    events.clone(),
                )));
            }
        }
    }

    Ok(sources)
}
