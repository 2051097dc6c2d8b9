//! cache-link - keep a connection to the cache backend and report its state

use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_link::{config::Args, ConnectionManager, ConnectionState, TcpBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_tracing(&args);

    if let Err(e) = args.cache.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  cache-link");
    info!("======================================");
    info!("Cache: {}", args.cache.redacted_uri());
    info!("Address family: {:?}", args.cache.address_family());
    info!(
        "Reconnect: +{}ms per attempt, max {}ms",
        args.cache.reconnect_step_ms, args.cache.reconnect_max_ms
    );
    info!("Probe interval: {}ms", args.probe_interval_ms);
    info!("======================================");

    let manager = ConnectionManager::new(args.cache.clone(), TcpBackend);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.probe_interval_ms.max(1)));
    let mut last_state = ConnectionState::Uninitialized;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(handle) = manager.acquire() {
                    // Without a protocol, a socket dropped by the peer only shows up as EOF
                    if handle.is_open() && peer_closed(&handle).await {
                        handle.report_failure("connection closed by peer");
                    }
                }

                let status = manager.status();
                if args.json {
                    println!("{}", serde_json::to_string(&status)?);
                } else if status.state != last_state {
                    info!(
                        state = %status.state,
                        generation = status.generation,
                        "Cache connection {}", status.state
                    );
                }
                last_state = status.state;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    if let Some(handle) = manager.current() {
        handle.close();
    }

    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cache_link={},info", args.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// EOF check on an idle socket; peeks so no data is consumed
async fn peer_closed(handle: &cache_link::TcpHandle) -> bool {
    let guard = handle.lock_stream().await;
    let Some(stream) = guard.as_ref() else {
        return false;
    };

    let mut buf = [0u8; 1];
    match tokio::time::timeout(Duration::from_millis(1), stream.peek(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}
