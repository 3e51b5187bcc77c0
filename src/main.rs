use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use relay_store::{KeyedStore, MemoryStore, SqliteStore};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use edge_relay::config::Config;
use edge_relay::server::{RelayState, build_router};
use edge_relay::stream::StreamRegistry;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::from_toml();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_level(true).with_target(false))
        .init();

    let store: Arc<dyn KeyedStore> = if cfg.basic.uses_durable_store() {
        Arc::new(SqliteStore::connect(&cfg.basic.database_url).await?)
    } else {
        Arc::new(MemoryStore::new())
    };

    let state = RelayState::new(&cfg, store);
    let streams = state.streams.clone();
    let app = build_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(streams));
    match tokio::time::timeout(SHUTDOWN_DEADLINE + Duration::from_secs(5), serve).await {
        Ok(Ok(())) => info!("server has shut down gracefully"),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => warn!("shutdown deadline exceeded; exiting"),
    }
    Ok(())
}

/// Waits for SIGINT/SIGTERM, then tells every stream hub to emit a final `draining` envelope and
/// close before returning. The caller bounds the overall wait with a timeout.
async fn shutdown_signal(streams: Arc<StreamRegistry>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received; draining streams");
    streams.drain_all().await;
}
