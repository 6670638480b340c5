//! `FarmWorld` server binary.
//!
//! Wires the tick loop to its collaborators: `Dragonfly` for persistence,
//! a `WebSocket` listener for clients, and a clock checkpoint writer.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `farmworld-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `Dragonfly`
//! 4. Resume the clock from the last checkpoint
//! 5. Assemble server state and clear locks orphaned by a previous run
//! 6. Start the `WebSocket` listener
//! 7. Run the tick loop until `Ctrl-C`
//! 8. Write a final checkpoint and stop the listener

mod checkpoint;
mod error;
mod store_bridge;
mod transport;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use farmworld_core::config::{LoggingConfig, ServerConfig};
use farmworld_core::runner::{self, RunnerOptions};
use farmworld_core::store::WorldStore;
use farmworld_core::tick::ServerState;
use farmworld_db::DragonflyPool;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::checkpoint::CheckpointCallback;
use crate::error::ServerError;
use crate::store_bridge::DragonflyStore;
use crate::transport::{AppState, ConnectionTable, WsTransport};

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "farmworld-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step or the tick loop fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::var("FARMWORLD_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = ServerConfig::from_file_or_default(&config_path).map_err(ServerError::from)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        host = config.server.host,
        port = config.server.port,
        ticks_per_second = config.server.ticks_per_second,
        max_clients = config.server.max_clients,
        "farmworld-server starting"
    );

    // 3. Connect to Dragonfly.
    let pool = DragonflyPool::connect(&config.infrastructure.dragonfly_url)
        .await
        .map_err(ServerError::from)?;

    // 4. Resume the clock.
    let checkpoint = pool.get_world_clock().await.map_err(ServerError::from)?;
    let clock_offset_ms = checkpoint.unwrap_or(config.time.start_time_ms);
    info!(
        clock_offset_ms,
        resumed = checkpoint.is_some(),
        "Simulation clock initialized"
    );

    // 5. Assemble server state.
    let connections = Arc::new(ConnectionTable::new(config.server.max_clients));
    let store: Arc<dyn WorldStore> = Arc::new(DragonflyStore::new(pool.clone()));
    let mut state = ServerState::new(
        &config,
        store,
        Box::new(WsTransport::new(Arc::clone(&connections))),
        clock_offset_ms,
    )
    .map_err(ServerError::from)?;
    let cleared = state
        .locks
        .recover_startup_locks()
        .map_err(ServerError::from)?;
    info!(cleared, "Startup lock recovery complete");

    // 6. Start the WebSocket listener.
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown) = watch::channel(false);
    let app = Router::new()
        .route("/ws", get(transport::ws_client))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            connections,
            inbox: inbox_tx,
        });
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ServerError::Listener {
            message: format!("invalid address: {e}"),
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Listener {
            message: format!("bind failed on {addr}: {e}"),
        })?;
    info!(%addr, "WebSocket listener ready");

    let mut listener_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = listener_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "WebSocket listener stopped with an error");
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    // 7. Run the tick loop.
    let options = RunnerOptions {
        tick_interval: config.server.tick_interval(),
        max_ticks: 0,
    };
    let mut callback = CheckpointCallback::new(pool.clone());
    let result = runner::run_server(&mut state, &mut inbox, &mut shutdown, options, &mut callback)
        .await
        .map_err(ServerError::from)?;
    runner::log_run_end(&result);

    // 8. Final checkpoint and listener shutdown.
    let final_time = state.clock.now();
    if let Err(e) = pool.set_world_clock(final_time).await {
        warn!(time_ms = final_time, error = %e, "Final clock checkpoint failed");
    }
    if let Err(e) = server.await {
        warn!(error = %e, "WebSocket listener task panicked");
    }

    info!(
        reason = ?result.reason,
        total_ticks = result.total_ticks,
        final_time_ms = final_time,
        "farmworld-server shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
