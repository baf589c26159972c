//! Timetable Server - scheduling job server over framed JSON TCP.
//!
//! Usage: timetable-server [algorithms-dir]
//! Environment: TIMETABLE_PORT (default 8080), TIMETABLE_ALGO_TIMEOUT (seconds).

use std::path::PathBuf;
use std::sync::Arc;

use timetable_core::algorithm::AlgorithmScanner;
use timetable_core::handlers::{AlgorithmHandler, CommandHandler, DataHandler, DebugHandler};
use timetable_core::{ServerConfig, System};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(dir) = std::env::args().nth(1) {
        config.algorithms_dir = PathBuf::from(dir);
    }

    info!("🗓️  Timetable server starting...");
    info!("   Port: {}", config.port);
    info!("   Algorithms: {}", config.algorithms_dir.display());

    let scanner = AlgorithmScanner::scan(&config.algorithms_dir);
    info!("   Discovered algorithms: {:?}", scanner.names());

    let system = Arc::new(System::new(&config)?);
    system.register_handler(Arc::new(DataHandler));
    system.register_handler(Arc::new(DebugHandler));
    system.register_handler(Arc::new(CommandHandler));
    system.register_handler(Arc::new(AlgorithmHandler::new(scanner)));
    system.start();

    info!("✅ Server listening on {}", system.local_addr());
    info!("Waiting for client connection...");

    let mut shutdown = system.shutdown_requested();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            connected = system.accept_connection() => {
                if connected {
                    info!("Client connected successfully");
                }
            }
        }
    }

    system.stop().await;
    info!("Server stopped");
    Ok(())
}
