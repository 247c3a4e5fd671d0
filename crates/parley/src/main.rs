//! Parley persistence coordinator.
//!
//! Connects the document and relational stores, keeps them recovered in the
//! background, and shuts them down cleanly on Ctrl-C. With `--check` it
//! connects once, prints a health report and exits non-zero unless every
//! configured store is healthy.

mod config;

use std::sync::Arc;

use clap::Parser;
use parley_persistence::backends::{self, Coordinator};
use parley_persistence::core::{StoreKind, TracingPublisher};
use tracing::{info, warn};

use config::ServerConfig;

/// Initializes the tracing subscriber. `RUST_LOG` overrides the level.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={0},parley_persistence={0}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Prints the health report and returns whether it was healthy.
async fn run_check(coordinator: &Coordinator) -> anyhow::Result<bool> {
    let response = coordinator.health_check_response().await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.is_healthy())
}

/// Runs until Ctrl-C.
async fn serve(coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    coordinator.start_recovery_scheduler();

    for store in StoreKind::ALL {
        let status = coordinator.status(store);
        info!(
            store = %store,
            configured = status.configured,
            connected = status.connected,
            "Store status"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let persistence = config.persistence_config();
    info!(
        document = persistence.document.is_some(),
        relational = persistence.relational.is_some(),
        version = parley_persistence::VERSION,
        "Starting parley"
    );

    let coordinator =
        Arc::new(backends::from_config(persistence).with_publisher(Arc::new(TracingPublisher)));

    if !coordinator.connect_all().await {
        warn!("Starting in degraded mode");
    }

    let result = if config.check {
        run_check(&coordinator).await
    } else {
        serve(Arc::clone(&coordinator)).await.map(|()| true)
    };

    coordinator.close_all().await;

    if !result? {
        std::process::exit(1);
    }
    Ok(())
}
