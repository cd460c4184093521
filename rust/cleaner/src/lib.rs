use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use trashcan_config::registry::Registry;
use trashcan_config::Configurable;
use trashcan_system::System;

pub mod cleaner_component;
pub mod config;
pub mod lease;
pub mod protection;
pub mod pruner;
pub mod scanner;
pub mod sweeper;
pub mod types;

use cleaner_component::TrashcanCleaner;
use config::TrashcanCleanerConfig;

const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

pub async fn trashcan_cleaner_service_entrypoint() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(config_path) => {
            info!("Found config path: {}", config_path);
            TrashcanCleanerConfig::load_from_path(&config_path)
        }
        Err(_) => {
            info!("No config path found, using default");
            TrashcanCleanerConfig::load()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .init();

    info!("Loaded configuration successfully: {:#?}", config);

    let registry = Registry::new();
    let system = System::new();

    let cleaner = TrashcanCleaner::try_from_config(&config, &registry)
        .await
        .map_err(|e| {
            error!("Failed to create trashcan cleaner component: {:?}", e);
            e
        })?;
    let mut cleaner_handle = system.start_component(cleaner);

    // Keep the service running and handle shutdown signals
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Service running, waiting for signals");
    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal");
        }
    }
    info!("Starting graceful shutdown, waiting for an in-progress sweep");
    cleaner_handle.stop();
    cleaner_handle.join().await?;
    system.stop().await;
    system.join().await;

    info!("Shutting down trashcan cleaner service");
    Ok(())
}
