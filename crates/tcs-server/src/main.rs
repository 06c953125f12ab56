//! Thermostat contact sensors engine
//!
//! Loads the config entries from a YAML file (first argument, `tcs.yaml` by
//! default), starts one coordinator per entry on an in-process host and
//! exposes the entry services until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tcs_config::load_entries;
use tcs_coordinator::{register_services, EntryCoordinator, EntryRegistry};
use tcs_core::{SharedClock, SystemClock, DOMAIN};
use tcs_host::{LocalHost, SharedHost, Storage};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "tcs.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    info!(config = %config_path.display(), "Starting thermostat contact sensors");

    let entries = load_entries(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if entries.is_empty() {
        warn!("No config entries; nothing to do");
    }

    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let storage = Storage::new(config_dir);
    storage
        .ensure_dir()
        .await
        .context("creating the storage directory")?;

    let clock: SharedClock = Arc::new(SystemClock);
    let local = Arc::new(LocalHost::with_storage(clock.clone(), storage));
    let host: SharedHost = local.clone();

    let registry = Arc::new(EntryRegistry::new());
    register_services(local.services(), registry.clone());

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry_id = entry.entry_id.clone();
        let coordinator = EntryCoordinator::new(entry, host.clone(), clock.clone())
            .with_context(|| format!("setting up entry {}", entry_id))?;
        let (handle, task) = coordinator.spawn(shutdown_tx.subscribe());
        registry.insert(handle);
        tasks.push((entry_id, task));
    }
    info!(entries = registry.len(), "Thermostat contact sensors running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    // No receivers only when there are no entries
    let _ = shutdown_tx.send(());

    for (entry_id, task) in tasks {
        if let Err(err) = task.await {
            error!(entry_id = %entry_id, error = %err, "Coordinator task failed");
        }
        registry.remove(&entry_id);
    }
    local.services().unregister_domain(DOMAIN);
    info!("Stopped");
    Ok(())
}
