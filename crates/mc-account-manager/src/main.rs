//! Load every seed file as a storage backend, merge them and print the
//! resulting accounts as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mc_account_manager::{Config, Coordinator};
use mc_storage_memory::MemoryStorage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    info!("Starting mc-account-manager v{}", env!("CARGO_PKG_VERSION"));
    info!("  Seed directory: {}", config.seed_dir.display());
    info!("  Min write priority: {}", config.min_write_priority);

    let mut coordinator = Coordinator::new(config.coordinator_config());
    for path in seed_files(&config.seed_dir)? {
        let storage = MemoryStorage::from_seed_file(&path)
            .with_context(|| format!("Failed to load seed {}", path.display()))?;
        coordinator.register(Arc::new(storage))?;
    }

    let summary = coordinator.load();
    for failed in &summary.failed {
        warn!("  Backend {} contributed no accounts", failed);
    }

    let handle = coordinator.start();

    let view = handle.snapshot(config.account.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    if config.commit {
        let report = handle.commit(None).await?;
        info!(
            "Commit accepted by {:?}, rejected by {:?}",
            report.accepted, report.rejected
        );
    }

    handle.shutdown().await?;
    Ok(())
}

/// `*.json` files in `dir`, sorted by name.
fn seed_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read seed directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
