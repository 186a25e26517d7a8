use std::path::PathBuf;

use clap::Parser;
use mc_storage_core::PRIORITY_DEFAULT;

/// Tuning of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Backends below this priority are never asked to store values or
    /// create accounts.
    pub min_write_priority: i32,
    /// Capacity of the outward event channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_write_priority: PRIORITY_DEFAULT,
            event_capacity: 256,
        }
    }
}

/// Configuration for the mc-account-manager binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "mc-account-manager")]
#[command(about = "Merge account storage backends and print the resulting accounts")]
pub struct Config {
    /// Directory of JSON seed files, one storage backend per file
    #[arg(long, env = "MC_SEED_DIR")]
    pub seed_dir: PathBuf,

    /// Lowest priority a backend needs to be asked to store anything
    #[arg(long, default_value = "0", env = "MC_MIN_WRITE_PRIORITY", allow_hyphen_values = true)]
    pub min_write_priority: i32,

    /// Only print this account
    #[arg(long)]
    pub account: Option<String>,

    /// Ask every backend to commit before exiting
    #[arg(long)]
    pub commit: bool,
}

impl Config {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            min_write_priority: self.min_write_priority,
            ..CoordinatorConfig::default()
        }
    }
}
