//! Application configuration — storage paths, retention and timer limits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Retention limit used while a target's custom retention is switched off.
pub const DEFAULT_RETENTION_LIMIT: usize = 5;
/// Upper bound for a custom retention limit.
pub const MAX_RETENTION_LIMIT: usize = 100;
/// Interval given to newly created targets, in minutes.
pub const DEFAULT_TIMER_INTERVAL_MINUTES: u32 = 15;
/// Longest accepted timer interval, in minutes.
pub const MAX_TIMER_INTERVAL_MINUTES: u32 = 1000;

const APP_DIR: &str = "stamp-keeper";
const REGISTRY_FILE: &str = "registry.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root folder holding one subfolder per target, one per stamp below it
    pub storage_root: PathBuf,
    /// Path to the persisted registry
    pub registry_path: PathBuf,
}

impl AppConfig {
    /// Lay out storage and registry under a single data directory.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            storage_root: data_dir.join("storage"),
            registry_path: data_dir.join(REGISTRY_FILE),
        }
    }

    /// Folder holding every stamp of the named target.
    pub fn target_dir(&self, target_name: &str) -> PathBuf {
        self.storage_root.join(target_name)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(&default_data_dir())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
