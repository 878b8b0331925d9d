//! Registry store — loads and persists the target list and global settings.

use crate::error::{BackupError, BackupResult};
use crate::target::{BackupTarget, GlobalSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub targets: Vec<BackupTarget>,
    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted registry. A missing file is an empty registry.
    pub fn load(&self) -> BackupResult<RegistryData> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No registry at {}, starting empty", self.path.display());
                return Ok(RegistryData::default());
            }
            Err(e) => return Err(persistence(&self.path, e)),
        };
        let data: RegistryData = serde_json::from_str(&json)?;
        log::info!(
            "Loaded {} target(s) from {}",
            data.targets.len(),
            self.path.display()
        );
        Ok(data)
    }

    /// Overwrite the persisted registry with `data`.
    ///
    /// Writes a sibling temp file first and renames it into place, so a crash
    /// mid-write leaves the previous registry intact.
    pub fn save(&self, data: &RegistryData) -> BackupResult<()> {
        let json = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| persistence(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| persistence(&self.path, e))?;
        log::debug!("Saved registry to {}", self.path.display());
        Ok(())
    }
}

fn persistence(path: &Path, e: io::Error) -> BackupError {
    BackupError::Persistence(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty_default() {
        let tmp = TempDir::new().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"));

        let data = store.load().unwrap();
        assert!(data.targets.is_empty());
        assert_eq!(data.settings, GlobalSettings::default());
    }

    #[test]
    fn test_save_then_load_keeps_targets_and_settings() {
        let tmp = TempDir::new().unwrap();
        let store = RegistryStore::new(tmp.path().join("nested").join("registry.json"));
        let mut target = BackupTarget::new("docs".into(), tmp.path().join("docs"));
        target.stamps = vec!["2024-01-01_08-00-00".into()];
        target.timer_enabled = true;
        let data = RegistryData {
            targets: vec![target],
            settings: GlobalSettings {
                autostart: true,
                minimize_on_close: false,
            },
        };

        store.save(&data).unwrap();
        assert_eq!(store.load().unwrap(), data);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_corrupt_file_is_persistence_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        fs::write(&path, b"{ not json").unwrap();

        let result = RegistryStore::new(path).load();
        assert!(matches!(result, Err(BackupError::Persistence(_))));
    }
}
