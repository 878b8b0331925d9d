//! Core orchestration — owns the in-memory registry and serializes work per target.

use crate::backup::BackupManager;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{BackupError, BackupResult};
use crate::registry::{RegistryData, RegistryStore};
use crate::target::{BackupTarget, GlobalSettings, TargetOptions};
use crate::trees::{is_dir, TreeStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One registry entry with its own locks.
///
/// `op` is held for the whole of a rotation, stamp deletion, restore or
/// target deletion. `state` is only held long enough to read or write fields.
struct TargetSlot {
    op: Mutex<()>,
    state: RwLock<BackupTarget>,
    removed: AtomicBool,
}

impl TargetSlot {
    fn new(target: BackupTarget) -> Arc<Self> {
        Arc::new(Self {
            op: Mutex::new(()),
            state: RwLock::new(target),
            removed: AtomicBool::new(false),
        })
    }
}

pub struct BackupEngine {
    store: RegistryStore,
    backup_manager: BackupManager,
    clock: Arc<dyn Clock>,
    targets: RwLock<Vec<Arc<TargetSlot>>>,
    settings: RwLock<GlobalSettings>,
    save_lock: Mutex<()>,
}

impl BackupEngine {
    /// Build an engine from the persisted registry, or an empty one if none exists.
    pub fn open(
        config: &AppConfig,
        trees: Arc<dyn TreeStore>,
        clock: Arc<dyn Clock>,
    ) -> BackupResult<Self> {
        let store = RegistryStore::new(config.registry_path.clone());
        let data = store.load()?;
        Ok(Self {
            store,
            backup_manager: BackupManager::new(config.storage_root.clone(), trees),
            clock,
            targets: RwLock::new(data.targets.into_iter().map(TargetSlot::new).collect()),
            settings: RwLock::new(data.settings),
            save_lock: Mutex::new(()),
        })
    }

    async fn slot(&self, name: &str) -> BackupResult<Arc<TargetSlot>> {
        let targets = self.targets.read().await;
        for slot in targets.iter() {
            if slot.state.read().await.name == name {
                return Ok(slot.clone());
            }
        }
        Err(BackupError::TargetNotFound(name.to_string()))
    }

    /// Register `source` as a new target and return its generated name.
    pub async fn create_target(&self, source: &Path) -> BackupResult<String> {
        let source = match tokio::fs::canonicalize(source).await {
            Ok(path) if is_dir(&path).await => path,
            _ => return Err(BackupError::InvalidSource(source.to_path_buf())),
        };
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BackupError::InvalidSource(source.clone()))?;

        let mut targets = self.targets.write().await;
        let mut names = Vec::with_capacity(targets.len());
        for slot in targets.iter() {
            let target = slot.state.read().await;
            if target.source_path == source {
                return Err(BackupError::DuplicateTarget(source.display().to_string()));
            }
            names.push(target.name.clone());
        }
        let name = unique_name(&base, &names);
        targets.push(TargetSlot::new(BackupTarget::new(name.clone(), source.clone())));
        drop(targets);

        log::info!("Added target '{}' for {}", name, source.display());
        self.save().await?;
        Ok(name)
    }

    /// Delete the target, its stamps and its storage folder.
    ///
    /// The caller stops the target's timer first; a rotation already in
    /// flight finishes before the deletion proceeds.
    pub async fn delete_target(&self, name: &str) -> BackupResult<()> {
        let slot = self.slot(name).await?;
        let _op = slot.op.lock().await;
        if slot.removed.load(Ordering::SeqCst) {
            return Err(BackupError::TargetNotFound(name.to_string()));
        }
        let snapshot = slot.state.read().await.clone();
        self.backup_manager.delete_all_stamps(&snapshot).await?;

        slot.removed.store(true, Ordering::SeqCst);
        self.targets
            .write()
            .await
            .retain(|other| !Arc::ptr_eq(other, &slot));

        log::info!(
            "Deleted target '{}' and {} stamp(s)",
            name,
            snapshot.stamps.len()
        );
        self.save().await
    }

    pub async fn configure_target(&self, name: &str, options: TargetOptions) -> BackupResult<()> {
        options.validate()?;
        let slot = self.slot(name).await?;
        slot.state.write().await.apply(&options);
        log::info!("Updated options of '{}': {:?}", name, options);
        self.save().await
    }

    pub async fn list_targets(&self) -> Vec<BackupTarget> {
        let targets = self.targets.read().await;
        let mut out = Vec::with_capacity(targets.len());
        for slot in targets.iter() {
            out.push(slot.state.read().await.clone());
        }
        out
    }

    pub async fn get_target(&self, name: &str) -> BackupResult<BackupTarget> {
        let slot = self.slot(name).await?;
        let target = slot.state.read().await.clone();
        Ok(target)
    }

    pub async fn list_stamps(&self, name: &str) -> BackupResult<Vec<String>> {
        Ok(self.get_target(name).await?.stamps)
    }

    /// Current timer options of a target, `None` once it is gone.
    pub async fn timer_options(&self, name: &str) -> Option<TargetOptions> {
        self.get_target(name).await.ok().map(|t| t.options())
    }

    /// Rotate the target: take a new stamp, evicting the oldest at capacity.
    pub async fn create_stamp(&self, name: &str) -> BackupResult<String> {
        let slot = self.slot(name).await?;
        let _op = slot.op.lock().await;
        let snapshot = self.live_snapshot(&slot, name).await?;

        let rotation = self
            .backup_manager
            .create_stamp(&snapshot, self.clock.now())
            .await?;
        slot.state.write().await.stamps = rotation.stamps;

        // The rotation stands even if the registry can't be written yet.
        if let Err(e) = self.save().await {
            log::error!("Stamp {} of '{}' not persisted: {}", rotation.stamp, name, e);
            return Err(e);
        }
        Ok(rotation.stamp)
    }

    pub async fn delete_stamp(&self, name: &str, stamp: &str) -> BackupResult<()> {
        let slot = self.slot(name).await?;
        let _op = slot.op.lock().await;
        let snapshot = self.live_snapshot(&slot, name).await?;

        let remaining = self.backup_manager.delete_stamp(&snapshot, stamp).await?;
        slot.state.write().await.stamps = remaining;
        log::info!("Deleted stamp {} of '{}'", stamp, name);
        self.save().await
    }

    pub async fn restore_stamp(&self, name: &str, stamp: &str) -> BackupResult<()> {
        let slot = self.slot(name).await?;
        let _op = slot.op.lock().await;
        let snapshot = self.live_snapshot(&slot, name).await?;
        self.backup_manager
            .replace_source_with_stamp(&snapshot, stamp)
            .await
    }

    pub fn stamp_dir(&self, name: &str, stamp: &str) -> PathBuf {
        self.backup_manager.stamp_dir(name, stamp)
    }

    pub async fn settings(&self) -> GlobalSettings {
        *self.settings.read().await
    }

    pub async fn set_settings(&self, settings: GlobalSettings) -> BackupResult<()> {
        *self.settings.write().await = settings;
        self.save().await
    }

    /// Flush the whole registry to disk.
    pub async fn save(&self) -> BackupResult<()> {
        let _guard = self.save_lock.lock().await;
        let data = RegistryData {
            targets: self.list_targets().await,
            settings: self.settings().await,
        };
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&data))
            .await
            .map_err(|e| BackupError::Persistence(e.to_string()))?
    }

    async fn live_snapshot(&self, slot: &TargetSlot, name: &str) -> BackupResult<BackupTarget> {
        if slot.removed.load(Ordering::SeqCst) {
            return Err(BackupError::TargetNotFound(name.to_string()));
        }
        Ok(slot.state.read().await.clone())
    }
}

/// `base`, or `base` with the smallest counter suffix not yet taken.
fn unique_name(base: &str, taken: &[String]) -> String {
    let mut candidate = base.to_string();
    let mut counter = 0;
    while taken.iter().any(|n| *n == candidate) {
        counter += 1;
        candidate = format!("{}{}", base, counter);
    }
    candidate
}
