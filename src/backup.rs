//! Timestamped stamp rotation with bounded retention, plus restore.

use crate::error::{BackupError, BackupResult};
use crate::target::{oldest_stamp_index, stamp_id, BackupTarget};
use crate::trees::{is_dir, TreeStore};
use chrono::NaiveDateTime;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub struct BackupManager {
    storage_root: PathBuf,
    trees: Arc<dyn TreeStore>,
}

/// What a completed rotation did to a target's stamp list.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    pub stamp: String,
    pub evicted: Vec<String>,
    pub stamps: Vec<String>,
}

impl BackupManager {
    pub fn new(storage_root: PathBuf, trees: Arc<dyn TreeStore>) -> Self {
        Self { storage_root, trees }
    }

    pub fn target_dir(&self, target: &str) -> PathBuf {
        self.storage_root.join(target)
    }

    pub fn stamp_dir(&self, target: &str, stamp: &str) -> PathBuf {
        self.target_dir(target).join(stamp)
    }

    /// Snapshot the target's source into a new stamp named after `now`.
    ///
    /// At capacity the oldest stamps are evicted so that the result holds
    /// exactly the effective retention limit. The new snapshot is copied
    /// before anything is evicted; a failed copy leaves the target untouched.
    pub async fn create_stamp(
        &self,
        target: &BackupTarget,
        now: NaiveDateTime,
    ) -> BackupResult<Rotation> {
        let stamp = stamp_id(now);
        if target.has_stamp(&stamp) {
            return Err(BackupError::DuplicateStamp {
                target: target.name.clone(),
                stamp,
            });
        }

        let dest = self.stamp_dir(&target.name, &stamp);
        // An untracked leftover would otherwise be merged into the new copy.
        self.trees
            .delete_tree(&dest)
            .await
            .map_err(|e| BackupError::storage(&dest, e))?;

        if let Err(e) = self.trees.copy_tree(&target.source_path, &dest).await {
            if let Err(cleanup) = self.trees.delete_tree(&dest).await {
                log::warn!(
                    "Could not remove partial stamp {}: {}",
                    dest.display(),
                    cleanup
                );
            }
            return Err(BackupError::storage(&target.source_path, e));
        }

        let limit = target.effective_retention_limit().max(1);
        let mut stamps = target.stamps.clone();
        let mut evicted = Vec::new();
        let mut slot = None;
        while stamps.len() >= limit {
            let Some(idx) = oldest_stamp_index(&stamps) else {
                break;
            };
            evicted.push(stamps.remove(idx));
            slot.get_or_insert(idx);
        }
        match slot {
            Some(idx) => stamps.insert(idx.min(stamps.len()), stamp.clone()),
            None => stamps.push(stamp.clone()),
        }

        for victim in &evicted {
            let dir = self.stamp_dir(&target.name, victim);
            if let Err(e) = self.trees.delete_tree(&dir).await {
                log::warn!("Evicted stamp folder {} left behind: {}", dir.display(), e);
            }
        }

        log::info!(
            "Created stamp {} for '{}' ({} evicted, {}/{} kept)",
            stamp,
            target.name,
            evicted.len(),
            stamps.len(),
            limit
        );
        Ok(Rotation {
            stamp,
            evicted,
            stamps,
        })
    }

    /// Remove one stamp's folder and return the remaining stamp list.
    /// A folder that is already gone counts as deleted.
    pub async fn delete_stamp(
        &self,
        target: &BackupTarget,
        stamp: &str,
    ) -> BackupResult<Vec<String>> {
        ensure_stamp(target, stamp)?;
        let dir = self.stamp_dir(&target.name, stamp);
        let existed = self
            .trees
            .delete_tree(&dir)
            .await
            .map_err(|e| BackupError::storage(&dir, e))?;
        if !existed {
            log::warn!("Stamp folder {} was already missing", dir.display());
        }
        Ok(target
            .stamps
            .iter()
            .filter(|s| s.as_str() != stamp)
            .cloned()
            .collect())
    }

    /// Remove every stamp of the target together with its storage folder.
    pub async fn delete_all_stamps(&self, target: &BackupTarget) -> BackupResult<()> {
        let dir = self.target_dir(&target.name);
        self.trees
            .delete_tree(&dir)
            .await
            .map_err(|e| BackupError::storage(&dir, e))?;
        Ok(())
    }

    /// Replace the live source folder with the contents of `stamp`.
    ///
    /// Anything written to the source since the stamp was taken is lost.
    pub async fn replace_source_with_stamp(
        &self,
        target: &BackupTarget,
        stamp: &str,
    ) -> BackupResult<()> {
        ensure_stamp(target, stamp)?;
        let stamp_dir = self.stamp_dir(&target.name, stamp);
        if !is_dir(&stamp_dir).await {
            return Err(BackupError::storage(
                &stamp_dir,
                io::Error::new(io::ErrorKind::NotFound, "stamp folder is missing"),
            ));
        }

        self.trees
            .delete_tree(&target.source_path)
            .await
            .map_err(|e| BackupError::storage(&target.source_path, e))?;
        self.trees
            .copy_tree(&stamp_dir, &target.source_path)
            .await
            .map_err(|e| BackupError::storage(&target.source_path, e))?;

        log::info!(
            "Restored '{}' from stamp {}",
            target.source_path.display(),
            stamp
        );
        Ok(())
    }
}

fn ensure_stamp(target: &BackupTarget, stamp: &str) -> BackupResult<()> {
    if target.has_stamp(stamp) {
        Ok(())
    } else {
        Err(BackupError::StampNotFound {
            target: target.name.clone(),
            stamp: stamp.to_string(),
        })
    }
}
