//! Backup target records, stamp identifiers and global settings.

use crate::config::{
    DEFAULT_RETENTION_LIMIT, DEFAULT_TIMER_INTERVAL_MINUTES, MAX_RETENTION_LIMIT,
    MAX_TIMER_INTERVAL_MINUTES,
};
use crate::error::{BackupError, BackupResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stamp folder names: second resolution, no characters forbidden on Windows.
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// One monitored folder and its retention state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupTarget {
    pub name: String,
    pub source_path: PathBuf,
    #[serde(default)]
    pub stamps: Vec<String>,
    pub retention_limit: usize,
    #[serde(default)]
    pub retention_custom_enabled: bool,
    #[serde(default)]
    pub timer_enabled: bool,
    pub timer_interval_minutes: u32,
}

impl BackupTarget {
    pub fn new(name: String, source_path: PathBuf) -> Self {
        Self {
            name,
            source_path,
            stamps: Vec::new(),
            retention_limit: DEFAULT_RETENTION_LIMIT,
            retention_custom_enabled: false,
            timer_enabled: false,
            timer_interval_minutes: DEFAULT_TIMER_INTERVAL_MINUTES,
        }
    }

    /// The number of stamps a rotation may leave behind.
    pub fn effective_retention_limit(&self) -> usize {
        if self.retention_custom_enabled {
            self.retention_limit
        } else {
            DEFAULT_RETENTION_LIMIT
        }
    }

    pub fn has_stamp(&self, stamp: &str) -> bool {
        self.stamps.iter().any(|s| s == stamp)
    }

    pub fn options(&self) -> TargetOptions {
        TargetOptions {
            retention_limit: self.retention_limit,
            retention_custom_enabled: self.retention_custom_enabled,
            timer_enabled: self.timer_enabled,
            timer_interval_minutes: self.timer_interval_minutes,
        }
    }

    pub(crate) fn apply(&mut self, options: &TargetOptions) {
        self.retention_limit = options.retention_limit;
        self.retention_custom_enabled = options.retention_custom_enabled;
        self.timer_enabled = options.timer_enabled;
        self.timer_interval_minutes = options.timer_interval_minutes;
    }
}

/// User-editable retention and timer settings of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
    pub retention_limit: usize,
    pub retention_custom_enabled: bool,
    pub timer_enabled: bool,
    pub timer_interval_minutes: u32,
}

impl TargetOptions {
    pub fn validate(&self) -> BackupResult<()> {
        if !(1..=MAX_RETENTION_LIMIT).contains(&self.retention_limit) {
            return Err(BackupError::InvalidSetting(format!(
                "retention limit must be between 1 and {}, got {}",
                MAX_RETENTION_LIMIT, self.retention_limit
            )));
        }
        if !(1..=MAX_TIMER_INTERVAL_MINUTES).contains(&self.timer_interval_minutes) {
            return Err(BackupError::InvalidSetting(format!(
                "timer interval must be between 1 and {} minutes, got {}",
                MAX_TIMER_INTERVAL_MINUTES, self.timer_interval_minutes
            )));
        }
        Ok(())
    }
}

/// Process-wide switches persisted next to the targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub minimize_on_close: bool,
}

pub fn stamp_id(at: NaiveDateTime) -> String {
    at.format(STAMP_FORMAT).to_string()
}

pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}

/// Index of the chronologically earliest stamp.
///
/// Identifiers that fail to parse count as older than any parseable one.
/// Ties resolve to the first in list order.
pub fn oldest_stamp_index(stamps: &[String]) -> Option<usize> {
    stamps
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| parse_stamp(s))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_stamp_id_parses_back() {
        let id = stamp_id(at(7, 5, 3));
        assert_eq!(id, "2024-03-09_07-05-03");
        assert_eq!(parse_stamp(&id), Some(at(7, 5, 3)));
    }

    #[test]
    fn test_oldest_stamp_uses_time_not_list_order() {
        let stamps = vec![
            stamp_id(at(12, 0, 0)),
            stamp_id(at(9, 30, 0)),
            stamp_id(at(10, 0, 0)),
        ];
        assert_eq!(oldest_stamp_index(&stamps), Some(1));
    }

    #[test]
    fn test_oldest_stamp_tie_picks_first() {
        let stamps = vec![stamp_id(at(9, 0, 0)), stamp_id(at(9, 0, 0))];
        assert_eq!(oldest_stamp_index(&stamps), Some(0));
    }

    #[test]
    fn test_unparseable_stamp_is_evicted_first() {
        let stamps = vec![stamp_id(at(9, 0, 0)), "09.03.2024 08-00-00".to_string()];
        assert_eq!(oldest_stamp_index(&stamps), Some(1));
        assert_eq!(oldest_stamp_index(&[]), None);
    }

    #[test]
    fn test_effective_retention_limit() {
        let mut target = BackupTarget::new("docs".into(), PathBuf::from("/docs"));
        target.retention_limit = 2;
        assert_eq!(target.effective_retention_limit(), DEFAULT_RETENTION_LIMIT);
        target.retention_custom_enabled = true;
        assert_eq!(target.effective_retention_limit(), 2);
    }

    #[test]
    fn test_options_validation() {
        let mut options = BackupTarget::new("a".into(), PathBuf::from("/a")).options();
        assert!(options.validate().is_ok());

        options.timer_interval_minutes = 0;
        assert!(matches!(options.validate(), Err(BackupError::InvalidSetting(_))));

        options.timer_interval_minutes = MAX_TIMER_INTERVAL_MINUTES + 1;
        assert!(options.validate().is_err());

        options.timer_interval_minutes = MAX_TIMER_INTERVAL_MINUTES;
        options.retention_limit = 0;
        assert!(options.validate().is_err());
    }
}
