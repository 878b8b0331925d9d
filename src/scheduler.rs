//! Per-target timers that rotate stamps unattended.

use crate::engine::BackupEngine;
use crate::error::{BackupError, BackupResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Real length of one interval unit.
pub const MINUTE: Duration = Duration::from_secs(60);

/// Consecutive failed rotations after which a timer reports at error level.
const FAILURE_ALERT_THRESHOLD: u32 = 3;

struct ActiveTimer {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Operator-facing health of a target's timer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerStatus {
    pub running: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_stamp: Option<String>,
}

type ActiveSet = Arc<Mutex<HashMap<String, ActiveTimer>>>;
type HealthMap = Arc<Mutex<HashMap<String, TimerStatus>>>;

pub struct TimerScheduler {
    engine: Arc<BackupEngine>,
    unit: Duration,
    active: ActiveSet,
    health: HealthMap,
    /// Serializes start/stop so a stopped cycle is gone before a new one starts.
    control: Mutex<()>,
    next_id: AtomicU64,
}

impl TimerScheduler {
    pub fn new(engine: Arc<BackupEngine>) -> Self {
        Self::with_unit(engine, MINUTE)
    }

    /// Scheduler whose interval setting counts `unit`s instead of minutes.
    pub fn with_unit(engine: Arc<BackupEngine>, unit: Duration) -> Self {
        Self {
            engine,
            unit,
            active: Arc::new(Mutex::new(HashMap::new())),
            health: Arc::new(Mutex::new(HashMap::new())),
            control: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start the background cycle of one target.
    pub async fn start(&self, name: &str) -> BackupResult<()> {
        let _control = self.control.lock().await;
        let mut active = self.active.lock().await;
        if let Some(timer) = active.get(name) {
            if !timer.handle.is_finished() {
                return Err(BackupError::TimerAlreadyRunning(name.to_string()));
            }
            active.remove(name);
        }
        let options = self
            .engine
            .timer_options(name)
            .await
            .ok_or_else(|| BackupError::TargetNotFound(name.to_string()))?;
        if !options.timer_enabled {
            return Err(BackupError::TimerDisabled(name.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let cycle = TimerCycle {
            engine: self.engine.clone(),
            active: self.active.clone(),
            health: self.health.clone(),
            name: name.to_string(),
            id,
            cancel: cancel.clone(),
            unit: self.unit,
        };
        let handle = tokio::spawn(cycle.run());
        active.insert(name.to_string(), ActiveTimer { id, cancel, handle });

        log::info!(
            "Timer started for '{}' (every {} minute(s))",
            name,
            options.timer_interval_minutes
        );
        Ok(())
    }

    /// Stop one target's cycle. Returns whether a cycle was running.
    ///
    /// A sleeping cycle is woken and exits at once; a rotation in flight is
    /// allowed to finish before this returns.
    pub async fn stop(&self, name: &str) -> bool {
        let _control = self.control.lock().await;
        self.stop_locked(name).await
    }

    /// Stop the target's cycle, then run `work` before any timer can be
    /// started again.
    pub async fn stop_then<F, T>(&self, name: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _control = self.control.lock().await;
        self.stop_locked(name).await;
        work.await
    }

    async fn stop_locked(&self, name: &str) -> bool {
        let Some(timer) = self.active.lock().await.remove(name) else {
            return false;
        };
        timer.cancel.cancel();
        // A cycle that already exited on its own still counts as stopped.
        if let Err(e) = timer.handle.await {
            if e.is_panic() {
                log::error!("Timer cycle for '{}' panicked: {}", name, e);
            }
        }
        log::info!("Timer stopped for '{}'", name);
        true
    }

    /// Start every timer-enabled target that is not running. Returns the names started.
    pub async fn start_all(&self) -> Vec<String> {
        let mut started = Vec::new();
        for target in self.engine.list_targets().await {
            if !target.timer_enabled {
                continue;
            }
            match self.start(&target.name).await {
                Ok(()) => started.push(target.name),
                Err(BackupError::TimerAlreadyRunning(_)) | Err(BackupError::TimerDisabled(_)) => {}
                Err(e) => log::warn!("Could not start timer for '{}': {}", target.name, e),
            }
        }
        started
    }

    /// Stop every running cycle. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let names: Vec<String> = self.active.lock().await.keys().cloned().collect();
        let mut stopped = 0;
        for name in names {
            if self.stop(&name).await {
                stopped += 1;
            }
        }
        stopped
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.active.lock().await.contains_key(name)
    }

    pub async fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn status(&self, name: &str) -> TimerStatus {
        let mut status = self
            .health
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default();
        status.running = self.is_running(name).await;
        status
    }

    /// Forget health data of a target that no longer exists.
    pub async fn forget(&self, name: &str) {
        self.health.lock().await.remove(name);
    }
}

struct TimerCycle {
    engine: Arc<BackupEngine>,
    active: ActiveSet,
    health: HealthMap,
    name: String,
    id: u64,
    cancel: CancellationToken,
    unit: Duration,
}

impl TimerCycle {
    async fn run(self) {
        loop {
            let Some(options) = self.engine.timer_options(&self.name).await else {
                self.release().await;
                return;
            };
            let interval = self.unit * options.timer_interval_minutes;
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            if !self.still_wanted().await || self.cancel.is_cancelled() {
                return;
            }
            self.rotate().await;
        }
    }

    /// Re-read the timer flag. A cycle that should end removes its own entry
    /// while holding the active set, so a concurrent `start` sees either a
    /// live cycle or none.
    async fn still_wanted(&self) -> bool {
        let mut active = self.active.lock().await;
        if active.get(&self.name).map(|t| t.id) != Some(self.id) {
            return false;
        }
        match self.engine.timer_options(&self.name).await {
            Some(options) if options.timer_enabled => true,
            Some(_) => {
                log::info!("Timer disabled for '{}', cycle exits", self.name);
                active.remove(&self.name);
                false
            }
            None => {
                log::info!("Target '{}' is gone, timer exits", self.name);
                active.remove(&self.name);
                false
            }
        }
    }

    async fn release(&self) {
        let mut active = self.active.lock().await;
        if active.get(&self.name).map(|t| t.id) == Some(self.id) {
            active.remove(&self.name);
        }
    }

    async fn rotate(&self) {
        let result = self.engine.create_stamp(&self.name).await;
        let mut health = self.health.lock().await;
        let status = health.entry(self.name.clone()).or_default();
        match result {
            Ok(stamp) => {
                status.consecutive_failures = 0;
                status.last_error = None;
                status.last_stamp = Some(stamp);
            }
            Err(e @ BackupError::DuplicateStamp { .. }) => {
                log::warn!("Timer rotation skipped: {}", e);
            }
            Err(e) => {
                status.consecutive_failures += 1;
                status.last_error = Some(e.to_string());
                if status.consecutive_failures >= FAILURE_ALERT_THRESHOLD {
                    log::error!(
                        "Timer rotation for '{}' failed {} times in a row: {}",
                        self.name,
                        status.consecutive_failures,
                        e
                    );
                } else {
                    log::warn!("Timer rotation for '{}' failed: {}", self.name, e);
                }
            }
        }
    }
}
