mod backup;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
mod registry;
mod scheduler;
pub mod target;
pub mod tray;
pub mod trees;

pub use config::AppConfig;
pub use engine::BackupEngine;
pub use error::{BackupError, BackupResult};
pub use registry::{RegistryData, RegistryStore};
pub use scheduler::{TimerScheduler, TimerStatus};
pub use target::{BackupTarget, GlobalSettings, TargetOptions};

use clock::SystemClock;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tray::{TrayAction, TrayReply};
use trees::LocalTreeStore;

/// Everything a front end needs: targets, stamps, timers and settings.
pub struct StampKeeper {
    engine: Arc<BackupEngine>,
    scheduler: TimerScheduler,
}

impl StampKeeper {
    /// Load the registry described by `config`, using the local filesystem and wall clock.
    pub fn open(config: &AppConfig) -> BackupResult<Self> {
        let engine = BackupEngine::open(
            config,
            Arc::new(LocalTreeStore::new()),
            Arc::new(SystemClock),
        )?;
        let engine = Arc::new(engine);
        let scheduler = TimerScheduler::new(engine.clone());
        Ok(Self::new(engine, scheduler))
    }

    pub fn new(engine: Arc<BackupEngine>, scheduler: TimerScheduler) -> Self {
        Self { engine, scheduler }
    }

    pub async fn create_target(&self, source: &Path) -> BackupResult<String> {
        self.engine.create_target(source).await
    }

    /// Stop the target's timer, then delete the target with all of its stamps.
    pub async fn delete_target(&self, name: &str) -> BackupResult<()> {
        self.engine.get_target(name).await?;
        self.scheduler
            .stop_then(name, self.engine.delete_target(name))
            .await?;
        self.scheduler.forget(name).await;
        Ok(())
    }

    pub async fn configure_target(&self, name: &str, options: TargetOptions) -> BackupResult<()> {
        self.engine.configure_target(name, options).await
    }

    pub async fn list_targets(&self) -> Vec<BackupTarget> {
        self.engine.list_targets().await
    }

    pub async fn get_target(&self, name: &str) -> BackupResult<BackupTarget> {
        self.engine.get_target(name).await
    }

    pub async fn list_stamps(&self, name: &str) -> BackupResult<Vec<String>> {
        self.engine.list_stamps(name).await
    }

    pub async fn create_stamp(&self, name: &str) -> BackupResult<String> {
        self.engine.create_stamp(name).await
    }

    pub async fn delete_stamp(&self, name: &str, stamp: &str) -> BackupResult<()> {
        self.engine.delete_stamp(name, stamp).await
    }

    /// Overwrite the target's source folder with `stamp`. Not undoable.
    pub async fn restore_stamp(&self, name: &str, stamp: &str) -> BackupResult<()> {
        self.engine.restore_stamp(name, stamp).await
    }

    pub async fn start_timer(&self, name: &str) -> BackupResult<()> {
        self.scheduler.start(name).await
    }

    pub async fn stop_timer(&self, name: &str) -> bool {
        self.scheduler.stop(name).await
    }

    pub async fn start_all_timers(&self) -> Vec<String> {
        self.scheduler.start_all().await
    }

    pub async fn stop_all_timers(&self) -> usize {
        self.scheduler.stop_all().await
    }

    pub async fn running_timers(&self) -> Vec<String> {
        self.scheduler.running().await
    }

    pub async fn timer_status(&self, name: &str) -> TimerStatus {
        self.scheduler.status(name).await
    }

    pub async fn settings(&self) -> GlobalSettings {
        self.engine.settings().await
    }

    pub async fn set_settings(&self, settings: GlobalSettings) -> BackupResult<()> {
        self.engine.set_settings(settings).await
    }

    pub async fn save(&self) -> BackupResult<()> {
        self.engine.save().await
    }

    /// Stop all timers, then write the registry one last time.
    pub async fn shutdown(&self) -> BackupResult<()> {
        let stopped = self.scheduler.stop_all().await;
        log::info!("Shutting down, stopped {} timer(s)", stopped);
        self.engine.save().await
    }
}

/// Run headless: start every enabled timer and take tray commands from stdin
/// until `quit` or Ctrl-C.
pub async fn run(config: AppConfig) -> BackupResult<()> {
    let app = StampKeeper::open(&config)?;
    let started = app.start_all_timers().await;
    log::info!(
        "Watching {} target(s), {} timer(s) running",
        app.list_targets().await.len(),
        started.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match TrayAction::from_id(&line) {
                    Some(action) => {
                        let reply = tray::handle_action(&app, action).await;
                        log::info!("{:?}", reply);
                        if reply == TrayReply::Quit {
                            break;
                        }
                    }
                    None => log::warn!("Unknown command '{}'", line.trim()),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Stdin closed: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    app.shutdown().await
}
