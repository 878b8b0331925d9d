//! Tray-style control surface: bulk timer suspend/resume and quit.

use crate::StampKeeper;

/// Actions offered by the tray menu, keyed by menu item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    StartTimers,
    StopTimers,
    Status,
    Quit,
}

impl TrayAction {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim() {
            "start_timers" | "start" => Some(TrayAction::StartTimers),
            "stop_timers" | "stop" => Some(TrayAction::StopTimers),
            "status" => Some(TrayAction::Status),
            "quit" | "exit" => Some(TrayAction::Quit),
            _ => None,
        }
    }
}

/// Outcome of a tray action, for the caller to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayReply {
    Started(Vec<String>),
    Stopped(usize),
    Running(Vec<String>),
    Quit,
}

/// Apply a tray action. `Quit` stops every timer but leaves the final save to shutdown.
pub async fn handle_action(app: &StampKeeper, action: TrayAction) -> TrayReply {
    match action {
        TrayAction::StartTimers => TrayReply::Started(app.start_all_timers().await),
        TrayAction::StopTimers => TrayReply::Stopped(app.stop_all_timers().await),
        TrayAction::Status => TrayReply::Running(app.running_timers().await),
        TrayAction::Quit => {
            app.stop_all_timers().await;
            TrayReply::Quit
        }
    }
}
