//! Wall clock used to name stamps.

use chrono::{Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    /// Current local time, as it should appear in a stamp name.
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
