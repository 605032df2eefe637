//! likebot-cron: daily random scheduling.
//!
//! A [`RandomScheduler`] runs a task exactly once per cycle at a random
//! instant inside that cycle. Cycles are defined by a cron expression
//! evaluated in a named timezone (default: every day at 00:00).

pub mod scheduler;

use chrono::{DateTime, Utc};

pub use scheduler::{
    parse_cycle, random_offset, RandomScheduler, RefreshHook, ScheduledTask, SchedulerOptions,
};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid cycle expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),
}

/// Wall-clock source used to compute cycle boundaries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
