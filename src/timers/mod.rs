//! Scheduling of timers, delayed events and debounced work.
//!
//! The machine never touches wall-clock timers directly. Everything that
//! runs later goes through a [`Scheduler`]:
//!
//! - [`ManualScheduler`] advances a virtual clock on demand, for tests
//! - [`TokioScheduler`] runs tasks on a tokio runtime
//!
//! Cancellation is explicit and handle-based.

mod manager;
mod manual;
mod runtime;

pub(crate) use manager::{TimerCallback, TimerTable};
pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use std::time::Duration;
use thiserror::Error;

/// Work scheduled to run once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Host scheduling facility.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn after(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Cancel a task that has not run yet. Cancelling a task that already
    /// ran, or was already cancelled, does nothing.
    fn cancel(&self, handle: TaskHandle);
}

/// Errors creating a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No tokio runtime is available: {0}")]
    NoRuntime(String),
}

/// Shortest interval of a repeating timer. Shorter intervals are raised
/// to this so a timer can never starve its scheduler.
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration of a named timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerConfig {
    pub id: String,
    pub delay: Duration,
    /// Fire every `delay` until cleared, instead of once.
    pub repeat: bool,
}

impl TimerConfig {
    /// One-shot timer.
    pub fn once(id: impl Into<String>, delay: Duration) -> Self {
        Self {
            id: id.into(),
            delay,
            repeat: false,
        }
    }

    /// Repeating timer. `delay` is raised to [`MIN_REPEAT_INTERVAL`].
    pub fn every(id: impl Into<String>, delay: Duration) -> Self {
        Self {
            id: id.into(),
            delay: delay.max(MIN_REPEAT_INTERVAL),
            repeat: true,
        }
    }

    /// Delay actually used when scheduling, with the repeat floor applied
    /// to configs built by hand.
    pub(crate) fn interval(&self) -> Duration {
        if self.repeat {
            self.delay.max(MIN_REPEAT_INTERVAL)
        } else {
            self.delay
        }
    }
}
