//! Deterministic scheduler driven by a virtual clock.

use super::{Scheduler, Task, TaskHandle};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Inner {
    now: Duration,
    next_id: u64,
    /// Keyed by due time, then by scheduling order.
    tasks: BTreeMap<(Duration, u64), Task>,
}

/// Scheduler whose clock only moves when told to.
///
/// Clones share the same clock and task queue. Tasks run on the thread
/// that calls [`advance`](ManualScheduler::advance), in due-time order;
/// tasks scheduled while advancing run in the same call if they fall due
/// within the advanced window.
///
/// # Example
///
/// ```rust
/// use statekit::timers::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
/// scheduler.after(Duration::from_millis(100), Box::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// scheduler.advance(Duration::from_millis(99));
/// assert_eq!(fired.load(Ordering::SeqCst), 0);
/// scheduler.advance(Duration::from_millis(1));
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct ManualScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now: Duration::ZERO,
                next_id: 0,
                tasks: BTreeMap::new(),
            })),
        }
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Move the clock forward by `by`, running every task that falls due.
    /// Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        loop {
            let task = {
                let mut inner = self.lock();
                let due = match inner.tasks.keys().next() {
                    Some(&(due, seq)) if due <= target => (due, seq),
                    _ => break,
                };
                inner.now = due.0;
                inner.tasks.remove(&due)
            };
            // The lock is released before the task runs so it can schedule
            // or cancel further work.
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
        self.lock().now = target;
        ran
    }

    /// Run tasks that are already due without moving the clock.
    pub fn run_pending(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: Task) -> TaskHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let due = inner.now + delay;
        inner.tasks.insert((due, id), task);
        TaskHandle::new(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        self.lock().tasks.retain(|&(_, id), _| id != handle.id());
    }
}
