//! Scheduler backed by a tokio runtime.

use super::{Scheduler, SchedulerError, Task, TaskHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

struct Inner {
    runtime: Handle,
    next_id: AtomicU64,
    running: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl Inner {
    fn running(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs each task on a tokio runtime after sleeping for its delay.
///
/// Cancelling aborts the sleeping task.
#[derive(Clone)]
pub struct TokioScheduler {
    inner: Arc<Inner>,
}

impl TokioScheduler {
    /// Use the runtime of the calling context.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|e| SchedulerError::NoRuntime(e.to_string()))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                next_id: AtomicU64::new(0),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of tasks that have neither run nor been cancelled.
    pub fn pending(&self) -> usize {
        self.inner.running().len()
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: Task) -> TaskHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        // Held across spawn so the task cannot deregister before it is
        // registered.
        let mut running = self.inner.running();
        let join = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
            if let Some(inner) = weak.upgrade() {
                inner.running().remove(&id);
            }
        });
        running.insert(id, join);
        TaskHandle::new(id)
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some(join) = self.inner.running().remove(&handle.id()) {
            join.abort();
        }
    }
}
