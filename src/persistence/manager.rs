//! Debounced saving and deferred loading against one adapter key.

use super::{PersistenceError, PersistenceOptions};
use crate::timers::{Scheduler, Task, TaskHandle};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Sink for failures that happen away from any caller.
pub(crate) type ErrorSink = Arc<dyn Fn(PersistenceError) + Send + Sync>;

/// Callback receiving loaded data.
pub(crate) type OnLoaded = Box<dyn FnOnce(Value) + Send + 'static>;

/// Unthrottled saves waiting for the writer task.
#[derive(Default)]
struct WriteQueue {
    data: VecDeque<Value>,
    draining: bool,
}

/// Owns all adapter traffic for one key.
///
/// The adapter is only ever called from scheduled tasks, never from the
/// caller of `save` or `load_later`. Unthrottled saves are queued and
/// written in order by a single writer task; throttled saves keep only the
/// latest data until the quiet window ends.
pub(crate) struct Persister {
    options: PersistenceOptions,
    scheduler: Arc<dyn Scheduler>,
    pending: Mutex<Option<(TaskHandle, Value)>>,
    queue: Mutex<WriteQueue>,
    on_error: ErrorSink,
    active: AtomicBool,
}

impl Persister {
    pub(crate) fn new(
        options: PersistenceOptions,
        scheduler: Arc<dyn Scheduler>,
        on_error: ErrorSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            scheduler,
            pending: Mutex::new(None),
            queue: Mutex::new(WriteQueue::default()),
            on_error,
            active: AtomicBool::new(true),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<(TaskHandle, Value)>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_queue(&self) -> MutexGuard<'_, WriteQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn key(&self) -> &str {
        &self.options.key
    }

    /// Save `data` on the next scheduler turn, or after the throttle
    /// window. Never calls the adapter directly.
    ///
    /// With a throttle, each call replaces the pending data and restarts
    /// the window, so a burst of changes produces one save with the last
    /// data.
    pub(crate) fn save(self: &Arc<Self>, data: Value) {
        if !self.is_active() {
            return;
        }
        match self.options.throttle {
            None => self.enqueue(data),
            Some(interval) => self.debounce(interval, data),
        }
    }

    fn enqueue(self: &Arc<Self>, data: Value) {
        let start_writer = {
            let mut queue = self.lock_queue();
            queue.data.push_back(data);
            !std::mem::replace(&mut queue.draining, true)
        };
        if !start_writer {
            return;
        }
        let weak = Arc::downgrade(self);
        self.scheduler.after(
            Duration::ZERO,
            Box::new(move || {
                if let Some(persister) = weak.upgrade() {
                    persister.drain();
                }
            }),
        );
    }

    /// Write queued saves in order until the queue is empty.
    fn drain(&self) {
        loop {
            let next = {
                let mut queue = self.lock_queue();
                let next = queue.data.pop_front();
                if next.is_none() {
                    queue.draining = false;
                }
                next
            };
            let Some(data) = next else {
                return;
            };
            if self.is_active() {
                self.write(data);
            }
        }
    }

    fn debounce(self: &Arc<Self>, interval: Duration, data: Value) {
        let weak = Arc::downgrade(self);
        let task: Task = Box::new(move || {
            let Some(persister) = weak.upgrade() else {
                return;
            };
            let pending = persister.lock().take();
            if let Some((_, data)) = pending {
                if persister.is_active() {
                    persister.write(data);
                }
            }
        });

        let previous = {
            let mut pending = self.lock();
            let handle = self.scheduler.after(interval, task);
            pending.replace((handle, data))
        };
        if let Some((handle, _)) = previous {
            self.scheduler.cancel(handle);
        }
    }

    fn write(&self, data: Value) {
        match self.options.adapter.save(&self.options.key, data) {
            Ok(()) => tracing::trace!(key = %self.options.key, "snapshot saved"),
            Err(error) => (self.on_error)(error),
        }
    }

    /// Load on a zero-delay task and hand any stored data to `on_loaded`.
    pub(crate) fn load_later(self: &Arc<Self>, on_loaded: OnLoaded) {
        let weak = Arc::downgrade(self);
        let task: Task = Box::new(move || {
            let Some(persister) = weak.upgrade() else {
                return;
            };
            if !persister.is_active() {
                return;
            }
            match persister.options.adapter.load(&persister.options.key) {
                Ok(Some(data)) => on_loaded(data),
                Ok(None) => tracing::debug!(key = %persister.options.key, "nothing persisted"),
                Err(error) => (persister.on_error)(error),
            }
        });
        self.scheduler.after(Duration::ZERO, task);
    }

    /// Delete the stored data and drop any pending save.
    pub(crate) fn clear(&self) -> Result<(), PersistenceError> {
        self.cancel_pending();
        self.options.adapter.remove(&self.options.key)
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        self.lock().is_some() || !self.lock_queue().data.is_empty()
    }

    fn cancel_pending(&self) {
        self.lock_queue().data.clear();
        let pending = self.lock().take();
        if let Some((handle, _)) = pending {
            self.scheduler.cancel(handle);
        }
    }

    pub(crate) fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        self.cancel_pending();
    }
}
