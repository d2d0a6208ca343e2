//! Bookkeeping for named timers and delayed events.

use super::{Scheduler, Task, TaskHandle, TimerConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use uuid::Uuid;

/// Callback of a named timer.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerEntry {
    generation: u64,
    handle: Option<TaskHandle>,
}

#[derive(Default)]
struct Table {
    timers: HashMap<String, TimerEntry>,
    delayed: HashMap<String, TaskHandle>,
    next_generation: u64,
}

/// Owns every live timer and delayed event of one machine.
///
/// Each live entry maps a unique id to the scheduler handle that will fire
/// it. Firing or cancelling an entry removes it. Restarting a timer bumps
/// its generation so a tick already in flight for the old one is ignored.
pub(crate) struct TimerTable {
    scheduler: Arc<dyn Scheduler>,
    table: Mutex<Table>,
    active: AtomicBool,
}

impl TimerTable {
    pub(crate) fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            table: Mutex::new(Table::default()),
            active: AtomicBool::new(true),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start (or restart) the timer `config.id`.
    pub(crate) fn start(self: &Arc<Self>, config: TimerConfig, callback: TimerCallback) {
        if !self.is_active() {
            return;
        }
        let previous = {
            let mut table = self.lock();
            table.next_generation += 1;
            let generation = table.next_generation;
            let previous = table.timers.insert(
                config.id.clone(),
                TimerEntry {
                    generation,
                    handle: None,
                },
            );
            let handle = self.scheduler.after(
                config.interval(),
                tick(Arc::downgrade(self), config.clone(), generation, callback),
            );
            if let Some(entry) = table.timers.get_mut(&config.id) {
                entry.handle = Some(handle);
            }
            previous.and_then(|entry| entry.handle)
        };
        if let Some(handle) = previous {
            self.scheduler.cancel(handle);
        }
        tracing::debug!(timer = %config.id, delay = ?config.interval(), repeat = config.repeat, "timer started");
    }

    /// Cancel the timer `id`. Returns whether it was live.
    pub(crate) fn clear(&self, id: &str) -> bool {
        let entry = self.lock().timers.remove(id);
        match entry {
            Some(entry) => {
                if let Some(handle) = entry.handle {
                    self.scheduler.cancel(handle);
                }
                tracing::debug!(timer = %id, "timer cleared");
                true
            }
            None => false,
        }
    }

    /// Schedule `deliver` to run after `delay`; returns the fresh id of the
    /// delayed event.
    pub(crate) fn schedule_delayed(
        self: &Arc<Self>,
        delay: Duration,
        deliver: Task,
    ) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let id = format!("delayed_{}", Uuid::new_v4());
        let weak = Arc::downgrade(self);
        let fired_id = id.clone();
        let task: Task = Box::new(move || {
            let Some(table) = weak.upgrade() else {
                return;
            };
            let pending = table.lock().delayed.remove(&fired_id).is_some();
            if pending && table.is_active() {
                deliver();
            }
        });

        let mut table = self.lock();
        let handle = self.scheduler.after(delay, task);
        table.delayed.insert(id.clone(), handle);
        Some(id)
    }

    /// Cancel a pending delayed event. Returns whether it was pending.
    pub(crate) fn cancel_delayed(&self, id: &str) -> bool {
        let handle = self.lock().delayed.remove(id);
        match handle {
            Some(handle) => {
                self.scheduler.cancel(handle);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn active_timers(&self) -> usize {
        self.lock().timers.len()
    }

    #[cfg(test)]
    pub(crate) fn pending_delayed(&self) -> usize {
        self.lock().delayed.len()
    }

    /// Cancel everything and refuse further work.
    pub(crate) fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        let handles: Vec<TaskHandle> = {
            let mut table = self.lock();
            let timers = table.timers.drain().filter_map(|(_, entry)| entry.handle);
            let mut handles: Vec<TaskHandle> = timers.collect();
            handles.extend(table.delayed.drain().map(|(_, handle)| handle));
            handles
        };
        for handle in handles {
            self.scheduler.cancel(handle);
        }
    }
}

/// Build the task that fires one tick of a timer.
fn tick(
    weak: Weak<TimerTable>,
    config: TimerConfig,
    generation: u64,
    callback: TimerCallback,
) -> Task {
    Box::new(move || {
        let Some(table) = weak.upgrade() else {
            return;
        };
        if !table.is_active() {
            return;
        }
        {
            let mut guard = table.lock();
            let current = guard
                .timers
                .get(&config.id)
                .is_some_and(|entry| entry.generation == generation);
            if !current {
                return;
            }
            if !config.repeat {
                guard.timers.remove(&config.id);
            }
        }

        callback();

        if config.repeat && table.is_active() {
            let mut guard = table.lock();
            // The callback may have cleared or restarted this timer.
            let still_current = guard
                .timers
                .get(&config.id)
                .is_some_and(|entry| entry.generation == generation);
            if still_current {
                let next = table.scheduler.after(
                    config.interval(),
                    tick(Arc::downgrade(&table), config.clone(), generation, callback),
                );
                if let Some(entry) = guard.timers.get_mut(&config.id) {
                    entry.handle = Some(next);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::ManualScheduler;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (ManualScheduler, Arc<TimerTable>) {
        let scheduler = ManualScheduler::new();
        let table = TimerTable::new(Arc::new(scheduler.clone()));
        (scheduler, table)
    }

    fn counting() -> (Arc<AtomicUsize>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: TimerCallback = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn one_shot_timer_fires_once_and_is_removed() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        table.start(TimerConfig::once("t", Duration::from_millis(10)), callback);
        assert_eq!(table.active_timers(), 1);

        scheduler.advance(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(table.active_timers(), 0);
    }

    #[test]
    fn repeating_timer_fires_every_interval() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        table.start(TimerConfig::every("tick", Duration::from_millis(10)), callback);

        scheduler.advance(Duration::from_millis(35));
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(table.clear("tick"));
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn zero_interval_repeating_timer_does_not_starve_scheduler() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        let config = TimerConfig {
            id: "busy".into(),
            delay: Duration::ZERO,
            repeat: true,
        };
        table.start(config, callback);

        let ran = scheduler.advance(Duration::from_millis(10));
        assert_eq!(ran, 10);
        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert!(table.clear("busy"));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn restarting_timer_cancels_previous() {
        let (scheduler, table) = setup();
        let (first, first_cb) = counting();
        let (second, second_cb) = counting();
        table.start(TimerConfig::once("t", Duration::from_millis(10)), first_cb);
        table.start(TimerConfig::once("t", Duration::from_millis(20)), second_cb);

        scheduler.advance(Duration::from_millis(30));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clearing_unknown_timer_returns_false() {
        let (_, table) = setup();
        assert!(!table.clear("missing"));
    }

    #[test]
    fn delayed_event_fires_and_removes_bookkeeping() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        let id = table
            .schedule_delayed(Duration::from_millis(100), Box::new(move || callback()))
            .unwrap();
        assert!(id.starts_with("delayed_"));
        assert_eq!(table.pending_delayed(), 1);

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(table.pending_delayed(), 0);
        assert!(!table.cancel_delayed(&id));
    }

    #[test]
    fn delayed_ids_are_unique() {
        let (_, table) = setup();
        let a = table.schedule_delayed(Duration::from_millis(1), Box::new(|| {}));
        let b = table.schedule_delayed(Duration::from_millis(1), Box::new(|| {}));
        assert_ne!(a, b);
    }

    #[test]
    fn cancelled_delayed_event_never_fires() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        let id = table
            .schedule_delayed(Duration::from_millis(100), Box::new(move || callback()))
            .unwrap();

        assert!(table.cancel_delayed(&id));
        scheduler.advance(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_cancels_everything() {
        let (scheduler, table) = setup();
        let (count, callback) = counting();
        table.start(
            TimerConfig::every("tick", Duration::from_millis(10)),
            Arc::clone(&callback),
        );
        table.schedule_delayed(Duration::from_millis(10), Box::new(move || callback()));

        table.shutdown();
        scheduler.advance(Duration::from_millis(100));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(table.active_timers(), 0);
        assert_eq!(table.pending_delayed(), 0);
        assert!(table
            .schedule_delayed(Duration::from_millis(1), Box::new(|| {}))
            .is_none());
    }
}
