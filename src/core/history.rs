//! Bounded undo/redo log of snapshots.
//!
//! The buffer always holds at least one entry (the snapshot the machine
//! started from) and a cursor pointing at the entry the machine currently
//! reflects. Entries after the cursor form the redo tail.

use super::snapshot::Snapshot;
use std::collections::VecDeque;

/// Default number of snapshots kept when history is enabled.
pub const DEFAULT_HISTORY_SIZE: usize = 50;

/// Ordered, size-bounded sequence of snapshots with a cursor.
///
/// # Example
///
/// ```rust
/// use statekit::core::{HistoryBuffer, Snapshot, Trigger, Meta};
///
/// fn snap(value: &'static str) -> Snapshot<&'static str, &'static str, ()> {
///     Snapshot { value, context: (), changed: true, event: Trigger::Init, meta: Meta::new() }
/// }
///
/// let mut history = HistoryBuffer::new(snap("a"), 10);
/// history.record(snap("b"));
/// history.record(snap("c"));
///
/// assert_eq!(history.undo().map(|s| s.value), Some("b"));
/// assert!(history.can_redo());
///
/// // Recording after an undo discards the redo tail.
/// history.record(snap("d"));
/// assert!(!history.can_redo());
/// assert_eq!(history.len(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct HistoryBuffer<S, E, C> {
    entries: VecDeque<Snapshot<S, E, C>>,
    current: usize,
    max_size: usize,
}

impl<S, E, C> HistoryBuffer<S, E, C> {
    /// Create a buffer seeded with `initial`. A `max_size` of zero is
    /// treated as one.
    pub fn new(initial: Snapshot<S, E, C>, max_size: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(initial);
        Self {
            entries,
            current: 0,
            max_size: max_size.max(1),
        }
    }

    /// Append a snapshot at the cursor.
    ///
    /// Everything after the cursor is discarded first. When the buffer
    /// grows beyond `max_size` the oldest entry is evicted and the cursor
    /// still points at the same logical entry.
    pub fn record(&mut self, snapshot: Snapshot<S, E, C>) {
        self.entries.truncate(self.current + 1);
        self.entries.push_back(snapshot);
        self.current = self.entries.len() - 1;

        while self.entries.len() > self.max_size {
            self.entries.pop_front();
            self.current -= 1;
        }
    }

    /// Drop every entry and start over from `snapshot`.
    pub fn reset(&mut self, snapshot: Snapshot<S, E, C>) {
        self.entries.clear();
        self.entries.push_back(snapshot);
        self.current = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.entries.len()
    }

    /// Move the cursor back one entry and return it.
    pub fn undo(&mut self) -> Option<&Snapshot<S, E, C>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        self.entries.get(self.current)
    }

    /// Move the cursor forward one entry and return it.
    pub fn redo(&mut self) -> Option<&Snapshot<S, E, C>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        self.entries.get(self.current)
    }

    /// Entry at the cursor.
    pub fn current(&self) -> Option<&Snapshot<S, E, C>> {
        self.entries.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &Snapshot<S, E, C>> {
        self.entries.iter()
    }
}
