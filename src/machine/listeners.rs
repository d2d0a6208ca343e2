//! Listener registry and subscription handles.

use crate::core::{HandlerError, Snapshot};
use std::fmt;
use std::sync::Arc;

/// Observer of published snapshots. An `Err` is reported as a diagnostic
/// and does not affect other listeners.
pub type Listener<S, E, C> = Arc<dyn Fn(&Snapshot<S, E, C>) -> Result<(), HandlerError> + Send + Sync>;

/// Listeners in subscription order.
pub(crate) struct ListenerRegistry<S, E, C> {
    next_id: u64,
    entries: Vec<(u64, Listener<S, E, C>)>,
}

impl<S, E, C> ListenerRegistry<S, E, C> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: Listener<S, E, C>) -> u64 {
        self.next_id += 1;
        self.entries.push((self.next_id, listener));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Copy of the current listeners, for notifying without the lock.
    pub(crate) fn entries(&self) -> Vec<(u64, Listener<S, E, C>)> {
        self.entries.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    detach: Option<Box<dyn FnOnce() -> bool + Send>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, detach: impl FnOnce() -> bool + Send + 'static) -> Self {
        Self {
            id,
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription that was never registered (machine destroyed).
    pub(crate) fn inert() -> Self {
        Self { id: 0, detach: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns whether it was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.detach.take().is_some_and(|detach| detach())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
