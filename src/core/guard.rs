//! Guard predicates for controlling state transitions.
//!
//! Guards are pure boolean functions over the current context and the
//! incoming event. They decide whether a declared transition may fire
//! without producing side effects.

use super::event::Event;
use std::fmt;
use std::sync::Arc;

/// Executable guard predicate.
pub type GuardFn<C, E> = Arc<dyn Fn(&C, &Event<E>) -> bool + Send + Sync>;

/// Predicate that determines if a transition can execute.
///
/// Like [`Action`](super::Action), a guard is either a direct predicate or
/// a name resolved against the registry in the machine options. A
/// transition without a guard is always allowed.
///
/// # Example
///
/// ```rust
/// use statekit::core::{Event, Guard};
///
/// let under_limit = Guard::<u32, &str>::new(|attempts, _| *attempts < 3);
///
/// assert_eq!(under_limit.check(&2, &Event::new("RETRY")), Some(true));
/// assert_eq!(under_limit.check(&3, &Event::new("RETRY")), Some(false));
///
/// // Named guards need the registry; checking them directly yields `None`.
/// let named: Guard<u32, &str> = Guard::named("canRetry");
/// assert_eq!(named.check(&0, &Event::new("RETRY")), None);
/// ```
pub enum Guard<C, E> {
    Direct(GuardFn<C, E>),
    Named(String),
}

impl<C, E> Guard<C, E> {
    /// Create a guard from a pure predicate function.
    ///
    /// The predicate must be deterministic and thread-safe (Send + Sync).
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> bool + Send + Sync + 'static,
    {
        Guard::Direct(Arc::new(predicate))
    }

    /// Reference a guard registered under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Guard::Named(name.into())
    }

    /// Evaluate a direct guard. Named guards return `None`; they are
    /// evaluated through the [`Registry`](super::Registry).
    pub fn check(&self, context: &C, event: &Event<E>) -> Option<bool> {
        match self {
            Guard::Direct(predicate) => Some(predicate(context, event)),
            Guard::Named(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Guard::Named(name) => Some(name),
            Guard::Direct(_) => None,
        }
    }
}

impl<C, E> Clone for Guard<C, E> {
    fn clone(&self) -> Self {
        match self {
            Guard::Direct(f) => Guard::Direct(Arc::clone(f)),
            Guard::Named(name) => Guard::Named(name.clone()),
        }
    }
}

impl<C, E> fmt::Debug for Guard<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Direct(_) => f.write_str("Guard::Direct(<fn>)"),
            Guard::Named(name) => f.debug_tuple("Guard::Named").field(name).finish(),
        }
    }
}

impl<C, E> From<&str> for Guard<C, E> {
    fn from(name: &str) -> Self {
        Guard::named(name)
    }
}
