//! Actions executed during a transition.

use super::event::Event;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by user code (an action or a listener).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Outcome of an action: `Some` replaces the context, `None` keeps it.
pub type ActionResult<C> = Result<Option<C>, HandlerError>;

/// Executable action function.
pub type ActionFn<C, E> = Arc<dyn Fn(&C, &Event<E>) -> ActionResult<C> + Send + Sync>;

/// An action declared on a state (entry/exit) or a transition.
///
/// Either a direct function, or a name resolved against the registry
/// supplied in the machine options.
///
/// # Example
///
/// ```rust
/// use statekit::core::Action;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// struct Counter {
///     count: u32,
/// }
///
/// let increment = Action::<Counter, &str>::assign(|ctx, _| Counter {
///     count: ctx.count + 1,
/// });
/// let named = Action::<Counter, &str>::named("reset");
///
/// assert!(!increment.is_named());
/// assert_eq!(named.name(), Some("reset"));
/// ```
pub enum Action<C, E> {
    Direct(ActionFn<C, E>),
    Named(String),
}

impl<C, E> Action<C, E> {
    /// Create an action from a fallible function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> ActionResult<C> + Send + Sync + 'static,
    {
        Action::Direct(Arc::new(f))
    }

    /// Create an action that always replaces the context.
    pub fn assign<F>(f: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> C + Send + Sync + 'static,
        C: 'static,
        E: 'static,
    {
        Action::Direct(Arc::new(move |ctx: &C, event: &Event<E>| {
            Ok(Some(f(ctx, event)))
        }))
    }

    /// Create an action run for its side effect only; the context is left
    /// untouched.
    pub fn effect<F>(f: F) -> Self
    where
        F: Fn(&C, &Event<E>) + Send + Sync + 'static,
        C: 'static,
        E: 'static,
    {
        Action::Direct(Arc::new(move |ctx: &C, event: &Event<E>| {
            f(ctx, event);
            Ok(None)
        }))
    }

    /// Reference an action registered under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Action::Named(name.into())
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Action::Named(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Action::Named(name) => Some(name),
            Action::Direct(_) => None,
        }
    }
}

impl<C, E> Clone for Action<C, E> {
    fn clone(&self) -> Self {
        match self {
            Action::Direct(f) => Action::Direct(Arc::clone(f)),
            Action::Named(name) => Action::Named(name.clone()),
        }
    }
}

impl<C, E> fmt::Debug for Action<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Direct(_) => f.write_str("Action::Direct(<fn>)"),
            Action::Named(name) => f.debug_tuple("Action::Named").field(name).finish(),
        }
    }
}

impl<C, E> From<&str> for Action<C, E> {
    fn from(name: &str) -> Self {
        Action::named(name)
    }
}
