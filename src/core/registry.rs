//! Resolution of named actions and guards.

use super::action::{Action, ActionFn, ActionResult};
use super::event::Event;
use super::guard::{Guard, GuardFn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named actions and guards supplied by the caller.
///
/// Transitions refer to entries by name with [`Action::Named`] and
/// [`Guard::Named`]; resolution happens when the transition runs.
pub struct Registry<C, E> {
    actions: HashMap<String, ActionFn<C, E>>,
    guards: HashMap<String, GuardFn<C, E>>,
}

impl<C, E> Registry<C, E> {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            guards: HashMap::new(),
        }
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&C, &Event<E>) -> ActionResult<C> + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(f));
    }

    pub fn register_guard<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&C, &Event<E>) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(f));
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn has_guard(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    /// Map an action to its executable function.
    ///
    /// Returns `None` for a name that is not registered.
    pub fn resolve_action(&self, action: &Action<C, E>) -> Option<ActionFn<C, E>> {
        match action {
            Action::Direct(f) => Some(Arc::clone(f)),
            Action::Named(name) => self.actions.get(name).cloned(),
        }
    }

    /// Map a guard to its executable predicate.
    ///
    /// Returns `None` for a name that is not registered.
    pub fn resolve_guard(&self, guard: &Guard<C, E>) -> Option<GuardFn<C, E>> {
        match guard {
            Guard::Direct(f) => Some(Arc::clone(f)),
            Guard::Named(name) => self.guards.get(name).cloned(),
        }
    }
}

impl<C, E> Default for Registry<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> Clone for Registry<C, E> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
            guards: self.guards.clone(),
        }
    }
}

impl<C, E> fmt::Debug for Registry<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        let mut guards: Vec<_> = self.guards.keys().collect();
        actions.sort();
        guards.sort();
        f.debug_struct("Registry")
            .field("actions", &actions)
            .field("guards", &guards)
            .finish()
    }
}
