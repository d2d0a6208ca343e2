//! Declarative machine configuration: the state table.
//!
//! A configuration is immutable once a machine has been built from it.
//! The types here are plain data with fluent constructors; validation of
//! the table happens in [`crate::builder`].

use super::action::Action;
use super::event::Event;
use super::guard::Guard;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::Hash;

/// Free-form metadata attached to a state.
pub type Meta = HashMap<String, Value>;

/// Metadata key holding the tag list of a state.
pub const TAGS_KEY: &str = "tags";

/// Transition declared for one event type in one state.
///
/// A transition without a target is internal: the state id does not
/// change, but the state's own exit and entry actions still run around
/// the transition's actions.
#[derive(Clone, Debug)]
pub struct Transition<S, E, C> {
    pub target: Option<S>,
    pub actions: Vec<Action<C, E>>,
    pub guard: Option<Guard<C, E>>,
}

impl<S, E: 'static, C: 'static> Transition<S, E, C> {
    /// External transition to `target`.
    pub fn to(target: S) -> Self {
        Self {
            target: Some(target),
            actions: Vec::new(),
            guard: None,
        }
    }

    /// Internal transition; the state id is left unchanged.
    pub fn internal() -> Self {
        Self {
            target: None,
            actions: Vec::new(),
            guard: None,
        }
    }

    /// Append an action (a direct [`Action`] or a registered name).
    pub fn action(mut self, action: impl Into<Action<C, E>>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Append an action that replaces the context.
    pub fn assign<F>(self, f: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> C + Send + Sync + 'static,
    {
        self.action(Action::assign(f))
    }

    /// Set the guard (a direct [`Guard`] or a registered name).
    pub fn guard(mut self, guard: impl Into<Guard<C, E>>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Set a guard from a closure.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> bool + Send + Sync + 'static,
    {
        self.guard(Guard::new(predicate))
    }

    pub fn is_internal(&self) -> bool {
        self.target.is_none()
    }
}

/// Definition of a single state.
#[derive(Clone, Debug)]
pub struct StateDefinition<S, E, C> {
    /// Transitions keyed by event type, in declaration order.
    pub on: Vec<(E, Transition<S, E, C>)>,
    pub entry: Vec<Action<C, E>>,
    pub exit: Vec<Action<C, E>>,
    pub meta: Meta,
}

impl<S, E: PartialEq, C> StateDefinition<S, E, C> {
    pub fn new() -> Self {
        Self {
            on: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            meta: Meta::new(),
        }
    }

    /// Declare the transition for `event`, replacing any earlier one.
    pub fn on(mut self, event: E, transition: Transition<S, E, C>) -> Self {
        match self.on.iter().position(|(declared, _)| *declared == event) {
            Some(index) => self.on[index].1 = transition,
            None => self.on.push((event, transition)),
        }
        self
    }

    pub fn entry(mut self, action: impl Into<Action<C, E>>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<Action<C, E>>) -> Self {
        self.exit.push(action.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Set the tag list queried by `StateMachine::has_tag`.
    pub fn tags<I, T>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tags: Vec<Value> = tags.into_iter().map(|t| Value::String(t.into())).collect();
        self.meta(TAGS_KEY, Value::Array(tags))
    }

    /// Transition declared for `event`, if any.
    pub fn transition(&self, event: &E) -> Option<&Transition<S, E, C>> {
        self.on
            .iter()
            .find(|(declared, _)| declared == event)
            .map(|(_, transition)| transition)
    }

    /// Declared event types, in declaration order.
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.on.iter().map(|(event, _)| event)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        match self.meta.get(TAGS_KEY) {
            Some(Value::Array(tags)) => tags.iter().any(|t| t.as_str() == Some(tag)),
            _ => false,
        }
    }
}

impl<S, E: PartialEq, C> Default for StateDefinition<S, E, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The full state table plus the initial context.
#[derive(Clone, Debug)]
pub struct MachineConfig<S, E, C> {
    pub initial: S,
    pub states: HashMap<S, StateDefinition<S, E, C>>,
    pub context: C,
}

impl<S: Eq + Hash, E: PartialEq, C> MachineConfig<S, E, C> {
    pub fn new(initial: S, context: C) -> Self {
        Self {
            initial,
            states: HashMap::new(),
            context,
        }
    }

    /// Declare a state, replacing any earlier definition.
    pub fn state(mut self, id: S, definition: StateDefinition<S, E, C>) -> Self {
        self.states.insert(id, definition);
        self
    }

    pub fn definition(&self, id: &S) -> Option<&StateDefinition<S, E, C>> {
        self.states.get(id)
    }

    pub fn contains(&self, id: &S) -> bool {
        self.states.contains_key(id)
    }
}
