//! Snapshots published to listeners, stored in history and persisted.

use super::config::{Meta, TAGS_KEY};
use super::event::Trigger;
use serde_json::Value;

/// Immutable record of the machine at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<S, E, C> {
    /// Current state id.
    pub value: S,
    pub context: C,
    /// True iff the state id changed or an action replaced the context.
    pub changed: bool,
    /// What produced this snapshot.
    pub event: Trigger<E>,
    /// Metadata of the current state.
    pub meta: Meta,
}

impl<S: PartialEq, E, C> Snapshot<S, E, C> {
    pub fn matches(&self, state: &S) -> bool {
        self.value == *state
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        match self.meta.get(TAGS_KEY) {
            Some(Value::Array(tags)) => tags.iter().any(|t| t.as_str() == Some(tag)),
            _ => false,
        }
    }
}
