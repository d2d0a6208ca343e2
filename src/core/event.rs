//! Events delivered to a machine and the triggers recorded on snapshots.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// An event sent to a machine.
///
/// Bare event types convert into an `Event` with no payload, so both
/// `machine.send(Ev::Toggle)` and `machine.send(Event::new(Ev::Toggle))`
/// are accepted.
///
/// # Example
///
/// ```rust
/// use statekit::core::Event;
/// use serde_json::json;
///
/// let event = Event::new("LOGIN")
///     .with_payload(json!({ "user": "ada" }))
///     .with_field("source", json!("form"));
///
/// assert_eq!(event.kind, "LOGIN");
/// assert_eq!(event.payload, Some(json!({ "user": "ada" })));
/// assert_eq!(event.field("source"), Some(&json!("form")));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Event<E> {
    /// The event type, used to look up the transition.
    pub kind: E,
    /// Optional payload carried to guards and actions.
    pub payload: Option<Value>,
    /// Any extra fields attached by the sender.
    pub extra: Map<String, Value>,
}

impl<E> Event<E> {
    /// Create an event with no payload.
    pub fn new(kind: E) -> Self {
        Self {
            kind,
            payload: None,
            extra: Map::new(),
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach an extra named field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up an extra field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Deserialize the payload into a typed value.
    ///
    /// Returns `None` if there is no payload or it does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.payload
            .as_ref()
            .and_then(|payload| serde_json::from_value(payload.clone()).ok())
    }
}

impl<E> From<E> for Event<E> {
    fn from(kind: E) -> Self {
        Event::new(kind)
    }
}

/// What produced a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger<E> {
    /// Synthetic trigger of a plain read (`StateMachine::snapshot`).
    Init,
    /// Snapshot republished by an undo.
    Undo,
    /// Snapshot republished by a redo.
    Redo,
    /// Snapshot produced by processing an event.
    Event(Event<E>),
}

impl<E> Trigger<E> {
    /// The processed event, if this snapshot came from one.
    pub fn event(&self) -> Option<&Event<E>> {
        match self {
            Trigger::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Init => "INIT",
            Trigger::Undo => "UNDO",
            Trigger::Redo => "REDO",
            Trigger::Event(_) => "EVENT",
        }
    }
}
