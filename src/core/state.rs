//! Marker traits for the three type parameters of a machine.
//!
//! A machine is generic over its state ids (`S`), its event types (`E`)
//! and its application context (`C`). Only state ids carry behavior; the
//! other two are blanket-implemented marker traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for state machine state ids.
///
/// State ids are keys of the state table, so they must be hashable and
/// comparable. They are persisted as part of a serialized snapshot, so
/// they must also round-trip through serde.
///
/// # Example
///
/// ```rust
/// use statekit::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum Light {
///     Off,
///     On,
/// }
///
/// impl State for Light {
///     fn name(&self) -> &str {
///         match self {
///             Self::Off => "Off",
///             Self::On => "On",
///         }
///     }
/// }
///
/// assert_eq!(Light::On.name(), "On");
/// ```
pub trait State:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &str;
}

impl State for String {
    fn name(&self) -> &str {
        self.as_str()
    }
}

/// Event types accepted by a machine.
///
/// Implemented for every type with the required bounds; enums and
/// `&'static str` both work.
pub trait EventType: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> EventType for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Application data carried by a machine.
///
/// Contexts are persisted and shallow-merged through JSON, hence the serde
/// bounds.
pub trait Context: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Context for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}
