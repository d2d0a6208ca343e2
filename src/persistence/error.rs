//! Persistence error types.

use thiserror::Error;

/// Errors that can occur while saving or loading snapshots
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// Serialization of a snapshot to JSON failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Stored data did not match the serialized snapshot schema
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Stored snapshot names a state the machine does not declare
    #[error("Persisted state '{0}' is not declared by this machine")]
    UnknownState(String),

    /// The adapter's backing store reported a failure
    #[error("Adapter failed: {0}")]
    AdapterFailed(String),
}
