//! Runtime diagnostics of a running machine.

use crate::core::HandlerError;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Problems reported through the diagnostic channel.
///
/// None of these escape to the caller of `send`; the machine logs them and
/// forwards them to the `on_diagnostic` hook, then carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineError {
    #[error("Machine is already transitioning; '{event}' was dropped")]
    ReentrantSend { event: String },

    #[error("Action failed in state '{state}' on '{event}': {source}")]
    ActionFailed {
        state: String,
        event: String,
        source: HandlerError,
    },

    #[error("Action '{0}' is not registered")]
    UnknownAction(String),

    #[error("Guard '{0}' is not registered")]
    UnknownGuard(String),

    #[error("Listener {listener} failed: {source}")]
    ListenerFailed { listener: u64, source: HandlerError },

    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] PersistenceError),

    #[error("{capability} are not enabled for this machine")]
    CapabilityNotEnabled { capability: &'static str },

    #[error("Cannot merge context: {0}")]
    ContextMerge(String),
}

impl MachineError {
    /// Whether this is an expected drop rather than a failure of user code
    /// or storage.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MachineError::ReentrantSend { .. } | MachineError::CapabilityNotEnabled { .. }
        )
    }
}
