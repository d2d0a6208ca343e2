//! Diagnostic channel: tracing plus an optional host hook.

use super::error::MachineError;
use std::sync::Arc;

/// Host callback receiving every reported [`MachineError`].
pub type DiagnosticHook = Arc<dyn Fn(&MachineError) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    hook: Option<DiagnosticHook>,
}

impl Diagnostics {
    pub(crate) fn new(hook: Option<DiagnosticHook>) -> Self {
        Self { hook }
    }

    pub(crate) fn report(&self, error: MachineError) {
        if error.is_recoverable() {
            tracing::warn!(%error, "statekit diagnostic");
        } else {
            tracing::error!(%error, "statekit diagnostic");
        }
        if let Some(hook) = &self.hook {
            hook(&error);
        }
    }
}
