//! The running machine: transition engine, listeners and diagnostics.
//!
//! [`StateMachine`] owns the mutable state around an immutable
//! [`MachineConfig`](crate::core::MachineConfig): the current state id and
//! context, the optional undo/redo history, listeners, timers and the
//! persistence manager. User code (actions, guards, listeners, timer
//! callbacks) always runs without internal locks held.

mod diagnostics;
mod engine;
pub mod error;
mod listeners;
mod options;

pub use diagnostics::DiagnosticHook;
pub use engine::StateMachine;
pub use error::MachineError;
pub use listeners::{Listener, Subscription};
pub use options::MachineOptions;
