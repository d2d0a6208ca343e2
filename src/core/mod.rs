//! Core state machine types.
//!
//! This module contains the pure part of the engine:
//! - State, event and context traits
//! - The declarative configuration model
//! - Actions, guards and the registry that resolves named ones
//! - Snapshots and the bounded undo/redo history
//!
//! Nothing in this module performs I/O or schedules work; the machine in
//! [`crate::machine`] is the imperative shell around it.

mod action;
mod config;
mod event;
mod guard;
mod history;
mod registry;
mod snapshot;
mod state;

pub use action::{Action, ActionFn, ActionResult, HandlerError};
pub use config::{MachineConfig, Meta, StateDefinition, Transition, TAGS_KEY};
pub use event::{Event, Trigger};
pub use guard::{Guard, GuardFn};
pub use history::{HistoryBuffer, DEFAULT_HISTORY_SIZE};
pub use registry::Registry;
pub use snapshot::Snapshot;
pub use state::{Context, EventType, State};
