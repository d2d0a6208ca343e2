//! Statekit: a declarative, event-driven finite state machine engine.
//!
//! A machine is described by a state table: each state declares which
//! event types it reacts to, where each reaction leads, which guard gates
//! it and which actions compute the next context. The engine processes
//! events one at a time, publishes an immutable [`Snapshot`] after each
//! one and optionally keeps an undo/redo history, persists snapshots
//! through an adapter, and runs timers and delayed events through a
//! pluggable scheduler.
//!
//! # Core Concepts
//!
//! - **State**: hashable, serializable state ids via the [`State`] trait
//! - **Context**: application data, replaced only by action results
//! - **Guards**: predicates that gate transitions
//! - **Actions**: functions returning a new context (or none), or failing
//! - **Snapshots**: what listeners see, history stores and adapters save
//!
//! # Example
//!
//! ```rust
//! use statekit::{state_enum, StateDefinition, StateMachineBuilder, Transition};
//!
//! state_enum! {
//!     pub enum Light {
//!         Off,
//!         On,
//!     }
//! }
//!
//! let machine = StateMachineBuilder::new()
//!     .initial(Light::Off)
//!     .context(0u32)
//!     .state(Light::Off, StateDefinition::new().on("TOGGLE", Transition::to(Light::On)))
//!     .state(
//!         Light::On,
//!         StateDefinition::new()
//!             .on("TOGGLE", Transition::to(Light::Off).assign(|n: &u32, _| n + 1)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! machine.send("TOGGLE");
//! machine.send("TOGGLE");
//! assert!(machine.matches(&Light::Off));
//! assert_eq!(machine.context(), 1);
//! ```

pub mod builder;
pub mod core;
pub mod machine;
pub mod persistence;
pub mod timers;

// Re-export commonly used types
pub use crate::builder::{BuildError, ConfigError, StateMachineBuilder};
pub use crate::core::{
    Action, Event, Guard, HandlerError, HistoryBuffer, MachineConfig, Snapshot, State,
    StateDefinition, Transition, Trigger,
};
pub use crate::machine::{MachineError, MachineOptions, StateMachine, Subscription};
pub use crate::persistence::{MemoryAdapter, PersistenceAdapter, PersistenceError, PersistenceOptions};
pub use crate::timers::{ManualScheduler, Scheduler, TimerConfig, TokioScheduler};
