//! Builder API for ergonomic state machine construction.
//!
//! [`StateMachineBuilder`] assembles a configuration piece by piece;
//! [`StateMachine::new`](crate::machine::StateMachine::new) takes a
//! finished one. Both validate the state table the same way and report
//! every problem at once.

pub mod error;
pub mod machine;
pub mod macros;

pub use error::{BuildError, ConfigError};
pub use machine::StateMachineBuilder;

pub(crate) use machine::validate;
