//! Build errors for machines and their configuration.

use thiserror::Error;

/// Errors that can occur when building a state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Initial context not specified. Call .context(value) before .build()")]
    MissingContext,

    /// Every problem found in the configuration, not just the first.
    #[error("Invalid machine configuration: {}", describe(.0))]
    Invalid(Vec<ConfigError>),
}

/// One problem in a machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("initial state '{state}' is not declared")]
    UnknownInitial { state: String },

    #[error("'{event}' in state '{from}' targets undeclared state '{target}'")]
    UnknownTarget {
        from: String,
        event: String,
        target: String,
    },

    #[error("action '{name}' used in state '{state}' is not registered")]
    UnknownAction { state: String, name: String },

    #[error("guard '{name}' used in state '{state}' is not registered")]
    UnknownGuard { state: String, name: String },

    #[error("{capability} require a scheduler. Call .scheduler(...) on the options")]
    SchedulerRequired { capability: &'static str },
}

fn describe(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
