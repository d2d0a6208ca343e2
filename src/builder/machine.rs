//! Builder and validation for state machines.

use crate::builder::error::{BuildError, ConfigError};
use crate::core::{Action, Context, EventType, Guard, MachineConfig, State, StateDefinition};
use crate::machine::{MachineOptions, StateMachine};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<ConfigError>>;

/// Builder for constructing state machines with a fluent API.
///
/// # Example
///
/// ```
/// use statekit::builder::StateMachineBuilder;
/// use statekit::core::{StateDefinition, Transition};
///
/// let machine = StateMachineBuilder::new()
///     .initial("idle".to_string())
///     .context(0u32)
///     .state(
///         "idle".to_string(),
///         StateDefinition::new().on("GO", Transition::to("busy".to_string())),
///     )
///     .state("busy".to_string(), StateDefinition::new())
///     .build()
///     .unwrap();
///
/// machine.send("GO");
/// assert!(machine.matches(&"busy".to_string()));
/// ```
pub struct StateMachineBuilder<S, E, C> {
    initial: Option<S>,
    context: Option<C>,
    states: Vec<(S, StateDefinition<S, E, C>)>,
    options: MachineOptions<C, E>,
}

impl<S: State, E: EventType, C: Context> StateMachineBuilder<S, E, C> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            initial: None,
            context: None,
            states: Vec::new(),
            options: MachineOptions::new(),
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: S) -> Self {
        self.initial = Some(state);
        self
    }

    /// Set the initial context (required).
    pub fn context(mut self, context: C) -> Self {
        self.context = Some(context);
        self
    }

    /// Declare a state. Declaring the same id twice keeps the last one.
    pub fn state(mut self, id: S, definition: StateDefinition<S, E, C>) -> Self {
        self.states.push((id, definition));
        self
    }

    pub fn options(mut self, options: MachineOptions<C, E>) -> Self {
        self.options = options;
        self
    }

    /// Build the state machine.
    ///
    /// Returns an error if required fields are missing or the state table
    /// does not validate.
    pub fn build(self) -> Result<StateMachine<S, E, C>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;
        let context = self.context.ok_or(BuildError::MissingContext)?;

        let config = self
            .states
            .into_iter()
            .fold(MachineConfig::new(initial, context), |config, (id, def)| {
                config.state(id, def)
            });
        StateMachine::new(config, self.options)
    }
}

impl<S: State, E: EventType, C: Context> Default for StateMachineBuilder<S, E, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the state table against the options, accumulating every problem.
pub(crate) fn validate<S: State, E: EventType, C: Context>(
    config: &MachineConfig<S, E, C>,
    options: &MachineOptions<C, E>,
) -> Result<(), BuildError> {
    let mut checks = vec![check(config.contains(&config.initial), || {
        ConfigError::UnknownInitial {
            state: config.initial.name().to_string(),
        }
    })];

    for (id, definition) in &config.states {
        for action in definition.entry.iter().chain(&definition.exit) {
            checks.push(check_action(id, action, options));
        }
        for (event, transition) in &definition.on {
            if let Some(target) = &transition.target {
                checks.push(check(config.contains(target), || {
                    ConfigError::UnknownTarget {
                        from: id.name().to_string(),
                        event: format!("{:?}", event),
                        target: target.name().to_string(),
                    }
                }));
            }
            for action in &transition.actions {
                checks.push(check_action(id, action, options));
            }
            if let Some(guard) = &transition.guard {
                checks.push(check_guard(id, guard, options));
            }
        }
    }

    if options.scheduler.is_none() {
        checks.push(check(!options.timers, || ConfigError::SchedulerRequired {
            capability: "timers",
        }));
        checks.push(check(options.persistence.is_none(), || {
            ConfigError::SchedulerRequired {
                capability: "persistence",
            }
        }));
    }

    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(BuildError::Invalid(errors.iter().cloned().collect())),
    }
}

fn check(ok: bool, error: impl FnOnce() -> ConfigError) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(error())
    }
}

fn check_action<S: State, E, C>(
    state: &S,
    action: &Action<C, E>,
    options: &MachineOptions<C, E>,
) -> Check {
    match action.name() {
        Some(name) => check(options.registry().has_action(name), || {
            ConfigError::UnknownAction {
                state: state.name().to_string(),
                name: name.to_string(),
            }
        }),
        None => Validation::success(()),
    }
}

fn check_guard<S: State, E, C>(
    state: &S,
    guard: &Guard<C, E>,
    options: &MachineOptions<C, E>,
) -> Check {
    match guard.name() {
        Some(name) => check(options.registry().has_guard(name), || {
            ConfigError::UnknownGuard {
                state: state.name().to_string(),
                name: name.to_string(),
            }
        }),
        None => Validation::success(()),
    }
}
