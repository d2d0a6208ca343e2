//! Options of a machine: handler registry, history, persistence, timers.

use super::diagnostics::DiagnosticHook;
use super::error::MachineError;
use crate::core::{ActionResult, Event, Registry, DEFAULT_HISTORY_SIZE};
use crate::persistence::PersistenceOptions;
use crate::timers::Scheduler;
use std::fmt;
use std::sync::Arc;

/// Optional capabilities of a machine.
///
/// Everything is off by default. Timers and persistence need a
/// [`Scheduler`]; construction fails with
/// [`ConfigError::SchedulerRequired`](crate::builder::ConfigError::SchedulerRequired)
/// otherwise.
///
/// # Example
///
/// ```
/// use statekit::machine::MachineOptions;
/// use statekit::timers::ManualScheduler;
/// use std::sync::Arc;
///
/// let options = MachineOptions::<u32, &str>::new()
///     .action("bump", |count, _| Ok(Some(count + 1)))
///     .with_history()
///     .timers(true)
///     .scheduler(Arc::new(ManualScheduler::new()));
/// assert_eq!(options.history_size(), Some(50));
/// ```
pub struct MachineOptions<C, E> {
    pub(crate) registry: Registry<C, E>,
    pub(crate) history: Option<usize>,
    pub(crate) persistence: Option<PersistenceOptions>,
    pub(crate) timers: bool,
    pub(crate) dev_tools: bool,
    pub(crate) scheduler: Option<Arc<dyn Scheduler>>,
    pub(crate) diagnostics: Option<DiagnosticHook>,
}

impl<C, E> MachineOptions<C, E> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            history: None,
            persistence: None,
            timers: false,
            dev_tools: false,
            scheduler: None,
            diagnostics: None,
        }
    }

    /// Register a named action.
    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> ActionResult<C> + Send + Sync + 'static,
    {
        self.registry.register_action(name, f);
        self
    }

    /// Register a named guard.
    pub fn guard<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, &Event<E>) -> bool + Send + Sync + 'static,
    {
        self.registry.register_guard(name, f);
        self
    }

    /// Enable undo/redo with at most `max_size` entries (at least one).
    pub fn history(mut self, max_size: usize) -> Self {
        self.history = Some(max_size.max(1));
        self
    }

    /// Enable undo/redo with the default size.
    pub fn with_history(self) -> Self {
        self.history(DEFAULT_HISTORY_SIZE)
    }

    pub fn persistence(mut self, persistence: PersistenceOptions) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn timers(mut self, enabled: bool) -> Self {
        self.timers = enabled;
        self
    }

    /// Log every snapshot at debug level under the `statekit::devtools`
    /// target.
    pub fn dev_tools(mut self, enabled: bool) -> Self {
        self.dev_tools = enabled;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Receive every diagnostic the machine reports.
    pub fn on_diagnostic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MachineError) + Send + Sync + 'static,
    {
        self.diagnostics = Some(Arc::new(hook));
        self
    }

    pub fn registry(&self) -> &Registry<C, E> {
        &self.registry
    }

    pub fn history_size(&self) -> Option<usize> {
        self.history
    }
}

impl<C, E> Default for MachineOptions<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> Clone for MachineOptions<C, E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            history: self.history,
            persistence: self.persistence.clone(),
            timers: self.timers,
            dev_tools: self.dev_tools,
            scheduler: self.scheduler.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<C, E> fmt::Debug for MachineOptions<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineOptions")
            .field("registry", &self.registry)
            .field("history", &self.history)
            .field("persistence", &self.persistence)
            .field("timers", &self.timers)
            .field("dev_tools", &self.dev_tools)
            .field("scheduler", &self.scheduler.is_some())
            .finish_non_exhaustive()
    }
}
