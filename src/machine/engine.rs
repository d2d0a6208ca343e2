//! The transition engine.

use super::diagnostics::Diagnostics;
use super::error::MachineError;
use super::listeners::{Listener, ListenerRegistry, Subscription};
use super::options::MachineOptions;
use crate::builder::{self, BuildError};
use crate::core::{
    Action, Context, Event, EventType, HandlerError, HistoryBuffer, MachineConfig, Meta, Snapshot,
    State, Transition, Trigger,
};
use crate::persistence::{PersistenceError, Persister, SerializedState};
use crate::timers::{TimerCallback, TimerConfig, TimerTable};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mutable part of a machine.
struct Core<S, E, C> {
    current: S,
    context: C,
    history: Option<HistoryBuffer<S, E, C>>,
}

struct Shared<S, E, C> {
    config: Arc<MachineConfig<S, E, C>>,
    options: MachineOptions<C, E>,
    core: Mutex<Core<S, E, C>>,
    listeners: Arc<Mutex<ListenerRegistry<S, E, C>>>,
    timers: Option<Arc<TimerTable>>,
    persister: Option<Arc<Persister>>,
    diagnostics: Diagnostics,
    transitioning: AtomicBool,
    destroyed: AtomicBool,
    /// Loaded snapshot waiting for the in-flight transition to finish.
    parked: Mutex<Option<SerializedState<S, C>>>,
    hydration_parked: AtomicBool,
}

/// Holds the reentrancy flag for the duration of one transition.
struct TransitionGuard<'a>(&'a AtomicBool);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        // SeqCst pairs with `hydration_parked`; see `apply_parked_hydration`.
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Working copy of the context while actions run.
struct Working<C> {
    context: C,
    replaced: bool,
}

/// An event-driven state machine.
///
/// `StateMachine` is a cheap handle; clones share the same machine, so
/// actions, listeners and timer callbacks can hold one and call back in.
/// Calls made while a transition is in progress (for example `send` from
/// inside an action or listener) are dropped with a
/// [`MachineError::ReentrantSend`] diagnostic.
///
/// # Example
///
/// ```
/// use statekit::core::{MachineConfig, StateDefinition, Transition};
/// use statekit::machine::{MachineOptions, StateMachine};
///
/// let config = MachineConfig::new("off".to_string(), 0u32)
///     .state(
///         "off".to_string(),
///         StateDefinition::new().on("TOGGLE", Transition::to("on".to_string())),
///     )
///     .state(
///         "on".to_string(),
///         StateDefinition::new().on(
///             "TOGGLE",
///             Transition::to("off".to_string()).assign(|flips: &u32, _| flips + 1),
///         ),
///     );
/// let machine = StateMachine::new(config, MachineOptions::new()).unwrap();
///
/// machine.send("TOGGLE");
/// machine.send("TOGGLE");
/// assert!(machine.matches(&"off".to_string()));
/// assert_eq!(machine.context(), 1);
/// ```
pub struct StateMachine<S, E, C> {
    shared: Arc<Shared<S, E, C>>,
}

impl<S, E, C> Clone for StateMachine<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State, E: EventType, C: Context> fmt::Debug for StateMachine<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.lock_core();
        f.debug_struct("StateMachine")
            .field("state", &core.current)
            .field("context", &core.context)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl<S, E, C> Shared<S, E, C> {
    fn lock_core(&self) -> MutexGuard<'_, Core<S, E, C>> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerRegistry<S, E, C>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_parked(&self) -> MutexGuard<'_, Option<SerializedState<S, C>>> {
        self.parked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S: State, E: EventType, C: Context> StateMachine<S, E, C> {
    /// Validate `config` against `options` and start the machine in the
    /// initial state.
    ///
    /// With persistence enabled, a load of the stored snapshot is queued
    /// on the scheduler; until it runs, the machine is in the initial
    /// state.
    pub fn new(
        config: MachineConfig<S, E, C>,
        options: MachineOptions<C, E>,
    ) -> Result<Self, BuildError> {
        builder::validate(&config, &options)?;
        let current = config.initial.clone();
        let context = config.context.clone();
        let machine = Self::assemble(Arc::new(config), options, current, context);
        machine.schedule_hydration();
        tracing::debug!(state = machine.value().name(), "machine started");
        Ok(machine)
    }

    fn assemble(
        config: Arc<MachineConfig<S, E, C>>,
        options: MachineOptions<C, E>,
        current: S,
        context: C,
    ) -> Self {
        let diagnostics = Diagnostics::new(options.diagnostics.clone());
        let meta = meta_of(&config, &current);
        let history = options.history.map(|max_size| {
            HistoryBuffer::new(
                Snapshot {
                    value: current.clone(),
                    context: context.clone(),
                    changed: false,
                    event: Trigger::Init,
                    meta,
                },
                max_size,
            )
        });
        let timers = if options.timers {
            options.scheduler.clone().map(TimerTable::new)
        } else {
            None
        };
        let persister = match (&options.persistence, &options.scheduler) {
            (Some(persistence), Some(scheduler)) => {
                let sink = diagnostics.clone();
                Some(Persister::new(
                    persistence.clone(),
                    Arc::clone(scheduler),
                    Arc::new(move |error: PersistenceError| sink.report(error.into())),
                ))
            }
            _ => None,
        };
        let dev_tools = options.dev_tools;

        let machine = Self {
            shared: Arc::new(Shared {
                config,
                options,
                core: Mutex::new(Core {
                    current,
                    context,
                    history,
                }),
                listeners: Arc::new(Mutex::new(ListenerRegistry::new())),
                timers,
                persister,
                diagnostics,
                transitioning: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                parked: Mutex::new(None),
                hydration_parked: AtomicBool::new(false),
            }),
        };
        if dev_tools {
            machine.subscribe(dev_tools_observer::<S, E, C>);
        }
        machine
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Process an event.
    ///
    /// Accepts a bare event type or a full [`Event`]. Events without a
    /// matching transition, or whose guard fails, are ignored. Failures
    /// are reported through the diagnostic channel, never returned.
    pub fn send(&self, event: impl Into<Event<E>>) {
        let event = event.into();
        if self.is_destroyed() {
            tracing::debug!(event = ?event.kind, "event sent to destroyed machine ignored");
            return;
        }
        {
            let Some(_guard) = self.begin() else {
                self.shared.diagnostics.report(MachineError::ReentrantSend {
                    event: format!("{:?}", event.kind),
                });
                return;
            };
            self.transition(event);
        }
        self.apply_parked_hydration();
    }

    fn begin(&self) -> Option<TransitionGuard<'_>> {
        if self.shared.transitioning.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(TransitionGuard(&self.shared.transitioning))
        }
    }

    fn transition(&self, event: Event<E>) {
        let shared = &self.shared;
        let (from, context) = self.current_and_context();
        let Some(definition) = shared.config.definition(&from) else {
            return;
        };
        let Some(transition) = definition.transition(&event.kind) else {
            tracing::trace!(state = from.name(), event = ?event.kind, "no transition");
            return;
        };
        match self.guard_allows(transition, &context, &event) {
            Ok(true) => {}
            Ok(false) => {
                tracing::trace!(state = from.name(), event = ?event.kind, "guard blocked");
                return;
            }
            Err(error) => {
                shared.diagnostics.report(error);
                return;
            }
        }

        let target = transition.target.clone().unwrap_or_else(|| from.clone());
        let mut working = Working {
            context,
            replaced: false,
        };
        let outcome = self
            .execute(&definition.exit, &mut working, &from, &event)
            .and_then(|()| self.execute(&transition.actions, &mut working, &from, &event))
            .and_then(|()| match shared.config.definition(&target) {
                Some(next) => self.execute(&next.entry, &mut working, &target, &event),
                None => Ok(()),
            });
        if let Err(error) = outcome {
            // Nothing has been committed; the machine keeps its state.
            shared.diagnostics.report(error);
            return;
        }

        let changed = target != from || working.replaced;
        let snapshot = Snapshot {
            meta: meta_of(&shared.config, &target),
            value: target,
            context: working.context,
            changed,
            event: Trigger::Event(event),
        };
        {
            let mut core = shared.lock_core();
            core.current = snapshot.value.clone();
            core.context = snapshot.context.clone();
            if changed {
                if let Some(history) = core.history.as_mut() {
                    history.record(snapshot.clone());
                }
            }
        }
        tracing::debug!(
            from = from.name(),
            to = snapshot.value.name(),
            changed,
            "transition"
        );
        if changed {
            self.persist(&snapshot);
        }
        self.notify(&snapshot);
    }

    fn guard_allows(
        &self,
        transition: &Transition<S, E, C>,
        context: &C,
        event: &Event<E>,
    ) -> Result<bool, MachineError> {
        let Some(guard) = &transition.guard else {
            return Ok(true);
        };
        let predicate = self
            .shared
            .options
            .registry
            .resolve_guard(guard)
            .ok_or_else(|| MachineError::UnknownGuard(guard.name().unwrap_or_default().to_string()))?;
        Ok(predicate(context, event))
    }

    fn execute(
        &self,
        actions: &[Action<C, E>],
        working: &mut Working<C>,
        state: &S,
        event: &Event<E>,
    ) -> Result<(), MachineError> {
        for action in actions {
            let run = self
                .shared
                .options
                .registry
                .resolve_action(action)
                .ok_or_else(|| {
                    MachineError::UnknownAction(action.name().unwrap_or_default().to_string())
                })?;
            match run(&working.context, event) {
                Ok(Some(next)) => {
                    working.context = next;
                    working.replaced = true;
                }
                Ok(None) => {}
                Err(source) => {
                    return Err(MachineError::ActionFailed {
                        state: state.name().to_string(),
                        event: format!("{:?}", event.kind),
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current state as a snapshot with `changed == false` and an
    /// [`Trigger::Init`] trigger.
    pub fn snapshot(&self) -> Snapshot<S, E, C> {
        let (value, context) = self.current_and_context();
        Snapshot {
            meta: meta_of(&self.shared.config, &value),
            value,
            context,
            changed: false,
            event: Trigger::Init,
        }
    }

    pub fn value(&self) -> S {
        self.shared.lock_core().current.clone()
    }

    pub fn context(&self) -> C {
        self.shared.lock_core().context.clone()
    }

    fn current_and_context(&self) -> (S, C) {
        let core = self.shared.lock_core();
        (core.current.clone(), core.context.clone())
    }

    /// Whether `event` would fire a transition right now.
    pub fn can(&self, event: impl Into<Event<E>>) -> bool {
        let event = event.into();
        let (current, context) = self.current_and_context();
        self.can_fire(&current, &context, &event)
    }

    fn can_fire(&self, current: &S, context: &C, event: &Event<E>) -> bool {
        let transition = self
            .shared
            .config
            .definition(current)
            .and_then(|definition| definition.transition(&event.kind));
        match transition {
            Some(transition) => self
                .guard_allows(transition, context, event)
                .unwrap_or_else(|error| {
                    self.shared.diagnostics.report(error);
                    false
                }),
            None => false,
        }
    }

    /// Event types that would fire from the current state, in declaration
    /// order.
    pub fn next_events(&self) -> Vec<E> {
        let (current, context) = self.current_and_context();
        let Some(definition) = self.shared.config.definition(&current) else {
            return Vec::new();
        };
        definition
            .events()
            .filter(|kind| self.can_fire(&current, &context, &Event::new((*kind).clone())))
            .cloned()
            .collect()
    }

    pub fn matches(&self, state: &S) -> bool {
        self.shared.lock_core().current == *state
    }

    /// Whether the current state is any of `states`.
    pub fn matches_any<'a, I>(&self, states: I) -> bool
    where
        I: IntoIterator<Item = &'a S>,
        S: 'a,
    {
        let current = self.value();
        states.into_iter().any(|state| *state == current)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let current = self.value();
        self.shared
            .config
            .definition(&current)
            .is_some_and(|definition| definition.has_tag(tag))
    }

    pub fn config(&self) -> &MachineConfig<S, E, C> {
        &self.shared.config
    }

    /// New, independent machine in the current state whose context is the
    /// current context shallow-merged with `partial` (a JSON object).
    ///
    /// The new machine shares the configuration and options but has its own
    /// history, timers and listeners, and does not reload persisted data.
    pub fn with_context(&self, partial: Value) -> Result<Self, MachineError> {
        let Value::Object(patch) = partial else {
            return Err(MachineError::ContextMerge(
                "partial context must be a JSON object".to_string(),
            ));
        };
        let (current, context) = self.current_and_context();
        let mut merged = serde_json::to_value(&context)
            .map_err(|e| MachineError::ContextMerge(e.to_string()))?;
        let Value::Object(fields) = &mut merged else {
            return Err(MachineError::ContextMerge(
                "context does not serialize to a JSON object".to_string(),
            ));
        };
        fields.extend(patch);
        let context: C =
            serde_json::from_value(merged).map_err(|e| MachineError::ContextMerge(e.to_string()))?;

        Ok(Self::assemble(
            Arc::clone(&self.shared.config),
            self.shared.options.clone(),
            current,
            context,
        ))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a listener. It is called at once with the current snapshot
    /// and then after every processed event, undo, redo and hydration.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot<S, E, C>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if self.is_destroyed() {
            return Subscription::inert();
        }
        let listener: Listener<S, E, C> = Arc::new(listener);
        let id = self.shared.lock_listeners().add(Arc::clone(&listener));
        if let Err(source) = listener(&self.snapshot()) {
            self.shared
                .diagnostics
                .report(MachineError::ListenerFailed { listener: id, source });
        }

        let registry = Arc::downgrade(&self.shared.listeners);
        Subscription::new(id, move || {
            let Some(registry) = registry.upgrade() else {
                return false;
            };
            let removed = registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(id);
            removed
        })
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock_listeners().len()
    }

    fn notify(&self, snapshot: &Snapshot<S, E, C>) {
        let listeners = self.shared.lock_listeners().entries();
        for (id, listener) in listeners {
            if let Err(source) = listener(snapshot) {
                self.shared
                    .diagnostics
                    .report(MachineError::ListenerFailed { listener: id, source });
            }
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Step back one history entry. Returns whether anything changed.
    pub fn undo(&self) -> bool {
        self.travel(Trigger::Undo)
    }

    /// Step forward one history entry. Returns whether anything changed.
    pub fn redo(&self) -> bool {
        self.travel(Trigger::Redo)
    }

    fn travel(&self, trigger: Trigger<E>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let moved = {
            let Some(_guard) = self.begin() else {
                self.shared.diagnostics.report(MachineError::ReentrantSend {
                    event: trigger.label().to_string(),
                });
                return false;
            };
            self.step(trigger)
        };
        self.apply_parked_hydration();
        moved
    }

    fn step(&self, trigger: Trigger<E>) -> bool {
        let entry = {
            let mut core = self.shared.lock_core();
            let Some(history) = core.history.as_mut() else {
                return false;
            };
            let entry = match trigger {
                Trigger::Undo => history.undo(),
                Trigger::Redo => history.redo(),
                _ => None,
            }
            .cloned();
            if let Some(entry) = &entry {
                core.current = entry.value.clone();
                core.context = entry.context.clone();
            }
            entry
        };
        let Some(entry) = entry else {
            return false;
        };

        tracing::debug!(trigger = trigger.label(), state = entry.value.name(), "history step");
        let snapshot = Snapshot {
            value: entry.value,
            context: entry.context,
            changed: true,
            event: trigger,
            meta: entry.meta,
        };
        self.persist(&snapshot);
        self.notify(&snapshot);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.shared
            .lock_core()
            .history
            .as_ref()
            .is_some_and(HistoryBuffer::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.shared
            .lock_core()
            .history
            .as_ref()
            .is_some_and(HistoryBuffer::can_redo)
    }

    /// Copy of the history buffer, if history is enabled.
    pub fn history(&self) -> Option<HistoryBuffer<S, E, C>> {
        self.shared.lock_core().history.clone()
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn timers(&self, capability: &'static str) -> Option<&Arc<TimerTable>> {
        let timers = self.shared.timers.as_ref();
        if timers.is_none() {
            self.shared
                .diagnostics
                .report(MachineError::CapabilityNotEnabled { capability });
        }
        timers
    }

    /// Start (or restart) a named timer that calls `callback`.
    pub fn start_timer<F>(&self, config: TimerConfig, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_destroyed() {
            return;
        }
        if let Some(timers) = self.timers("timers") {
            let callback: TimerCallback = Arc::new(callback);
            timers.start(config, callback);
        }
    }

    /// Cancel a named timer. Returns whether it was live.
    pub fn clear_timer(&self, id: &str) -> bool {
        self.timers("timers").is_some_and(|timers| timers.clear(id))
    }

    /// Deliver `event` through `send` after `delay`.
    ///
    /// Returns the id of the delayed event, or `None` when timers are not
    /// enabled or the machine was destroyed.
    pub fn send_delayed(&self, event: impl Into<Event<E>>, delay: Duration) -> Option<String> {
        if self.is_destroyed() {
            return None;
        }
        let timers = self.timers("delayed events")?;
        let event = event.into();
        let machine = Arc::downgrade(&self.shared);
        timers.schedule_delayed(
            delay,
            Box::new(move || {
                if let Some(shared) = machine.upgrade() {
                    StateMachine { shared }.send(event);
                }
            }),
        )
    }

    /// Cancel a delayed event. Returns whether it was still pending.
    pub fn cancel_delayed(&self, id: &str) -> bool {
        self.timers("delayed events")
            .is_some_and(|timers| timers.cancel_delayed(id))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persist(&self, snapshot: &Snapshot<S, E, C>) {
        let Some(persister) = &self.shared.persister else {
            return;
        };
        let state = SerializedState::capture(snapshot.value.clone(), snapshot.context.clone());
        match state.to_value() {
            Ok(data) => persister.save(data),
            Err(error) => self.shared.diagnostics.report(error.into()),
        }
    }

    fn schedule_hydration(&self) {
        let Some(persister) = &self.shared.persister else {
            return;
        };
        let machine = Arc::downgrade(&self.shared);
        persister.load_later(Box::new(move |data: Value| {
            if let Some(shared) = machine.upgrade() {
                StateMachine { shared }.hydrate(data);
            }
        }));
    }

    /// Validate loaded data and apply it, or park it until the transition
    /// in flight finishes.
    fn hydrate(&self, data: Value) {
        if self.is_destroyed() {
            return;
        }
        let stored = match SerializedState::<S, C>::from_value(data) {
            Ok(stored) => stored,
            Err(error) => {
                self.shared.diagnostics.report(error.into());
                return;
            }
        };
        if !self.shared.config.contains(&stored.value) {
            self.shared
                .diagnostics
                .report(PersistenceError::UnknownState(stored.value.name().to_string()).into());
            return;
        }

        *self.shared.lock_parked() = Some(stored);
        self.shared.hydration_parked.store(true, Ordering::SeqCst);
        self.apply_parked_hydration();
    }

    /// Apply a parked hydration if no transition is running.
    ///
    /// Called by the hydration task and after `send`, `undo` and `redo`
    /// release the guard. A load that lands mid-transition is applied right
    /// after that transition commits.
    fn apply_parked_hydration(&self) {
        if !self.shared.hydration_parked.load(Ordering::SeqCst) {
            return;
        }
        let Some(_guard) = self.begin() else {
            tracing::debug!("hydration deferred until the current transition finishes");
            return;
        };
        self.shared.hydration_parked.store(false, Ordering::SeqCst);
        let parked = self.shared.lock_parked().take();
        if let Some(stored) = parked {
            if !self.is_destroyed() {
                self.restore(stored);
            }
        }
    }

    fn restore(&self, stored: SerializedState<S, C>) {
        let snapshot = Snapshot {
            meta: meta_of(&self.shared.config, &stored.value),
            value: stored.value,
            context: stored.context,
            changed: true,
            event: Trigger::Init,
        };
        {
            let mut core = self.shared.lock_core();
            core.current = snapshot.value.clone();
            core.context = snapshot.context.clone();
            if let Some(history) = core.history.as_mut() {
                history.reset(Snapshot {
                    changed: false,
                    ..snapshot.clone()
                });
            }
        }
        tracing::info!(
            state = snapshot.value.name(),
            saved_at = stored.timestamp,
            "hydrated from persisted snapshot"
        );
        self.notify(&snapshot);
    }

    /// Remove the persisted snapshot and any pending save.
    pub fn clear_persisted(&self) {
        let Some(persister) = &self.shared.persister else {
            self.shared.diagnostics.report(MachineError::CapabilityNotEnabled {
                capability: "persistence",
            });
            return;
        };
        match persister.clear() {
            Ok(()) => tracing::debug!(key = persister.key(), "persisted snapshot cleared"),
            Err(error) => self.shared.diagnostics.report(error.into()),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Cancel all timers, delayed events and pending saves and drop every
    /// listener. The machine is inert afterwards; calling this twice is a
    /// no-op.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timers) = &self.shared.timers {
            timers.shutdown();
        }
        if let Some(persister) = &self.shared.persister {
            persister.shutdown();
        }
        self.shared.lock_listeners().clear();
        tracing::debug!(state = self.value().name(), "machine destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }
}

fn meta_of<S: State, E: EventType, C>(config: &MachineConfig<S, E, C>, state: &S) -> Meta {
    config
        .definition(state)
        .map(|definition| definition.meta.clone())
        .unwrap_or_default()
}

fn dev_tools_observer<S: State, E: EventType, C: Context>(
    snapshot: &Snapshot<S, E, C>,
) -> Result<(), HandlerError> {
    tracing::debug!(
        target: "statekit::devtools",
        state = snapshot.value.name(),
        trigger = snapshot.event.label(),
        changed = snapshot.changed,
        context = ?snapshot.context,
        "snapshot"
    );
    Ok(())
}
