//! End-to-end behavior of running machines.

use serde::{Deserialize, Serialize};
use serde_json::json;
use statekit::core::{Action, HandlerError, Trigger};
use statekit::machine::MachineError;
use statekit::persistence::{PersistenceAdapter, PersistenceError, SerializedState};
use statekit::timers::TimerConfig;
use statekit::{
    state_enum, Event, MachineOptions, ManualScheduler, MemoryAdapter, PersistenceOptions,
    StateDefinition, StateMachine, StateMachineBuilder, Transition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

state_enum! {
    enum Switch {
        Off,
        On,
    }
}

state_enum! {
    enum Fetch {
        Idle,
        Loading,
        Failed,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Retry {
    attempts: u32,
}

type Errors = Arc<Mutex<Vec<MachineError>>>;

fn collect_errors<C, E>(options: MachineOptions<C, E>) -> (MachineOptions<C, E>, Errors) {
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let options = options.on_diagnostic(move |e| sink.lock().unwrap().push(e.clone()));
    (options, errors)
}

fn switch(options: MachineOptions<u32, &'static str>) -> StateMachine<Switch, &'static str, u32> {
    StateMachineBuilder::new()
        .initial(Switch::Off)
        .context(0u32)
        .state(
            Switch::Off,
            StateDefinition::new().on("TOGGLE", Transition::to(Switch::On)),
        )
        .state(
            Switch::On,
            StateDefinition::new().on("TOGGLE", Transition::to(Switch::Off)),
        )
        .options(options)
        .build()
        .unwrap()
}

fn counter(options: MachineOptions<Counter, &'static str>) -> StateMachine<String, &'static str, Counter> {
    StateMachineBuilder::new()
        .initial("active".to_string())
        .context(Counter::default())
        .state(
            "active".to_string(),
            StateDefinition::new()
                .on("INCREMENT", Transition::internal().action("increment"))
                .on(
                    "FINISH",
                    Transition::to("done".to_string()),
                ),
        )
        .state("done".to_string(), StateDefinition::new())
        .options(options.action("increment", |c: &Counter, _| {
            Ok(Some(Counter { count: c.count + 1 }))
        }))
        .build()
        .unwrap()
}

#[test]
fn toggle_twice_returns_to_off_with_two_changed_notifications() {
    let machine = switch(MachineOptions::new());
    let changed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changed);
    machine.subscribe(move |snapshot| {
        sink.lock().unwrap().push((snapshot.value, snapshot.changed));
        Ok(())
    });

    machine.send("TOGGLE");
    machine.send("TOGGLE");

    assert!(machine.matches(&Switch::Off));
    assert_eq!(
        *changed.lock().unwrap(),
        vec![
            (Switch::Off, false),
            (Switch::On, true),
            (Switch::Off, true)
        ]
    );
}

#[test]
fn retry_guard_blocks_after_three_failures() {
    let options = MachineOptions::new().guard("canRetry", |ctx: &Retry, _| ctx.attempts < 3);
    let machine = StateMachineBuilder::new()
        .initial(Fetch::Idle)
        .context(Retry::default())
        .state(
            Fetch::Idle,
            StateDefinition::new().on("FETCH", Transition::to(Fetch::Loading)),
        )
        .state(
            Fetch::Loading,
            StateDefinition::new().on(
                "ERROR",
                Transition::to(Fetch::Failed).assign(|ctx: &Retry, _| Retry {
                    attempts: ctx.attempts + 1,
                }),
            ),
        )
        .state(
            Fetch::Failed,
            StateDefinition::new().on("RETRY", Transition::to(Fetch::Loading).guard("canRetry")),
        )
        .options(options)
        .build()
        .unwrap();

    machine.send("FETCH");
    for _ in 0..3 {
        machine.send("ERROR");
        machine.send("RETRY");
    }

    assert!(machine.matches(&Fetch::Failed));
    assert_eq!(machine.context().attempts, 3);
    assert!(!machine.can("RETRY"));
    assert!(machine.next_events().is_empty());

    machine.send("RETRY");
    assert!(machine.matches(&Fetch::Failed));
}

#[test]
fn increment_three_times_then_undo_twice() {
    let machine = counter(MachineOptions::new().with_history());
    for _ in 0..3 {
        machine.send("INCREMENT");
    }
    assert_eq!(machine.context().count, 3);

    assert!(machine.undo());
    assert!(machine.undo());
    assert_eq!(machine.context().count, 1);
    assert!(machine.can_redo());
}

#[test]
fn undo_and_redo_publish_synthetic_triggers() {
    let machine = counter(MachineOptions::new().with_history());
    let triggers = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&triggers);
    machine.subscribe(move |snapshot| {
        sink.lock()
            .unwrap()
            .push((snapshot.event.label(), snapshot.context.count, snapshot.changed));
        Ok(())
    });

    machine.send("INCREMENT");
    machine.undo();
    machine.redo();
    assert!(!machine.redo());

    assert_eq!(
        *triggers.lock().unwrap(),
        vec![
            ("INIT", 0, false),
            ("EVENT", 1, true),
            ("UNDO", 0, true),
            ("REDO", 1, true)
        ]
    );
}

#[test]
fn new_event_after_undo_discards_redo_tail() {
    let machine = counter(MachineOptions::new().with_history());
    machine.send("INCREMENT");
    machine.send("INCREMENT");
    machine.undo();
    assert!(machine.can_redo());

    machine.send("INCREMENT");
    assert!(!machine.can_redo());
    assert_eq!(machine.context().count, 2);
}

#[test]
fn undo_without_history_does_nothing() {
    let machine = counter(MachineOptions::new());
    machine.send("INCREMENT");
    assert!(!machine.undo());
    assert!(!machine.can_undo());
    assert!(machine.history().is_none());
    assert_eq!(machine.context().count, 1);
}

#[test]
fn cancelled_delayed_event_never_transitions() {
    let scheduler = ManualScheduler::new();
    let machine = switch(
        MachineOptions::new()
            .timers(true)
            .scheduler(Arc::new(scheduler.clone())),
    );
    let transitions = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&transitions);
    machine.subscribe(move |snapshot| {
        if matches!(snapshot.event, Trigger::Event(_)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    let id = machine
        .send_delayed("TOGGLE", Duration::from_millis(100))
        .unwrap();
    assert!(machine.cancel_delayed(&id));
    scheduler.advance(Duration::from_millis(100));

    assert_eq!(transitions.load(Ordering::SeqCst), 0);
    assert!(machine.matches(&Switch::Off));
    assert!(!machine.cancel_delayed(&id));
}

#[test]
fn repeating_timer_drives_the_machine_until_cleared() {
    let scheduler = ManualScheduler::new();
    let machine = switch(
        MachineOptions::new()
            .timers(true)
            .scheduler(Arc::new(scheduler.clone())),
    );
    let handle = machine.clone();
    machine.start_timer(TimerConfig::every("blink", Duration::from_millis(10)), move || {
        handle.send("TOGGLE")
    });

    scheduler.advance(Duration::from_millis(30));
    assert!(machine.matches(&Switch::On));

    assert!(machine.clear_timer("blink"));
    scheduler.advance(Duration::from_millis(30));
    assert!(machine.matches(&Switch::On));
    machine.destroy();
}

#[test]
fn reentrant_send_from_action_is_dropped() {
    let (options, errors) = collect_errors(MachineOptions::new());
    let slot: Arc<Mutex<Option<StateMachine<Switch, &'static str, u32>>>> =
        Arc::new(Mutex::new(None));
    let inner = Arc::clone(&slot);

    let machine = StateMachineBuilder::new()
        .initial(Switch::Off)
        .context(0u32)
        .state(
            Switch::Off,
            StateDefinition::new().on(
                "TOGGLE",
                Transition::to(Switch::On).action(Action::new(move |n: &u32, _: &Event<&'static str>| {
                    let machine = inner.lock().unwrap().clone();
                    if let Some(machine) = machine {
                        machine.send("TOGGLE");
                    }
                    Ok(Some(n + 1))
                })),
            ),
        )
        .state(
            Switch::On,
            StateDefinition::new().on("TOGGLE", Transition::to(Switch::Off)),
        )
        .options(options)
        .build()
        .unwrap();
    *slot.lock().unwrap() = Some(machine.clone());

    machine.send("TOGGLE");

    assert!(machine.matches(&Switch::On));
    assert_eq!(machine.context(), 1);
    assert_eq!(
        *errors.lock().unwrap(),
        vec![MachineError::ReentrantSend {
            event: "\"TOGGLE\"".to_string()
        }]
    );

    // The guard is released afterwards.
    machine.send("TOGGLE");
    assert!(machine.matches(&Switch::Off));
    machine.destroy();
}

#[test]
fn failing_action_rolls_back_state_and_context() {
    let (options, errors) = collect_errors(MachineOptions::new().with_history());
    let machine = StateMachineBuilder::new()
        .initial(Switch::Off)
        .context(0u32)
        .state(
            Switch::Off,
            StateDefinition::new().on(
                "TOGGLE",
                Transition::to(Switch::On)
                    .assign(|n: &u32, _| n + 10)
                    .action(Action::new(|_: &u32, _: &Event<&'static str>| {
                        Err(HandlerError::new("refused"))
                    })),
            ),
        )
        .state(Switch::On, StateDefinition::new())
        .options(options)
        .build()
        .unwrap();
    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notifications);
    machine.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    machine.send("TOGGLE");

    assert!(machine.matches(&Switch::Off));
    assert_eq!(machine.context(), 0);
    assert!(!machine.can_undo());
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(matches!(
        errors.lock().unwrap().as_slice(),
        [MachineError::ActionFailed { source, .. }] if source.message() == "refused"
    ));
}

#[test]
fn entry_and_exit_actions_run_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let record = |label: &'static str| {
        let log = Arc::clone(&log);
        Action::effect(move |_: &u32, _: &Event<&'static str>| log.lock().unwrap().push(label))
    };
    let machine = StateMachineBuilder::new()
        .initial(Switch::Off)
        .context(0u32)
        .state(
            Switch::Off,
            StateDefinition::new()
                .exit(record("exit off"))
                .on("TOGGLE", Transition::to(Switch::On).action(record("toggle"))),
        )
        .state(Switch::On, StateDefinition::new().entry(record("enter on")))
        .build()
        .unwrap();

    machine.send("TOGGLE");
    assert_eq!(*log.lock().unwrap(), vec!["exit off", "toggle", "enter on"]);
}

#[test]
fn listener_failure_is_isolated() {
    let (options, errors) = collect_errors(MachineOptions::new());
    let machine = switch(options);
    let delivered = Arc::new(AtomicUsize::new(0));

    let failing = machine.subscribe(|snapshot| {
        if snapshot.changed {
            Err(HandlerError::new("listener broke"))
        } else {
            Ok(())
        }
    });
    let seen = Arc::clone(&delivered);
    machine.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    machine.send("TOGGLE");
    assert!(machine.matches(&Switch::On));
    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert!(matches!(
        errors.lock().unwrap().as_slice(),
        [MachineError::ListenerFailed { .. }]
    ));

    assert!(failing.unsubscribe());
    machine.send("TOGGLE");
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert_eq!(machine.listener_count(), 1);
}

#[test]
fn unchanged_transitions_are_not_persisted() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new());
    let machine = counter(
        MachineOptions::new()
            .persistence(PersistenceOptions::new("counter", adapter.clone()))
            .scheduler(Arc::new(scheduler.clone())),
    );
    scheduler.run_pending();

    machine.send("UNKNOWN");
    scheduler.run_pending();
    assert_eq!(adapter.save_count(), 0);

    machine.send("INCREMENT");
    // The write happens on the scheduler, not inside `send`.
    assert_eq!(adapter.save_count(), 0);
    scheduler.run_pending();
    assert_eq!(adapter.save_count(), 1);
    let saved = adapter.get("counter").unwrap();
    assert_eq!(saved["value"], json!("active"));
    assert_eq!(saved["context"], json!({ "count": 1 }));
    assert!(saved["timestamp"].is_i64());
}

#[test]
fn throttled_persistence_saves_last_snapshot_once() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new());
    let machine = counter(
        MachineOptions::new()
            .persistence(
                PersistenceOptions::new("counter", adapter.clone())
                    .throttle(Duration::from_millis(200)),
            )
            .scheduler(Arc::new(scheduler.clone())),
    );

    for _ in 0..5 {
        machine.send("INCREMENT");
        scheduler.advance(Duration::from_millis(20));
    }
    assert_eq!(adapter.save_count(), 0);

    scheduler.advance(Duration::from_millis(200));
    assert_eq!(adapter.save_count(), 1);
    let saved: SerializedState<String, Counter> =
        SerializedState::from_value(adapter.get("counter").unwrap()).unwrap();
    assert_eq!(saved.context, Counter { count: 5 });
}

#[test]
fn hydration_restores_persisted_snapshot() {
    let scheduler = ManualScheduler::new();
    let stored = SerializedState::capture("done".to_string(), Counter { count: 7 });
    let adapter = Arc::new(MemoryAdapter::new().with_entry("counter", stored.to_value().unwrap()));
    let machine = counter(
        MachineOptions::new()
            .with_history()
            .persistence(PersistenceOptions::new("counter", adapter))
            .scheduler(Arc::new(scheduler.clone())),
    );

    // Loading is deferred to the scheduler.
    assert!(machine.matches(&"active".to_string()));
    let hydrated = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&hydrated);
    machine.subscribe(move |snapshot| {
        *sink.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    });

    scheduler.run_pending();
    assert!(machine.matches(&"done".to_string()));
    assert_eq!(machine.context(), Counter { count: 7 });
    assert!(!machine.can_undo());
    let last = hydrated.lock().unwrap().clone().unwrap();
    assert_eq!(last.value, "done");
    assert!(last.changed);
}

#[test]
fn hydration_rejects_undeclared_state() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new().with_entry(
        "counter",
        json!({ "value": "vanished", "context": { "count": 3 }, "timestamp": 0 }),
    ));
    let (options, errors) = collect_errors(
        MachineOptions::new()
            .persistence(PersistenceOptions::new("counter", adapter))
            .scheduler(Arc::new(scheduler.clone())),
    );
    let machine = counter(options);

    scheduler.run_pending();
    assert!(machine.matches(&"active".to_string()));
    assert_eq!(machine.context().count, 0);
    assert!(matches!(
        errors.lock().unwrap().as_slice(),
        [MachineError::PersistenceFailed(_)]
    ));
}

#[test]
fn load_landing_mid_transition_is_applied_after_it() {
    let scheduler = ManualScheduler::new();
    let stored = SerializedState::capture("done".to_string(), Counter { count: 42 });
    let adapter = Arc::new(MemoryAdapter::new().with_entry("counter", stored.to_value().unwrap()));
    let pump = scheduler.clone();
    let seen_in_action = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen_in_action);
    let machine: StateMachine<String, &'static str, Counter> = StateMachineBuilder::new()
        .initial("active".to_string())
        .context(Counter::default())
        .state(
            "active".to_string(),
            StateDefinition::new().on(
                "INCREMENT",
                Transition::internal().assign(move |c: &Counter, _| {
                    // Host code pumping the scheduler runs the queued load here.
                    pump.run_pending();
                    record.lock().unwrap().push(c.count);
                    Counter { count: c.count + 1 }
                }),
            ),
        )
        .state("done".to_string(), StateDefinition::new())
        .options(
            MachineOptions::new()
                .with_history()
                .persistence(PersistenceOptions::new("counter", adapter))
                .scheduler(Arc::new(scheduler.clone())),
        )
        .build()
        .unwrap();
    let notified = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notified);
    machine.subscribe(move |snapshot| {
        sink.lock().unwrap().push((snapshot.value.clone(), snapshot.context.count));
        Ok(())
    });

    machine.send("INCREMENT");

    assert_eq!(*seen_in_action.lock().unwrap(), vec![0]);
    assert!(machine.matches(&"done".to_string()));
    assert_eq!(machine.context(), Counter { count: 42 });
    let history = machine.history().unwrap();
    assert_eq!(history.len(), 1);
    assert!(!machine.can_undo());
    assert_eq!(
        *notified.lock().unwrap(),
        vec![
            ("active".to_string(), 0),
            ("active".to_string(), 1),
            ("done".to_string(), 42),
        ]
    );
}

#[test]
fn events_after_hydration_build_on_the_loaded_snapshot() {
    let scheduler = ManualScheduler::new();
    let stored = SerializedState::capture("active".to_string(), Counter { count: 10 });
    let adapter = Arc::new(MemoryAdapter::new().with_entry("counter", stored.to_value().unwrap()));
    let machine = counter(
        MachineOptions::new()
            .with_history()
            .persistence(PersistenceOptions::new("counter", adapter))
            .scheduler(Arc::new(scheduler.clone())),
    );
    scheduler.run_pending();

    machine.send("INCREMENT");
    assert_eq!(machine.context().count, 11);
    assert!(machine.undo());
    assert_eq!(machine.context().count, 10);
    assert!(!machine.can_undo());
}

struct UnreadableStore;

impl PersistenceAdapter for UnreadableStore {
    fn save(&self, _: &str, _: serde_json::Value) -> Result<(), PersistenceError> {
        Ok(())
    }
    fn load(&self, _: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
        Err(PersistenceError::AdapterFailed("storage unavailable".into()))
    }
    fn remove(&self, _: &str) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[test]
fn failed_load_keeps_initial_state_and_reports() {
    let scheduler = ManualScheduler::new();
    let (options, errors) = collect_errors(
        MachineOptions::new()
            .with_history()
            .persistence(PersistenceOptions::new("counter", Arc::new(UnreadableStore)))
            .scheduler(Arc::new(scheduler.clone())),
    );
    let machine = counter(options);
    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notifications);
    machine.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    scheduler.run_pending();
    assert!(machine.matches(&"active".to_string()));
    assert_eq!(machine.context(), Counter::default());
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(matches!(
        errors.lock().unwrap().as_slice(),
        [MachineError::PersistenceFailed(PersistenceError::AdapterFailed(_))]
    ));

    machine.send("INCREMENT");
    assert_eq!(machine.context().count, 1);
}

#[test]
fn clear_persisted_removes_stored_snapshot() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new());
    let machine = counter(
        MachineOptions::new()
            .persistence(PersistenceOptions::new("counter", adapter.clone()))
            .scheduler(Arc::new(scheduler.clone())),
    );
    machine.send("INCREMENT");
    scheduler.run_pending();
    assert!(adapter.get("counter").is_some());

    machine.clear_persisted();
    assert!(adapter.get("counter").is_none());
}

#[test]
fn undo_is_persisted() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new());
    let machine = counter(
        MachineOptions::new()
            .with_history()
            .persistence(PersistenceOptions::new("counter", adapter.clone()))
            .scheduler(Arc::new(scheduler.clone())),
    );
    machine.send("INCREMENT");
    machine.send("INCREMENT");
    machine.undo();
    scheduler.run_pending();

    assert_eq!(adapter.save_count(), 3);
    assert_eq!(adapter.get("counter").unwrap()["context"], json!({ "count": 1 }));
}

#[test]
fn destroy_cancels_scheduled_work() {
    let scheduler = ManualScheduler::new();
    let adapter = Arc::new(MemoryAdapter::new());
    let machine = counter(
        MachineOptions::new()
            .timers(true)
            .persistence(
                PersistenceOptions::new("counter", adapter.clone())
                    .throttle(Duration::from_millis(50)),
            )
            .scheduler(Arc::new(scheduler.clone())),
    );
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fired);
    machine.start_timer(TimerConfig::once("t", Duration::from_millis(10)), move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    machine.send_delayed("FINISH", Duration::from_millis(10));
    machine.send("INCREMENT");

    machine.destroy();
    scheduler.advance(Duration::from_millis(100));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.save_count(), 0);
    assert!(machine.matches(&"active".to_string()));
    assert!(machine.is_destroyed());
    assert_eq!(machine.send_delayed("FINISH", Duration::from_millis(1)), None);
}

#[test]
fn event_payload_reaches_actions() {
    #[derive(Deserialize)]
    struct Amount {
        by: i64,
    }

    let machine = StateMachineBuilder::new()
        .initial("active".to_string())
        .context(Counter::default())
        .state(
            "active".to_string(),
            StateDefinition::new().on(
                "ADD",
                Transition::internal().action(Action::new(
                    |c: &Counter, event: &Event<&'static str>| {
                        let amount = event
                            .payload_as::<Amount>()
                            .ok_or_else(|| HandlerError::new("missing amount"))?;
                        Ok(Some(Counter {
                            count: c.count + amount.by,
                        }))
                    },
                )),
            ),
        )
        .build()
        .unwrap();

    machine.send(Event::new("ADD").with_payload(json!({ "by": 5 })));
    assert_eq!(machine.context().count, 5);

    // Missing payload fails the action and leaves the context alone.
    machine.send("ADD");
    assert_eq!(machine.context().count, 5);
}
