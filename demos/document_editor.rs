//! Document Editor State Machine
//!
//! This example demonstrates the optional capabilities working together
//! on a tokio runtime.
//!
//! Key concepts:
//! - Named actions and guards registered in the options
//! - Undo/redo history
//! - Throttled persistence and hydration on the next run
//! - Autosave through a delayed event
//! - Forking a machine with `with_context`
//!
//! Run with: cargo run --example document_editor

use serde::{Deserialize, Serialize};
use serde_json::json;
use statekit::{
    state_enum, Event, MachineOptions, MemoryAdapter, PersistenceOptions, StateDefinition,
    StateMachine, StateMachineBuilder, TokioScheduler, Transition,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

state_enum! {
    enum Doc {
        Editing,
        Saving,
        Saved,
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Draft {
    text: String,
    revision: u32,
    author: String,
}

type Editor = StateMachine<Doc, &'static str, Draft>;

fn options(adapter: Arc<MemoryAdapter>, scheduler: TokioScheduler) -> MachineOptions<Draft, &'static str> {
    MachineOptions::new()
        .action("append", |draft: &Draft, event: &Event<&'static str>| {
            let text = event
                .payload_as::<String>()
                .ok_or("TYPE needs a string payload")?;
            Ok(Some(Draft {
                text: format!("{}{}", draft.text, text),
                revision: draft.revision + 1,
                ..draft.clone()
            }))
        })
        .guard("hasText", |draft: &Draft, _| !draft.text.is_empty())
        .with_history()
        .timers(true)
        .persistence(
            PersistenceOptions::new("draft", adapter).throttle(Duration::from_millis(50)),
        )
        .scheduler(Arc::new(scheduler))
        .on_diagnostic(|error| println!("  diagnostic: {error}"))
}

fn editor(adapter: Arc<MemoryAdapter>, scheduler: TokioScheduler) -> Editor {
    StateMachineBuilder::new()
        .initial(Doc::Editing)
        .context(Draft::default())
        .state(
            Doc::Editing,
            StateDefinition::new()
                .on("TYPE", Transition::internal().action("append"))
                .on("SAVE", Transition::to(Doc::Saving).guard("hasText"))
                .tags(["dirty"]),
        )
        .state(
            Doc::Saving,
            StateDefinition::new().on("DONE", Transition::to(Doc::Saved)),
        )
        .state(
            Doc::Saved,
            StateDefinition::new().on("TYPE", Transition::to(Doc::Editing).action("append")),
        )
        .options(options(adapter, scheduler))
        .build()
        .unwrap()
}

fn show(label: &str, machine: &Editor) {
    let snapshot = machine.snapshot();
    println!(
        "  {:<18} {:?} rev={} text={:?} dirty={}",
        label,
        snapshot.value,
        snapshot.context.revision,
        snapshot.context.text,
        snapshot.has_tag("dirty")
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== Document Editor State Machine ===\n");

    let adapter = Arc::new(MemoryAdapter::new());
    let scheduler = TokioScheduler::current().unwrap();
    let machine = editor(Arc::clone(&adapter), scheduler.clone());
    // Let the hydration task run before typing.
    tokio::time::sleep(Duration::from_millis(10)).await;

    println!("Editing:");
    show("start", &machine);
    println!("  can SAVE: {}", machine.can("SAVE"));
    for word in ["Hello", ", ", "world"] {
        machine.send(Event::new("TYPE").with_payload(json!(word)));
    }
    show("after typing", &machine);

    println!("\nHistory:");
    machine.undo();
    show("undo", &machine);
    machine.redo();
    show("redo", &machine);
    machine.send("TYPE");
    show("bad payload", &machine);

    println!("\nSaving (DONE arrives 100ms later):");
    machine.send("SAVE");
    machine.send_delayed("DONE", Duration::from_millis(100));
    show("saving", &machine);
    tokio::time::sleep(Duration::from_millis(200)).await;
    show("after delay", &machine);
    println!("  persisted saves: {}", adapter.save_count());

    println!("\nFork with a different author:");
    let fork = machine.with_context(json!({ "author": "grace" })).unwrap();
    println!("  fork author: {:?}", fork.context().author);
    println!("  original author: {:?}", machine.context().author);

    println!("\nNext session hydrates from the adapter:");
    machine.destroy();
    fork.destroy();
    let restored = editor(Arc::clone(&adapter), scheduler);
    show("before load", &restored);
    tokio::time::sleep(Duration::from_millis(10)).await;
    show("after load", &restored);

    restored.clear_persisted();
    restored.destroy();

    println!("\n=== Example Complete ===");
}
