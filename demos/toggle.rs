//! Toggle State Machine
//!
//! This example demonstrates the smallest useful machine.
//!
//! Key concepts:
//! - Declaring states with `state_enum!`
//! - Reacting to a bare event type
//! - Subscribing to snapshots
//! - Counting flips in the context with an assign action
//!
//! Run with: cargo run --example toggle

use statekit::{
    state_enum, Event, MachineOptions, State, StateDefinition, StateMachineBuilder, Transition,
};
use tracing_subscriber::EnvFilter;

state_enum! {
    enum Light {
        Off,
        On,
    }
}

fn flip(flips: &u32, _: &Event<&'static str>) -> u32 {
    flips + 1
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Toggle State Machine ===\n");

    let machine = StateMachineBuilder::new()
        .initial(Light::Off)
        .context(0u32)
        .state(
            Light::Off,
            StateDefinition::new()
                .on("TOGGLE", Transition::to(Light::On).assign(flip))
                .tags(["dark"]),
        )
        .state(
            Light::On,
            StateDefinition::new().on("TOGGLE", Transition::to(Light::Off).assign(flip)),
        )
        .options(MachineOptions::new().dev_tools(true))
        .build()
        .unwrap();

    let subscription = machine.subscribe(|snapshot| {
        println!(
            "  {:<4} changed={:<5} flips={}",
            snapshot.value.name(),
            snapshot.changed,
            snapshot.context
        );
        Ok(())
    });

    println!("\nToggling three times:");
    for _ in 0..3 {
        machine.send("TOGGLE");
    }

    println!("\nIgnored event (no transition declared):");
    machine.send("DIM");

    println!("\nFinal state: {:?}", machine.value());
    println!("Is dark: {}", machine.has_tag("dark"));
    println!("Next events: {:?}", machine.next_events());

    subscription.unsubscribe();
    machine.destroy();

    println!("\n=== Example Complete ===");
}
