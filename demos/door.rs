//! Door State Chart
//!
//! This example demonstrates a compound chart with a datamodel.
//!
//! Key concepts:
//! - Compound states with default initial children
//! - Guarded transitions reading the datamodel
//! - Shallow history restoring the last sub-state
//! - Listeners observing entry, exit and transitions
//!
//! Run with: cargo run --example door

use stateflow::builder::{
    guarded_transition, simple_transition, ChartBuilder, HistoryBuilder, StateBuilder,
};
use stateflow::model::{Action, Data, Transition, TransitionTarget};
use stateflow::{Event, StateChartListener, StateMachine};
use std::sync::Arc;

struct Printer;

impl StateChartListener for Printer {
    fn on_entry(&self, target: &TransitionTarget) {
        println!("    enter {}", target.label());
    }

    fn on_exit(&self, target: &TransitionTarget) {
        println!("    exit  {}", target.label());
    }

    fn on_transition(
        &self,
        source: &TransitionTarget,
        _targets: &[&TransitionTarget],
        transition: &Transition,
    ) {
        println!(
            "    {} on {}",
            source.label(),
            transition.event().unwrap_or("<eventless>")
        );
    }
}

fn main() {
    println!("=== Door State Chart ===\n");

    let chart = ChartBuilder::new("door")
        .data(Data::new("code", "1234"))
        .data(Data::new("attempts", "0"))
        .state(
            StateBuilder::new("shut")
                .history(HistoryBuilder::shallow("shut_history"))
                .state(StateBuilder::new("closed").transition(simple_transition("lock", "locked")))
                .state(
                    StateBuilder::new("locked")
                        .transition(guarded_transition("unlock", "_event.data == code", "closed"))
                        .transition(
                            simple_transition("unlock", "locked")
                                .action(Action::assign("attempts", "attempts + 1")),
                        ),
                )
                .transition(guarded_transition("open", "In('closed')", "opened")),
        )
        .state(
            StateBuilder::new("opened")
                .transition(simple_transition("close", "shut_history")),
        )
        .build()
        .unwrap();

    let mut machine = StateMachine::new(chart);
    machine.add_listener(Arc::new(Printer));
    machine.start().unwrap();
    println!("Started in {:?}\n", machine.active_ids());

    let events = [
        Event::new("open"),
        Event::new("close"),
        Event::new("lock"),
        Event::new("open"),
        Event::new("unlock").with_data(serde_json::json!(1111)),
        Event::new("unlock").with_data(serde_json::json!(1234)),
        Event::new("open"),
    ];
    for event in events {
        println!("-> {}", event.name());
        machine.trigger_event(event).unwrap();
        println!("   now {:?}\n", machine.active_ids());
    }

    println!(
        "Failed unlock attempts before success: {}",
        machine.variable("attempts").cloned().unwrap_or_default()
    );
    println!("\n=== Example Complete ===");
}
