//! Delayed Sends
//!
//! This example demonstrates timers driven from an async host.
//!
//! Key concepts:
//! - `send` with a delay schedules an event in the dispatcher
//! - `cancel` withdraws a pending send by id
//! - The host polls the machine when the next timer is due
//!
//! Run with: cargo run --example delayed_send

use chrono::Utc;
use stateflow::builder::{
    simple_transition, ChartBuilder, FinalBuilder, StateBuilder, TransitionBuilder,
};
use stateflow::model::{Action, Data, Send};
use stateflow::{Event, StateMachine, TimerDispatcher};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    println!("=== Delayed Sends ===\n");

    let chart = ChartBuilder::new("kettle")
        .data(Data::new("ticks", "0"))
        .state(
            StateBuilder::new("heating")
                .on_entry(Action::send(
                    Send::event("boiled").with_id("boil").with_delay("300ms"),
                ))
                .on_entry(Action::send(
                    Send::event("whistle").with_id("whistle").with_delay("200ms"),
                ))
                .on_entry(Action::send(Send::event("tick").with_delay("100ms")))
                .transition(
                    TransitionBuilder::on("tick")
                        .action(Action::assign("ticks", "ticks + 1"))
                        .action(Action::send(Send::event("tick").with_delay("100ms"))),
                )
                .transition(TransitionBuilder::on("mute").action(Action::cancel("whistle")))
                .transition(simple_transition("whistle", "whistling"))
                .transition(simple_transition("boiled", "done")),
        )
        .state(StateBuilder::new("whistling"))
        .final_state(FinalBuilder::new("done"))
        .build()
        .unwrap();

    let timer = Arc::new(TimerDispatcher::new());
    let mut machine = StateMachine::new(chart).with_dispatcher(timer.clone());
    machine.start().unwrap();
    println!("Pending sends after start: {}", timer.pending());

    machine.trigger_event(Event::new("mute")).unwrap();
    println!("Muted; whistle still pending: {}\n", timer.is_pending("whistle"));

    while machine.is_running() {
        let Some(due) = timer.next_fire_time() else {
            break;
        };
        let wait = (due - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let delivered = machine.poll(Utc::now()).unwrap();
        println!(
            "delivered {delivered} event(s), ticks = {}, now {:?}",
            machine.variable("ticks").cloned().unwrap_or_default(),
            machine.active_ids()
        );
    }

    println!("\nFinal: {}", machine.is_final());
    println!("\n=== Example Complete ===");
}
