//! End-to-end scenarios for the step engine.
//!
//! Each test builds a small chart, drives a machine through its public API
//! and checks the observable configuration, datamodel and diagnostics.

use chrono::{Duration, Utc};
use serde_json::json;
use stateflow::builder::{
    simple_transition, ChartBuilder, FinalBuilder, HistoryBuilder, ParallelBuilder,
    StateBuilder, TransitionBuilder,
};
use stateflow::core::CollectingReporter;
use stateflow::model::{Action, Data, Send};
use stateflow::{
    CheckpointError, EngineError, ErrorCode, Event, InterpreterConfig, StateMachine, Status,
    TimerDispatcher,
};
use std::sync::Arc;

fn running(chart: stateflow::StateChart) -> StateMachine {
    let mut machine = StateMachine::new(chart);
    machine.start().unwrap();
    machine
}

#[test]
fn reaching_a_top_level_final_ends_the_machine() {
    let chart = ChartBuilder::new("simple")
        .state(StateBuilder::new("a").transition(simple_transition("go", "b")))
        .final_state(FinalBuilder::new("b"))
        .build()
        .unwrap();
    let mut machine = running(chart);
    assert_eq!(machine.active_ids(), vec!["a"]);

    machine.trigger_event(Event::new("go")).unwrap();
    assert_eq!(machine.active_ids(), vec!["b"]);
    assert_eq!(machine.status(), Status::Final);

    machine.trigger_event(Event::new("go")).unwrap();
    machine.trigger_event(Event::new("anything")).unwrap();
    assert_eq!(machine.active_ids(), vec!["b"]);
}

#[test]
fn parallel_regions_move_in_one_macrostep() {
    let chart = ChartBuilder::new("regions")
        .parallel(
            ParallelBuilder::new("p")
                .region(
                    StateBuilder::new("r1")
                        .state(StateBuilder::new("x1").transition(simple_transition("e", "y1")))
                        .state(StateBuilder::new("y1")),
                )
                .region(
                    StateBuilder::new("r2")
                        .state(StateBuilder::new("x2").transition(simple_transition("e", "y2")))
                        .state(StateBuilder::new("y2")),
                ),
        )
        .build()
        .unwrap();
    let mut machine = running(chart);
    assert!(machine.is_in("x1") && machine.is_in("x2"));

    let before = machine.trace().records().len();
    machine.trigger_event(Event::new("e")).unwrap();
    assert_eq!(machine.active_ids(), vec!["p", "r1", "y1", "r2", "y2"]);

    let records = machine.trace().records();
    let step = records[before..]
        .iter()
        .find(|r| r.event.as_deref() == Some("e"))
        .unwrap();
    assert_eq!(step.exited, vec!["x2", "x1"]);
    assert_eq!(step.entered, vec!["y1", "y2"]);
}

#[test]
fn conflicting_region_transitions_are_both_suppressed() {
    let chart = ChartBuilder::new("conflict")
        .parallel(
            ParallelBuilder::new("p")
                .region(
                    StateBuilder::new("r1")
                        .state(StateBuilder::new("x1").transition(simple_transition("e", "left"))),
                )
                .region(
                    StateBuilder::new("r2")
                        .state(StateBuilder::new("x2").transition(simple_transition("e", "right"))),
                ),
        )
        .state(StateBuilder::new("left"))
        .state(StateBuilder::new("right"))
        .build()
        .unwrap();
    let reporter = Arc::new(CollectingReporter::new());
    let mut machine = StateMachine::new(chart).with_reporter(reporter.clone());
    machine.start().unwrap();

    machine.trigger_event(Event::new("e")).unwrap();
    assert_eq!(machine.active_ids(), vec!["p", "r1", "x1", "r2", "x2"]);
    assert!(reporter.contains(ErrorCode::IllegalConfig));
}

fn three_regions(outward: usize) -> stateflow::StateChart {
    let mut parallel = ParallelBuilder::new("p");
    for region in 0..3 {
        let from = format!("r{region}a");
        let to = if region == outward {
            "out".to_string()
        } else {
            format!("r{region}b")
        };
        parallel = parallel.region(
            StateBuilder::new(format!("r{region}"))
                .state(StateBuilder::new(from).transition(simple_transition("e", &to)))
                .state(StateBuilder::new(format!("r{region}b"))),
        );
    }
    ChartBuilder::new("regions")
        .parallel(parallel)
        .state(StateBuilder::new("out"))
        .build()
        .unwrap()
}

#[test]
fn conflict_outcome_is_independent_of_region_order() {
    for outward in [0, 2] {
        let reporter = Arc::new(CollectingReporter::new());
        let mut machine = StateMachine::new(three_regions(outward)).with_reporter(reporter.clone());
        machine.start().unwrap();

        machine.trigger_event(Event::new("e")).unwrap();
        assert_eq!(
            machine.active_ids(),
            vec!["p", "r0", "r0a", "r1", "r1a", "r2", "r2a"],
            "outward transition in r{outward}"
        );
        assert_eq!(reporter.count(ErrorCode::IllegalConfig), 2);
    }
}

fn nested_conflict(swap_inner: bool) -> stateflow::StateChart {
    let q1 = StateBuilder::new("q1")
        .state(StateBuilder::new("x").transition(simple_transition("e", "parked")));
    let q2 = StateBuilder::new("q2")
        .state(StateBuilder::new("y").transition(simple_transition("e", "y2")))
        .state(StateBuilder::new("y2"));
    let (first, second) = if swap_inner { (q2, q1) } else { (q1, q2) };
    ChartBuilder::new("nested")
        .parallel(
            ParallelBuilder::new("p")
                .region(
                    StateBuilder::new("left")
                        .parallel(ParallelBuilder::new("q").region(first).region(second))
                        .state(StateBuilder::new("parked")),
                )
                .region(
                    StateBuilder::new("right")
                        .state(StateBuilder::new("m").transition(simple_transition("e", "n")))
                        .state(StateBuilder::new("n")),
                ),
        )
        .build()
        .unwrap()
}

#[test]
fn non_conflicting_transitions_fire_beside_a_conflict() {
    for swap_inner in [false, true] {
        let reporter = Arc::new(CollectingReporter::new());
        let mut machine = StateMachine::new(nested_conflict(swap_inner)).with_reporter(reporter.clone());
        machine.start().unwrap();

        machine.trigger_event(Event::new("e")).unwrap();
        assert!(machine.is_in("x") && machine.is_in("y"));
        assert!(!machine.is_in("parked") && !machine.is_in("y2"));
        assert!(machine.is_in("n"));
        assert_eq!(reporter.count(ErrorCode::IllegalConfig), 1);
        assert!(machine.configuration().check_legal(machine.chart()).is_ok());
    }
}

#[test]
fn descendant_transition_wins_over_ancestor() {
    // The ancestor's transition is declared first in the document.
    let chart = ChartBuilder::new("priority")
        .state(
            StateBuilder::new("outer")
                .transition(simple_transition("e", "from_outer"))
                .state(StateBuilder::new("inner").transition(simple_transition("e", "from_inner"))),
        )
        .state(StateBuilder::new("from_outer"))
        .state(StateBuilder::new("from_inner"))
        .build()
        .unwrap();
    let mut machine = running(chart);
    machine.trigger_event(Event::new("e")).unwrap();
    assert_eq!(machine.active_ids(), vec!["from_inner"]);
}

#[test]
fn stable_configuration_is_idempotent_under_eventless_steps() {
    let chart = ChartBuilder::new("stable")
        .data(Data::new("entries", "0"))
        .data(Data::new("exits", "0"))
        .state(
            StateBuilder::new("idle")
                .on_entry(Action::assign("entries", "entries + 1"))
                .on_exit(Action::assign("exits", "exits + 1"))
                .transition(TransitionBuilder::new().when("entries > 5").to("busy")),
        )
        .state(StateBuilder::new("busy"))
        .build()
        .unwrap();
    let mut machine = running(chart);
    let configuration = machine.configuration().clone();

    for _ in 0..5 {
        machine.resume().unwrap();
        machine.trigger_event(Event::new("unrelated")).unwrap();
    }
    assert_eq!(machine.configuration(), &configuration);
    assert_eq!(machine.variable("entries"), Some(&json!(1)));
    assert_eq!(machine.variable("exits"), Some(&json!(0)));
}

fn history_chart(deep: bool) -> stateflow::StateChart {
    let history = if deep {
        HistoryBuilder::deep("h")
    } else {
        HistoryBuilder::shallow("h")
    };
    ChartBuilder::new("history")
        .state(
            StateBuilder::new("s")
                .history(history)
                .state(StateBuilder::new("c1").transition(simple_transition("next", "c2")))
                .state(
                    StateBuilder::new("c2")
                        .state(StateBuilder::new("c2a").transition(simple_transition("next", "c2b")))
                        .state(StateBuilder::new("c2b")),
                )
                .transition(simple_transition("leave", "away")),
        )
        .state(StateBuilder::new("away").transition(simple_transition("back", "h")))
        .build()
        .unwrap()
}

#[test]
fn shallow_history_reenters_the_remembered_child() {
    let mut machine = running(history_chart(false));
    machine
        .trigger_events(["next", "next", "leave"].map(Event::new))
        .unwrap();
    assert_eq!(machine.active_ids(), vec!["away"]);

    machine.trigger_event(Event::new("back")).unwrap();
    assert_eq!(machine.active_ids(), vec!["s", "c2", "c2a"]);
    assert_eq!(machine.history_value("h"), Some(vec!["c2".to_string()]));
}

#[test]
fn deep_history_reenters_the_full_chain() {
    let mut machine = running(history_chart(true));
    machine
        .trigger_events(["next", "next", "leave", "back"].map(Event::new))
        .unwrap();
    assert_eq!(machine.active_ids(), vec!["s", "c2", "c2b"]);
    assert_eq!(machine.history_value("h"), Some(vec!["c2b".to_string()]));
}

#[test]
fn zero_delay_send_is_seen_in_the_same_call() {
    let chart = ChartBuilder::new("send")
        .state(
            StateBuilder::new("a")
                .transition(
                    TransitionBuilder::on("kick").action(Action::send(Send::event("ping"))),
                )
                .transition(simple_transition("ping", "b")),
        )
        .state(StateBuilder::new("b"))
        .build()
        .unwrap();
    let mut machine = running(chart);
    machine.trigger_event(Event::new("kick")).unwrap();
    assert_eq!(machine.active_ids(), vec!["b"]);
}

fn timeout_chart() -> stateflow::StateChart {
    ChartBuilder::new("timeout")
        .state(
            StateBuilder::new("waiting")
                .on_entry(Action::send(
                    Send::event("timeout").with_id("t1").with_delay("1s"),
                ))
                .transition(TransitionBuilder::on("abort").action(Action::cancel("t1")))
                .transition(simple_transition("timeout", "expired")),
        )
        .state(StateBuilder::new("expired"))
        .build()
        .unwrap()
}

#[test]
fn delayed_send_fires_only_after_its_delay() {
    let timer = Arc::new(TimerDispatcher::new());
    let mut machine = StateMachine::new(timeout_chart()).with_dispatcher(timer.clone());
    machine.start().unwrap();
    assert!(timer.is_pending("t1"));

    assert_eq!(machine.poll(Utc::now()).unwrap(), 0);
    assert!(machine.is_in("waiting"));

    assert_eq!(machine.poll(Utc::now() + Duration::seconds(2)).unwrap(), 1);
    assert!(machine.is_in("expired"));
    assert_eq!(timer.pending(), 0);
}

#[test]
fn cancel_suppresses_a_pending_send() {
    let timer = Arc::new(TimerDispatcher::new());
    let mut machine = StateMachine::new(timeout_chart()).with_dispatcher(timer.clone());
    machine.start().unwrap();

    machine.trigger_event(Event::new("abort")).unwrap();
    assert!(!timer.is_pending("t1"));
    assert_eq!(machine.poll(Utc::now() + Duration::seconds(2)).unwrap(), 0);
    assert!(machine.is_in("waiting"));
}

#[test]
fn checkpoint_restores_into_a_fresh_machine() {
    let chart = Arc::new(
        ChartBuilder::new("counter")
            .data(Data::new("count", "0"))
            .state(
                StateBuilder::new("s")
                    .history(HistoryBuilder::shallow("h"))
                    .state(StateBuilder::new("low").transition(simple_transition("up", "high")))
                    .state(StateBuilder::new("high"))
                    .transition(
                        TransitionBuilder::on("bump").action(Action::assign("count", "count + 1")),
                    )
                    .transition(simple_transition("pause", "paused")),
            )
            .state(StateBuilder::new("paused").transition(simple_transition("resume", "h")))
            .build()
            .unwrap(),
    );
    let mut original = StateMachine::new(Arc::clone(&chart));
    original.start().unwrap();
    original
        .trigger_events(["bump", "up", "bump", "pause"].map(Event::new))
        .unwrap();

    let bytes = original.checkpoint().unwrap().to_bytes().unwrap();
    let checkpoint = stateflow::Checkpoint::from_bytes(&bytes).unwrap();

    let mut restored = StateMachine::new(chart);
    restored.restore(&checkpoint).unwrap();
    assert_eq!(restored.session_id(), original.session_id());
    assert_eq!(restored.active_ids(), vec!["paused"]);
    assert_eq!(restored.variable("count"), Some(&json!(2)));

    restored.trigger_event(Event::new("resume")).unwrap();
    assert_eq!(restored.active_ids(), vec!["s", "high"]);
}

#[test]
fn restoring_an_unknown_target_is_a_restore_error() {
    let chart = ChartBuilder::new("small")
        .state(StateBuilder::new("a"))
        .build()
        .unwrap();
    let mut machine = running(chart.clone());
    let mut checkpoint = machine.checkpoint().unwrap();
    checkpoint.configuration = vec!["gone".to_string()];

    let reporter = Arc::new(CollectingReporter::new());
    let mut fresh = StateMachine::new(chart).with_reporter(reporter.clone());
    let error = fresh.restore(&checkpoint).unwrap_err();
    assert!(error.is_restore_error());
    assert!(matches!(
        error,
        EngineError::Checkpoint(CheckpointError::UnknownTarget { ref label }) if label == "gone"
    ));
    assert!(reporter.contains(ErrorCode::RestoreError));

    machine.terminate();
    assert_eq!(machine.status(), Status::Terminated);
}

#[test]
fn checkpoint_from_another_chart_is_refused() {
    let door = ChartBuilder::new("door")
        .state(StateBuilder::new("a").transition(simple_transition("go", "b")))
        .state(StateBuilder::new("b"))
        .build()
        .unwrap();
    let mut source = running(door);
    source.trigger_event(Event::new("go")).unwrap();
    let checkpoint = source.checkpoint().unwrap();

    let lamp = ChartBuilder::new("lamp")
        .state(StateBuilder::new("a"))
        .state(StateBuilder::new("b"))
        .build()
        .unwrap();
    let mut other = running(lamp);
    let error = other.restore(&checkpoint).unwrap_err();
    assert!(matches!(
        error,
        EngineError::Checkpoint(CheckpointError::ChartMismatch { ref expected, ref found })
            if expected == "lamp" && found == "door"
    ));
    assert_eq!(other.active_ids(), vec!["a"]);
}

#[test]
fn single_microstep_mode_leaves_work_queued() {
    let chart = ChartBuilder::new("steps")
        .state(StateBuilder::new("a").transition(TransitionBuilder::new().to("b")))
        .state(StateBuilder::new("b").transition(TransitionBuilder::new().to("c")))
        .state(StateBuilder::new("c"))
        .build()
        .unwrap();
    let config = InterpreterConfig::default()
        .with_superstep(false)
        .with_change_events(false);
    let mut machine = StateMachine::new(chart).with_config(config);
    machine.start().unwrap();
    assert!(machine.is_in("b"));

    machine.resume().unwrap();
    assert!(machine.is_in("c"));
    assert!(!machine.has_pending_work());
}
