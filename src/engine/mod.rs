//! The step engine.
//!
//! A [`StateMachine`] runs a validated [`StateChart`](crate::model::StateChart):
//!
//! - a **microstep** applies one set of conflict-free transitions: exit,
//!   transition content, entry
//! - a **macrostep** repeats microsteps, eventless transitions first and
//!   internal events next, until the configuration is stable
//! - external events, delayed sends and invoker traffic are only looked at
//!   between macrosteps
//!
//! The pure parts (selection, conflict resolution, entry and exit sets)
//! live in [`step`]; the machine owns all mutable run state.

mod configuration;
mod error;
mod invoke;
mod listener;
mod machine;
pub mod step;

pub use configuration::Configuration;
pub use error::EngineError;
pub use invoke::{Invoker, InvokerError, InvokerFactory};
pub use listener::StateChartListener;
pub use machine::{StateMachine, Status};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{
        eventless_transition, simple_transition, ChartBuilder, FinalBuilder, HistoryBuilder,
        ParallelBuilder, StateBuilder, TransitionBuilder,
    };
    use crate::config::InterpreterConfig;
    use crate::core::{CollectingReporter, ErrorCode, Event};
    use crate::model::{Action, Data, Invoke, Param, Send};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn started(machine: StateMachine) -> StateMachine {
        let mut machine = machine;
        machine.start().unwrap();
        machine
    }

    fn with_reporter(chart: crate::model::StateChart) -> (StateMachine, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        let machine = StateMachine::new(chart).with_reporter(reporter.clone());
        (started(machine), reporter)
    }

    #[test]
    fn events_before_start_are_rejected() {
        let chart = ChartBuilder::new("c").state(StateBuilder::new("a")).build().unwrap();
        let mut machine = StateMachine::new(chart);
        assert!(matches!(
            machine.trigger_event(Event::new("x")),
            Err(EngineError::NotStarted)
        ));
        machine.start().unwrap();
        assert!(matches!(machine.start(), Err(EngineError::AlreadyStarted)));
    }

    #[test]
    fn entry_runs_default_initial_content() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("log", "[]"))
            .state(
                StateBuilder::new("s")
                    .initial("s2")
                    .initial_action(Action::assign("log", "log + ['initial']"))
                    .on_entry(Action::assign("log", "log + ['s']"))
                    .state(StateBuilder::new("s1"))
                    .state(StateBuilder::new("s2").on_entry(Action::assign("log", "log + ['s2']"))),
            )
            .build()
            .unwrap();
        let machine = started(StateMachine::new(chart));
        assert_eq!(machine.active_ids(), vec!["s", "s2"]);
        assert_eq!(machine.variable("log"), Some(&json!(["s", "initial", "s2"])));
    }

    #[test]
    fn exits_run_deepest_first() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("log", "[]"))
            .state(
                StateBuilder::new("outer")
                    .on_exit(Action::assign("log", "log + ['outer']"))
                    .state(StateBuilder::new("inner").on_exit(Action::assign("log", "log + ['inner']")))
                    .transition(simple_transition("go", "next").action(Action::assign("log", "log + ['t']"))),
            )
            .state(StateBuilder::new("next"))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("go")).unwrap();
        assert_eq!(machine.variable("log"), Some(&json!(["inner", "outer", "t"])));
        let record = machine.trace().last().unwrap();
        assert_eq!(record.exited, vec!["inner", "outer"]);
        assert_eq!(record.entered, vec!["next"]);
    }

    #[test]
    fn eventless_transitions_run_before_internal_events() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("n", "0"))
            .state(
                StateBuilder::new("a")
                    .on_entry(Action::raise("ping"))
                    .transition(eventless_transition("n == 0", "b")),
            )
            .state(StateBuilder::new("b").transition(simple_transition("ping", "c")))
            .state(StateBuilder::new("c"))
            .build()
            .unwrap();
        let machine = started(StateMachine::new(chart));
        assert_eq!(machine.active_ids(), vec!["c"]);
    }

    #[test]
    fn self_transition_reenters_source() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("entries", "0"))
            .state(
                StateBuilder::new("a")
                    .on_entry(Action::assign("entries", "entries + 1"))
                    .transition(simple_transition("again", "a")),
            )
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("again")).unwrap();
        assert_eq!(machine.variable("entries"), Some(&json!(2)));
    }

    #[test]
    fn internal_transition_keeps_source_active() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("exits", "0"))
            .state(
                StateBuilder::new("s")
                    .on_exit(Action::assign("exits", "exits + 1"))
                    .state(StateBuilder::new("s1"))
                    .state(StateBuilder::new("s2"))
                    .transition(simple_transition("go", "s2").internal()),
            )
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("go")).unwrap();
        assert_eq!(machine.active_ids(), vec!["s", "s2"]);
        assert_eq!(machine.variable("exits"), Some(&json!(0)));
    }

    #[test]
    fn stay_transition_runs_content_only() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("hits", "0"))
            .state(
                StateBuilder::new("a")
                    .on_exit(Action::assign("hits", "hits + 100"))
                    .transition(TransitionBuilder::on("tick").action(Action::assign("hits", "hits + 1"))),
            )
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_events([Event::new("tick"), Event::new("tick")]).unwrap();
        assert_eq!(machine.variable("hits"), Some(&json!(2)));
        assert!(machine.is_in("a"));
    }

    #[test]
    fn compound_done_event_carries_done_data() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("result", "null"))
            .state(
                StateBuilder::new("job")
                    .state(StateBuilder::new("working").transition(simple_transition("finish", "finished")))
                    .final_state(FinalBuilder::new("finished").done_param(Param::expr("code", "7")))
                    .transition(
                        simple_transition("job.done", "idle")
                            .action(Action::assign("result", "_event.data.code")),
                    ),
            )
            .state(StateBuilder::new("idle"))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("finish")).unwrap();
        assert!(machine.is_in("idle"));
        assert_eq!(machine.variable("result"), Some(&json!(7)));
    }

    #[test]
    fn parallel_done_fires_when_all_regions_finish() {
        let chart = ChartBuilder::new("c")
            .parallel(
                ParallelBuilder::new("p")
                    .region(
                        StateBuilder::new("r1")
                            .state(StateBuilder::new("a").transition(simple_transition("x", "a_end")))
                            .final_state(FinalBuilder::new("a_end")),
                    )
                    .region(
                        StateBuilder::new("r2")
                            .state(StateBuilder::new("b").transition(simple_transition("y", "b_end")))
                            .final_state(FinalBuilder::new("b_end")),
                    )
                    .transition(simple_transition("p.done", "after")),
            )
            .state(StateBuilder::new("after"))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("x")).unwrap();
        assert!(machine.is_in("p"));
        machine.trigger_event(Event::new("y")).unwrap();
        assert_eq!(machine.active_ids(), vec!["after"]);
    }

    #[test]
    fn top_level_final_stops_the_machine() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").transition(simple_transition("end", "z")))
            .final_state(FinalBuilder::new("z"))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("end")).unwrap();
        assert!(machine.is_final());
        assert_eq!(machine.active_ids(), vec!["z"]);
        machine.trigger_event(Event::new("end")).unwrap();
        assert_eq!(machine.status(), Status::Final);
    }

    #[test]
    fn deep_history_restores_nested_configuration() {
        let chart = ChartBuilder::new("c")
            .state(
                StateBuilder::new("s")
                    .history(HistoryBuilder::deep("h"))
                    .state(
                        StateBuilder::new("s1")
                            .state(StateBuilder::new("s11").transition(simple_transition("next", "s12")))
                            .state(StateBuilder::new("s12")),
                    )
                    .state(StateBuilder::new("s2"))
                    .transition(simple_transition("leave", "away")),
            )
            .state(StateBuilder::new("away").transition(simple_transition("back", "h")))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine
            .trigger_events([Event::new("next"), Event::new("leave"), Event::new("back")])
            .unwrap();
        assert_eq!(machine.active_ids(), vec!["s", "s1", "s12"]);
        assert_eq!(machine.history_value("h"), Some(vec!["s12".to_string()]));
    }

    #[test]
    fn runaway_eventless_loop_hits_the_limit() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").transition(TransitionBuilder::new().to("b")))
            .state(StateBuilder::new("b").transition(TransitionBuilder::new().to("a")))
            .build()
            .unwrap();
        let reporter = Arc::new(CollectingReporter::new());
        let mut machine = StateMachine::new(chart)
            .with_reporter(reporter.clone())
            .with_config(InterpreterConfig::default().with_max_microsteps(10).with_trace_limit(0));
        machine.start().unwrap();
        assert!(reporter.contains(ErrorCode::MicrostepLimit));
        assert!(machine.trace().records().is_empty());
    }

    #[test]
    fn single_microstep_mode_leaves_work_queued() {
        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").transition(simple_transition("go", "b")))
            .state(StateBuilder::new("b").on_entry(Action::raise("more")).transition(simple_transition("more", "c")))
            .state(StateBuilder::new("c"))
            .build()
            .unwrap();
        let mut machine = StateMachine::new(chart)
            .with_config(InterpreterConfig::default().with_superstep(false).with_change_events(false));
        machine.start().unwrap();
        machine.trigger_event(Event::new("go")).unwrap();
        assert!(machine.is_in("b"));
        assert!(machine.has_pending_work());
        machine.resume().unwrap();
        assert!(machine.is_in("c"));
    }

    #[test]
    fn guard_errors_are_reported_and_treated_as_false() {
        let chart = ChartBuilder::new("c")
            .state(
                StateBuilder::new("a")
                    .transition(simple_transition("go", "b").when("missing > 1"))
                    .transition(simple_transition("go", "c")),
            )
            .state(StateBuilder::new("b"))
            .state(StateBuilder::new("c"))
            .build()
            .unwrap();
        let (mut machine, reporter) = with_reporter(chart);
        machine.trigger_event(Event::new("go")).unwrap();
        assert!(machine.is_in("c"));
        assert!(reporter.contains(ErrorCode::ExpressionError));
    }

    #[test]
    fn change_events_can_be_observed() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("count", "0"))
            .state(
                StateBuilder::new("a")
                    .transition(TransitionBuilder::on("bump").action(Action::assign("count", "count + 1")))
                    .transition(simple_transition("count.change", "changed")),
            )
            .state(StateBuilder::new("changed"))
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.trigger_event(Event::new("bump")).unwrap();
        assert!(machine.is_in("changed"));
    }

    #[test]
    fn zero_delay_send_to_parent_lands_in_outbox() {
        let chart = ChartBuilder::new("c")
            .state(
                StateBuilder::new("a").on_entry(Action::send(
                    Send::event("hello").with_target("#_parent").with_param(Param::expr("n", "1")),
                )),
            )
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        let outbound = machine.take_outbound();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].name(), "hello");
        assert_eq!(outbound[0].data(), Some(&json!({ "n": 1 })));
        assert!(machine.take_outbound().is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    struct EchoInvoker {
        log: Arc<Recorder>,
    }

    impl Invoker for EchoInvoker {
        fn start(&mut self, invoke_id: &str, source: &str, params: &Value) -> Result<(), InvokerError> {
            self.log.log.lock().unwrap().push(format!("start {invoke_id} {source} {params}"));
            Ok(())
        }

        fn deliver_parent_event(&mut self, event: &Event) -> Result<(), InvokerError> {
            self.log.log.lock().unwrap().push(format!("event {}", event.name()));
            Ok(())
        }

        fn cancel(&mut self) {
            self.log.log.lock().unwrap().push("cancel".to_string());
        }
    }

    fn invoking_chart() -> crate::model::StateChart {
        ChartBuilder::new("c")
            .data(Data::new("answer", "null"))
            .state(
                StateBuilder::new("busy")
                    .invoke(
                        Invoke::new("echo")
                            .with_id("worker")
                            .with_src("job://1")
                            .with_param(Param::expr("n", "2"))
                            .with_finalize(Action::assign("answer", "_event.data"))
                            .autoforward(true),
                    )
                    .transition(simple_transition("worker.reply", "idle")),
            )
            .state(StateBuilder::new("idle"))
            .build()
            .unwrap()
    }

    #[test]
    fn invokers_start_forward_finalize_and_cancel() {
        let recorder = Arc::new(Recorder::default());
        let mut machine = StateMachine::new(invoking_chart());
        let log = recorder.clone();
        machine.register_invoker("echo", move || {
            Box::new(EchoInvoker { log: log.clone() }) as Box<dyn Invoker>
        });
        machine.start().unwrap();

        machine.trigger_event(Event::new("ping")).unwrap();
        machine
            .trigger_event(Event::new("worker.reply").with_invoke_id("worker").with_data(json!(42)))
            .unwrap();

        assert!(machine.is_in("idle"));
        assert_eq!(machine.variable("answer"), Some(&json!(42)));
        let log = recorder.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                r#"start worker job://1 {"n":2}"#.to_string(),
                "event ping".to_string(),
                "cancel".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_invoker_type_raises_failure_event() {
        let chart = ChartBuilder::new("c")
            .state(
                StateBuilder::new("busy")
                    .invoke(Invoke::new("missing").with_src("x"))
                    .transition(simple_transition("busy.invoke.failed", "failed")),
            )
            .state(StateBuilder::new("failed"))
            .build()
            .unwrap();
        let (machine, reporter) = with_reporter(chart);
        assert!(machine.is_in("failed"));
        assert!(reporter.contains(ErrorCode::InvokeError));
    }

    #[test]
    fn listeners_see_entries_exits_and_transitions() {
        #[derive(Default)]
        struct Log(Mutex<Vec<String>>);

        impl StateChartListener for Log {
            fn on_entry(&self, target: &crate::model::TransitionTarget) {
                self.0.lock().unwrap().push(format!("enter {}", target.label()));
            }

            fn on_exit(&self, target: &crate::model::TransitionTarget) {
                self.0.lock().unwrap().push(format!("exit {}", target.label()));
            }

            fn on_transition(
                &self,
                source: &crate::model::TransitionTarget,
                targets: &[&crate::model::TransitionTarget],
                _transition: &crate::model::Transition,
            ) {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("{} -> {}", source.label(), targets[0].label()));
            }
        }

        let chart = ChartBuilder::new("c")
            .state(StateBuilder::new("a").transition(simple_transition("go", "b")))
            .state(StateBuilder::new("b"))
            .build()
            .unwrap();
        let log = Arc::new(Log::default());
        let mut machine = StateMachine::new(chart);
        machine.add_listener(log.clone());
        machine.start().unwrap();
        machine.trigger_event(Event::new("go")).unwrap();
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["enter a", "exit a", "a -> b", "enter b"]
        );
    }

    #[test]
    fn terminate_exits_every_active_state() {
        let chart = ChartBuilder::new("c")
            .data(Data::new("log", "[]"))
            .state(
                StateBuilder::new("outer")
                    .on_exit(Action::assign("log", "log + ['outer']"))
                    .state(StateBuilder::new("inner").on_exit(Action::assign("log", "log + ['inner']"))),
            )
            .build()
            .unwrap();
        let mut machine = started(StateMachine::new(chart));
        machine.terminate();
        assert_eq!(machine.status(), Status::Terminated);
        assert!(machine.configuration().is_empty());
        assert_eq!(machine.variable("log"), Some(&json!(["inner", "outer"])));
        machine.trigger_event(Event::new("anything")).unwrap();
    }
}
