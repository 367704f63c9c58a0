//! Stateflow: a hierarchical state-chart interpreter
//!
//! Stateflow executes state charts in the SCXML style: compound states,
//! parallel regions, shallow and deep history, final states with done
//! events, eventless transitions, internal and external event queues,
//! delayed sends and invoked child services.
//!
//! Charts are assembled with the fluent builders in [`builder`]. Building
//! validates the document, so a [`StateChart`] is always executable. A
//! [`StateMachine`] runs a shared chart; many machines may run the same
//! chart at once.
//!
//! # Core Concepts
//!
//! - **Chart**: an arena of targets and transitions addressed by handles
//! - **Configuration**: the set of active targets, closed under ancestry
//! - **Microstep**: one set of conflict-free transitions (exit, content, entry)
//! - **Macrostep**: microsteps until no eventless or internal work remains
//! - **Datamodel**: JSON values in scopes chained along the document tree
//!
//! # Example
//!
//! ```rust
//! use stateflow::builder::{simple_transition, ChartBuilder, FinalBuilder, StateBuilder};
//! use stateflow::{Event, StateMachine};
//!
//! let chart = ChartBuilder::new("door")
//!     .state(StateBuilder::new("closed").transition(simple_transition("open", "opened")))
//!     .state(StateBuilder::new("opened").transition(simple_transition("lock", "locked")))
//!     .final_state(FinalBuilder::new("locked"))
//!     .build()
//!     .unwrap();
//!
//! let mut machine = StateMachine::new(chart);
//! machine.start().unwrap();
//! assert!(machine.is_in("closed"));
//!
//! machine.trigger_event(Event::new("open")).unwrap();
//! machine.trigger_event(Event::new("lock")).unwrap();
//! assert!(machine.is_final());
//! ```

pub mod actions;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod eval;
pub mod model;
pub mod validation;

// Re-export commonly used types
pub use builder::{BuildError, ChartBuilder};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use config::InterpreterConfig;
pub use core::{ErrorCode, ErrorReporter, Event, EventKind};
pub use dispatch::{EventDispatcher, TimerDispatcher};
pub use engine::{EngineError, Invoker, StateChartListener, StateMachine, Status};
pub use eval::{Evaluator, MinimalEvaluator};
pub use model::StateChart;
