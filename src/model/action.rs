//! Executable content and the declarations attached to targets.
//!
//! Actions form a closed sum type; the interpreter dispatches on it with an
//! exhaustive `match` (see [`crate::actions`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `name`/value pair attached to `send`, `invoke` and done data.
///
/// The value comes from `expr` when present, otherwise from the variable
/// named by `location`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub expr: Option<String>,
    pub location: Option<String>,
}

impl Param {
    pub fn expr(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: Some(expr.into()),
            location: None,
        }
    }

    pub fn location(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: None,
            location: Some(location.into()),
        }
    }
}

/// A datamodel declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub id: String,
    pub expr: Option<String>,
    /// External source handed to the evaluator's loader
    pub src: Option<String>,
}

impl Data {
    pub fn new(id: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expr: Some(expr.into()),
            src: None,
        }
    }

    /// Declaration bound to `null`.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expr: None,
            src: None,
        }
    }
}

/// Payload carried by the done event of a final state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DoneData {
    pub params: Vec<Param>,
    /// Whole-payload expression; wins over `params` when present
    pub content_expr: Option<String>,
}

/// Declaration of an external process run while its state is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoke {
    /// Invoke id; defaults to `<stateId>.invoke` at runtime
    pub id: Option<String>,
    pub target_type: Option<String>,
    pub src: Option<String>,
    pub src_expr: Option<String>,
    pub params: Vec<Param>,
    /// Run when an event returned by this invoke is processed
    pub finalize: Vec<Action>,
    /// Forward external events to the running invoker
    pub autoforward: bool,
}

impl Invoke {
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            id: None,
            target_type: Some(target_type.into()),
            src: None,
            src_expr: None,
            params: Vec::new(),
            finalize: Vec::new(),
            autoforward: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_src_expr(mut self, expr: impl Into<String>) -> Self {
        self.src_expr = Some(expr.into());
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_finalize(mut self, action: Action) -> Self {
        self.finalize.push(action);
        self
    }

    pub fn autoforward(mut self, autoforward: bool) -> Self {
        self.autoforward = autoforward;
        self
    }
}

/// One `if`/`elseif`/`else` arm; `else` has no condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub cond: Option<String>,
    pub actions: Vec<Action>,
}

/// Description of a `send` action; every field may be a literal or an
/// expression (the `*_expr` variant wins when both are given).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub id: Option<String>,
    /// Variable receiving the generated send id
    pub id_location: Option<String>,
    pub event: Option<String>,
    pub event_expr: Option<String>,
    pub target: Option<String>,
    pub target_expr: Option<String>,
    pub target_type: Option<String>,
    pub target_type_expr: Option<String>,
    pub delay: Option<String>,
    pub delay_expr: Option<String>,
    /// Space-separated variable names copied into the event data
    pub namelist: Option<String>,
    pub params: Vec<Param>,
    /// Literal event data; overrides `namelist` and `params`
    pub content: Option<Value>,
    /// Expression evaluated into the event data; overrides `content`
    pub content_expr: Option<String>,
}

impl Send {
    /// Send of `event` to this chart.
    pub fn event(event: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_id_location(mut self, location: impl Into<String>) -> Self {
        self.id_location = Some(location.into());
        self
    }

    pub fn with_event_expr(mut self, expr: impl Into<String>) -> Self {
        self.event_expr = Some(expr.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_target_expr(mut self, expr: impl Into<String>) -> Self {
        self.target_expr = Some(expr.into());
        self
    }

    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }

    pub fn with_delay(mut self, delay: impl Into<String>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    pub fn with_delay_expr(mut self, expr: impl Into<String>) -> Self {
        self.delay_expr = Some(expr.into());
        self
    }

    pub fn with_namelist(mut self, namelist: impl Into<String>) -> Self {
        self.namelist = Some(namelist.into());
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_content_expr(mut self, expr: impl Into<String>) -> Self {
        self.content_expr = Some(expr.into());
        self
    }
}

/// Executable content.
///
/// # Example
///
/// ```rust
/// use stateflow::model::{Action, Send};
///
/// let actions = vec![
///     Action::assign("count", "count + 1"),
///     Action::raise("counted"),
///     Action::send(Send::event("tick").with_delay("1s").with_id("t1")),
/// ];
/// assert_eq!(actions.len(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Store a value in an existing variable or at a dotted path inside one
    Assign {
        location: String,
        expr: Option<String>,
        src: Option<String>,
    },
    /// Declare a variable in the current scope
    Var { name: String, expr: Option<String> },
    /// Queue an internal event
    Raise { event: String },
    Log {
        label: Option<String>,
        expr: Option<String>,
    },
    Cancel {
        send_id: Option<String>,
        send_id_expr: Option<String>,
    },
    Send(Send),
    If { branches: Vec<Branch> },
    Foreach {
        array: String,
        item: String,
        index: Option<String>,
        actions: Vec<Action>,
    },
    /// Run a block of statements through the evaluator
    Script { src: String },
}

impl Action {
    pub fn assign(location: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::Assign {
            location: location.into(),
            expr: Some(expr.into()),
            src: None,
        }
    }

    pub fn var(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::Var {
            name: name.into(),
            expr: Some(expr.into()),
        }
    }

    pub fn raise(event: impl Into<String>) -> Self {
        Self::Raise {
            event: event.into(),
        }
    }

    pub fn log(label: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::Log {
            label: Some(label.into()),
            expr: Some(expr.into()),
        }
    }

    pub fn cancel(send_id: impl Into<String>) -> Self {
        Self::Cancel {
            send_id: Some(send_id.into()),
            send_id_expr: None,
        }
    }

    pub fn send(send: Send) -> Self {
        Self::Send(send)
    }

    /// Single-branch conditional.
    pub fn when(cond: impl Into<String>, actions: Vec<Action>) -> Self {
        Self::If {
            branches: vec![Branch {
                cond: Some(cond.into()),
                actions,
            }],
        }
    }

    /// Conditional with an `else` arm.
    pub fn if_else(cond: impl Into<String>, then: Vec<Action>, otherwise: Vec<Action>) -> Self {
        Self::If {
            branches: vec![
                Branch {
                    cond: Some(cond.into()),
                    actions: then,
                },
                Branch {
                    cond: None,
                    actions: otherwise,
                },
            ],
        }
    }

    pub fn foreach(
        array: impl Into<String>,
        item: impl Into<String>,
        actions: Vec<Action>,
    ) -> Self {
        Self::Foreach {
            array: array.into(),
            item: item.into(),
            index: None,
            actions,
        }
    }

    pub fn script(src: impl Into<String>) -> Self {
        Self::Script { src: src.into() }
    }

    /// Short tag used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Var { .. } => "var",
            Self::Raise { .. } => "raise",
            Self::Log { .. } => "log",
            Self::Cancel { .. } => "cancel",
            Self::Send(_) => "send",
            Self::If { .. } => "if",
            Self::Foreach { .. } => "foreach",
            Self::Script { .. } => "script",
        }
    }
}
