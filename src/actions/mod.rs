//! Action execution engine.
//!
//! Executes [`Action`] lists against the scope of their owning target.
//! A failing action is reported and skipped; the rest of the list still
//! runs. Events produced by actions are appended to the derived queue or
//! routed to the host, and delayed sends go to the dispatcher.

mod delay;
mod error;

pub use delay::{delay_from_value, parse_delay};
pub use error::ActionError;

use crate::context::ContextStore;
use crate::context::ScopeId;
use crate::core::{ErrorCode, ErrorReporter, Event, NodeRef};
use crate::dispatch::{is_default_type, EventDispatcher, SendSpec, SendTarget};
use crate::eval::{Evaluator, Guard};
use crate::model::{Action, Branch, Data, Param, Send, TargetId};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// Everything an action can touch while it runs.
pub struct ActionEnv<'a> {
    pub evaluator: &'a dyn Evaluator,
    pub dispatcher: &'a dyn EventDispatcher,
    pub reporter: &'a dyn ErrorReporter,
    pub store: &'a mut ContextStore,
    /// Scope of the owning target
    pub scope: ScopeId,
    /// Owning target, `None` for document-level content
    pub owner: Option<TargetId>,
    /// Internal event queue
    pub derived: &'a mut VecDeque<Event>,
    /// Zero-delay events for the host or an invoker
    pub routed: &'a mut Vec<(SendTarget, Event)>,
    /// Ids of running invokers
    pub invokes: &'a BTreeSet<String>,
    /// Whether `.change` events are raised
    pub change_events: bool,
}

impl ActionEnv<'_> {
    fn report(&self, code: ErrorCode, detail: &str) {
        self.reporter
            .on_error(code, detail, &NodeRef::Action(self.owner));
    }

    fn raise_change(&mut self, name: &str) {
        if self.change_events {
            self.derived
                .push_back(Event::change(format!("{name}.change")));
        }
    }

    fn eval(&self, expr: &str) -> Result<Value, ActionError> {
        Ok(self.evaluator.eval(&self.store.view(self.scope), expr)?)
    }

    fn eval_string(&self, literal: Option<&str>, expr: Option<&str>) -> Result<Option<String>, ActionError> {
        match expr {
            Some(expr) => Ok(Some(match self.eval(expr)? {
                Value::String(s) => s,
                Value::Null => return Ok(literal.map(str::to_string)),
                other => other.to_string(),
            })),
            None => Ok(literal.map(str::to_string)),
        }
    }
}

/// Run `actions` in order, reporting and skipping any that fail.
pub fn execute_all(env: &mut ActionEnv<'_>, actions: &[Action]) {
    for action in actions {
        if let Err(error) = execute(env, action) {
            tracing::debug!(action = action.name(), %error, "action skipped");
            env.report(error.code(), &error.to_string());
            if let Some(name) = error.event_name() {
                env.derived.push_back(Event::error(name));
            }
        }
    }
}

/// Run a single action.
pub fn execute(env: &mut ActionEnv<'_>, action: &Action) -> Result<(), ActionError> {
    match action {
        Action::Assign {
            location,
            expr,
            src,
        } => assign(env, location, expr.as_deref(), src.as_deref()),
        Action::Var { name, expr } => {
            let value = match expr {
                Some(expr) => env.eval(expr)?,
                None => Value::Null,
            };
            env.store.set_local(env.scope, name, value)?;
            env.raise_change(name);
            Ok(())
        }
        Action::Raise { event } => {
            env.derived.push_back(Event::new(event.clone()));
            Ok(())
        }
        Action::Log { label, expr } => {
            let value = match expr {
                Some(expr) => env.eval(expr)?,
                None => Value::Null,
            };
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            tracing::info!(
                target: "stateflow::log",
                label = label.as_deref().unwrap_or(""),
                value = %text,
                "log"
            );
            Ok(())
        }
        Action::Cancel {
            send_id,
            send_id_expr,
        } => {
            if let Some(id) = env.eval_string(send_id.as_deref(), send_id_expr.as_deref())? {
                env.dispatcher.cancel(&id);
            }
            Ok(())
        }
        Action::Send(send) => send_event(env, send),
        Action::If { branches } => {
            if let Some(branch) = select_branch(env, branches)? {
                execute_all(env, &branch.actions);
            }
            Ok(())
        }
        Action::Foreach {
            array,
            item,
            index,
            actions,
        } => foreach(env, array, item, index.as_deref(), actions),
        Action::Script { src } => {
            env.evaluator.eval_script(env.store, env.scope, src)?;
            Ok(())
        }
    }
}

fn assign(
    env: &mut ActionEnv<'_>,
    location: &str,
    expr: Option<&str>,
    src: Option<&str>,
) -> Result<(), ActionError> {
    let root = location.split('.').next().unwrap_or(location);
    if !env.store.has(env.scope, root) {
        return Err(crate::context::ContextError::Undefined {
            name: root.to_string(),
        }
        .into());
    }
    let value = match (expr, src) {
        (Some(expr), _) => env.eval(expr)?,
        (None, Some(src)) => env.evaluator.load_source(src)?,
        (None, None) => Value::Null,
    };
    env.store.set_location(env.scope, location, value)?;
    env.raise_change(location);
    Ok(())
}

fn select_branch<'b>(
    env: &ActionEnv<'_>,
    branches: &'b [Branch],
) -> Result<Option<&'b Branch>, ActionError> {
    let ctx = env.store.view(env.scope);
    for branch in branches {
        if Guard::new(branch.cond.as_deref()).check(env.evaluator, &ctx)? {
            return Ok(Some(branch));
        }
    }
    Ok(None)
}

fn foreach(
    env: &mut ActionEnv<'_>,
    array: &str,
    item: &str,
    index: Option<&str>,
    actions: &[Action],
) -> Result<(), ActionError> {
    let items = match env.eval(array)? {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            return Err(crate::eval::ExpressionError::Type {
                message: format!("foreach expects an array, found {other}"),
            }
            .into())
        }
    };
    for (position, value) in items.into_iter().enumerate() {
        bind(env, item, value)?;
        if let Some(index) = index {
            bind(env, index, Value::from(position))?;
        }
        execute_all(env, actions);
    }
    Ok(())
}

fn bind(env: &mut ActionEnv<'_>, name: &str, value: Value) -> Result<(), ActionError> {
    if env.store.has(env.scope, name) {
        env.store.set(env.scope, name, value)?;
    } else {
        env.store.set_local(env.scope, name, value)?;
    }
    Ok(())
}

fn send_event(env: &mut ActionEnv<'_>, send: &Send) -> Result<(), ActionError> {
    let name = env
        .eval_string(send.event.as_deref(), send.event_expr.as_deref())?
        .filter(|n| !n.trim().is_empty())
        .ok_or(ActionError::MissingEvent)?;
    let target = env.eval_string(send.target.as_deref(), send.target_expr.as_deref())?;
    let target_type =
        env.eval_string(send.target_type.as_deref(), send.target_type_expr.as_deref())?;
    let delay = match (&send.delay_expr, &send.delay) {
        (Some(expr), _) => {
            let value = env.eval(expr)?;
            delay_from_value(&value).ok_or(ActionError::InvalidDelay {
                delay: value.to_string(),
            })?
        }
        (None, Some(text)) => parse_delay(text).ok_or_else(|| ActionError::InvalidDelay {
            delay: text.clone(),
        })?,
        (None, None) => Duration::ZERO,
    };
    let data = match (&send.content_expr, &send.content) {
        (Some(expr), _) => Some(content_data(env, expr)),
        (None, Some(content)) => Some(content.clone()),
        (None, None) => send_data(env, send.namelist.as_deref(), &send.params)?,
    };

    let send_id = send
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if let Some(location) = &send.id_location {
        bind(env, location, Value::String(send_id.clone()))?;
    }

    let mut event = Event::new(name).with_send_id(send_id.clone());
    if let Some(data) = data {
        event = event.with_data(data);
    }

    let resolved = SendTarget::parse(target.as_deref()).filter(|t| match t {
        SendTarget::Invoked(id) => env.invokes.contains(id),
        _ => true,
    });
    let resolved = match resolved {
        Some(resolved) if is_default_type(target_type.as_deref()) => resolved,
        _ => {
            let detail = format!(
                "send \"{}\" to {} of type {}",
                event.name(),
                target.as_deref().unwrap_or("<self>"),
                target_type.as_deref().unwrap_or("scxml")
            );
            env.report(ErrorCode::SendTargetUnavailable, &detail);
            env.derived.push_back(
                Event::error("error.send.targetunavailable").with_send_id(send_id),
            );
            return Ok(());
        }
    };

    if delay.is_zero() {
        match resolved {
            SendTarget::SelfChart | SendTarget::Internal => env.derived.push_back(event),
            other => env.routed.push((other, event)),
        }
        return Ok(());
    }

    env.dispatcher.send(SendSpec {
        send_id,
        event,
        target: resolved,
        target_type: target_type.unwrap_or_else(|| crate::dispatch::SCXML_TYPE.to_string()),
        delay,
    })?;
    Ok(())
}

/// Failed content still sends, with an empty string as its data.
fn content_data(env: &mut ActionEnv<'_>, expr: &str) -> Value {
    match env.eval(expr) {
        Ok(value) => value,
        Err(e) => {
            env.report(ErrorCode::ExpressionError, &format!("send content: {e}"));
            env.derived.push_back(Event::error("error.execution"));
            Value::String(String::new())
        }
    }
}

fn send_data(
    env: &ActionEnv<'_>,
    namelist: Option<&str>,
    params: &[Param],
) -> Result<Option<Value>, ActionError> {
    let names: Vec<&str> = namelist.map(|n| n.split_whitespace().collect()).unwrap_or_default();
    if names.is_empty() && params.is_empty() {
        return Ok(None);
    }
    let mut data = Map::new();
    let ctx = env.store.view(env.scope);
    for name in names {
        let value = match ctx.get(name) {
            Some(value) => value.clone(),
            None => {
                env.report(
                    ErrorCode::UndefinedVariable,
                    &format!("namelist variable \"{name}\" is not declared"),
                );
                Value::Null
            }
        };
        data.insert(name.to_string(), value);
    }
    data.extend(eval_params(env, params)?);
    Ok(Some(Value::Object(data)))
}

/// Evaluate `params` into an object; undefined locations bind `null`.
pub fn eval_params(env: &ActionEnv<'_>, params: &[Param]) -> Result<Map<String, Value>, ActionError> {
    let ctx = env.store.view(env.scope);
    let mut data = Map::new();
    for param in params {
        let value = match (&param.expr, &param.location) {
            (Some(expr), _) => env.evaluator.eval(&ctx, expr)?,
            (None, Some(location)) => match ctx.get(location) {
                Some(value) => value.clone(),
                None => {
                    env.report(
                        ErrorCode::UndefinedVariable,
                        &format!("param location \"{location}\" is not declared"),
                    );
                    Value::Null
                }
            },
            (None, None) => Value::Null,
        };
        data.insert(param.name.clone(), value);
    }
    Ok(data)
}

/// Declare `data` in the env scope; failures bind `null` and are reported.
pub fn declare_data(env: &mut ActionEnv<'_>, data: &[Data]) {
    for declaration in data {
        let value = match (&declaration.expr, &declaration.src) {
            (Some(expr), _) => env.eval(expr),
            (None, Some(src)) => env.evaluator.load_source(src).map_err(ActionError::from),
            (None, None) => Ok(Value::Null),
        };
        let value = value.unwrap_or_else(|error| {
            env.report(
                ErrorCode::ExpressionError,
                &format!("data \"{}\": {error}", declaration.id),
            );
            Value::Null
        });
        if let Err(error) = env.store.set_local(env.scope, &declaration.id, value) {
            env.report(error_code_for(&error), &error.to_string());
        }
    }
}

fn error_code_for(error: &crate::context::ContextError) -> ErrorCode {
    ActionError::Context(error.clone()).code()
}
