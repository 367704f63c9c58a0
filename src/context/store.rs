//! Arena of chained variable scopes.

use crate::context::error::ContextError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Session id of the running machine.
pub const SESSION_ID: &str = "_sessionid";
/// Name of the running document.
pub const NAME: &str = "_name";
/// Event being processed: `{ "name", "data", "sendid", "invokeid" }`.
pub const EVENT: &str = "_event";
/// Payload of the event being processed.
pub const EVENT_DATA: &str = "_eventdata";
/// Ids of every active target.
pub const ALL_STATES: &str = "_ALL_STATES";
/// Known I/O processor types.
pub const IO_PROCESSORS: &str = "_ioprocessors";

/// Handle of a scope inside a [`ContextStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(usize);

#[derive(Clone, Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    vars: BTreeMap<String, Value>,
    read_only: bool,
}

/// Owner of every scope of one machine instance.
///
/// Scope 0 is the system scope: read-only to actions and maintained by the
/// interpreter. Every other scope chains to a parent, and lookups climb the
/// chain until a scope declares the name.
///
/// # Example
///
/// ```rust
/// use stateflow::context::ContextStore;
/// use serde_json::json;
///
/// let mut store = ContextStore::new();
/// let root = store.new_scope(Some(store.system()));
/// let child = store.new_scope(Some(root));
///
/// store.set_local(root, "count", json!(1)).unwrap();
/// store.set(child, "count", json!(2)).unwrap();
///
/// assert_eq!(store.lookup(root, "count"), Some(&json!(2)));
/// assert!(store.set(child, "missing", json!(0)).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct ContextStore {
    scopes: Vec<Scope>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                read_only: true,
                ..Scope::default()
            }],
        }
    }

    /// The read-only system scope at the root of every chain.
    pub fn system(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create an empty scope chained to `parent`.
    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0).and_then(|s| s.parent)
    }

    /// Read a plain variable, climbing the chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.declaring(scope, name)
            .and_then(|id| self.scopes[id.0].vars.get(name))
    }

    pub fn has(&self, scope: ScopeId, name: &str) -> bool {
        self.declaring(scope, name).is_some()
    }

    /// Update the nearest scope that declares `name`.
    pub fn set(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<(), ContextError> {
        let target = self
            .declaring(scope, name)
            .ok_or_else(|| ContextError::Undefined {
                name: name.to_string(),
            })?;
        let entry = &mut self.scopes[target.0];
        if entry.read_only {
            return Err(ContextError::ReadOnly {
                name: name.to_string(),
            });
        }
        entry.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Declare or overwrite `name` in `scope` itself.
    pub fn set_local(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        let entry = self
            .scopes
            .get_mut(scope.0)
            .ok_or_else(|| ContextError::Undefined {
                name: name.to_string(),
            })?;
        if entry.read_only {
            return Err(ContextError::ReadOnly {
                name: name.to_string(),
            });
        }
        entry.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Write to a variable or to a dotted path inside one (`order.items.0`).
    ///
    /// The root variable must already be declared. Object keys are created
    /// on demand at the last segment; array indices must exist.
    pub fn set_location(
        &mut self,
        scope: ScopeId,
        location: &str,
        value: Value,
    ) -> Result<(), ContextError> {
        let mut segments = location.split('.');
        let root = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();
        if rest.is_empty() {
            return self.set(scope, root, value);
        }

        let target = self
            .declaring(scope, root)
            .ok_or_else(|| ContextError::Undefined {
                name: root.to_string(),
            })?;
        let entry = &mut self.scopes[target.0];
        if entry.read_only {
            return Err(ContextError::ReadOnly {
                name: root.to_string(),
            });
        }
        let invalid = || ContextError::InvalidLocation {
            location: location.to_string(),
        };

        let mut current = entry.vars.get_mut(root).ok_or_else(invalid)?;
        let (last, parents) = rest.split_last().ok_or_else(invalid)?;
        for segment in parents {
            current = child_mut(current, segment).ok_or_else(invalid)?;
        }
        match current {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(invalid)?;
                *slot = value;
                Ok(())
            }
            _ => Err(invalid()),
        }
    }

    /// Interpreter-maintained write into the system scope.
    pub(crate) fn set_system(&mut self, name: &str, value: Value) {
        self.scopes[0].vars.insert(name.to_string(), value);
    }

    /// Variables declared directly in `scope`.
    pub fn locals(&self, scope: ScopeId) -> Option<&BTreeMap<String, Value>> {
        self.scopes.get(scope.0).map(|s| &s.vars)
    }

    pub(crate) fn replace_locals(&mut self, scope: ScopeId, vars: BTreeMap<String, Value>) {
        if let Some(entry) = self.scopes.get_mut(scope.0) {
            entry.vars = vars;
        }
    }

    /// Read view anchored at `scope`.
    pub fn view(&self, scope: ScopeId) -> Context<'_> {
        Context { store: self, scope }
    }

    fn declaring(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.scopes.get(id.0)?;
            if entry.vars.contains_key(name) {
                return Some(id);
            }
            current = entry.parent;
        }
        None
    }
}

fn child_mut<'v>(value: &'v mut Value, segment: &str) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Read-only view of a scope chain, handed to evaluators.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    store: &'a ContextStore,
    scope: ScopeId,
}

impl<'a> Context<'a> {
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn store(&self) -> &'a ContextStore {
        self.store
    }

    /// Resolve a variable or a dotted path inside one.
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        let mut current = self.store.lookup(self.scope, root)?;
        for segment in segments {
            current = child(current, segment)?;
        }
        Some(current)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Whether the target with this id is active.
    pub fn is_active(&self, id: &str) -> bool {
        self.store
            .lookup(self.scope, ALL_STATES)
            .and_then(Value::as_array)
            .is_some_and(|ids| ids.iter().any(|v| v.as_str() == Some(id)))
    }

    /// The `_event` value, if an event is being processed.
    pub fn event(&self) -> Option<&'a Value> {
        self.store.lookup(self.scope, EVENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain() -> (ContextStore, ScopeId, ScopeId) {
        let mut store = ContextStore::new();
        let root = store.new_scope(Some(store.system()));
        let child = store.new_scope(Some(root));
        (store, root, child)
    }

    #[test]
    fn set_climbs_to_declaring_scope() {
        let (mut store, root, child) = chain();
        store.set_local(root, "x", json!(1)).unwrap();
        store.set(child, "x", json!(5)).unwrap();
        assert_eq!(store.locals(root).unwrap().get("x"), Some(&json!(5)));
        assert!(store.locals(child).unwrap().is_empty());
    }

    #[test]
    fn set_local_shadows_parent() {
        let (mut store, root, child) = chain();
        store.set_local(root, "x", json!(1)).unwrap();
        store.set_local(child, "x", json!(2)).unwrap();
        assert_eq!(store.lookup(child, "x"), Some(&json!(2)));
        assert_eq!(store.lookup(root, "x"), Some(&json!(1)));
    }

    #[test]
    fn undefined_variable_cannot_be_set() {
        let (mut store, _, child) = chain();
        let err = store.set(child, "nope", json!(1)).unwrap_err();
        assert_eq!(
            err,
            ContextError::Undefined {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn system_scope_is_read_only() {
        let (mut store, _, child) = chain();
        store.set_system(SESSION_ID, json!("abc"));
        assert_eq!(store.lookup(child, SESSION_ID), Some(&json!("abc")));
        assert!(matches!(
            store.set(child, SESSION_ID, json!("x")),
            Err(ContextError::ReadOnly { .. })
        ));
        let system = store.system();
        assert!(store.set_local(system, "y", json!(1)).is_err());
    }

    #[test]
    fn dotted_locations_write_inside_values() {
        let (mut store, root, child) = chain();
        store
            .set_local(root, "order", json!({ "items": [1, 2], "meta": {} }))
            .unwrap();
        store.set_location(child, "order.items.1", json!(9)).unwrap();
        store.set_location(child, "order.meta.tag", json!("a")).unwrap();

        let ctx = store.view(child);
        assert_eq!(ctx.get("order.items.1"), Some(&json!(9)));
        assert_eq!(ctx.get("order.meta.tag"), Some(&json!("a")));
        assert!(store.set_location(child, "order.items.7", json!(0)).is_err());
    }

    #[test]
    fn view_reports_active_targets() {
        let (mut store, _, child) = chain();
        store.set_system(ALL_STATES, json!(["a", "b"]));
        let ctx = store.view(child);
        assert!(ctx.is_active("a"));
        assert!(!ctx.is_active("c"));
    }
}
