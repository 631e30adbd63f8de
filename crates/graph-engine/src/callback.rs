//! Named hook dispatch with priorities
//!
//! A `CallbackHandler` keeps, per hook name, a list of handlers sorted by
//! descending priority. Processing a hook runs every handler with
//! priority >= 0, then the default behaviour, then handlers with negative
//! priority. Handlers can chain a return value, prevent the default or stop
//! the chain.
//!
//! # Example
//!
//! ```ignore
//! let mut hooks = CallbackHandler::new();
//! let id = hooks.register("onPropertyChanged", 10, |_info, args| {
//!     if args.first() == Some(&json!("locked")) {
//!         return Some(HookResult::value(json!(false)));
//!     }
//!     None
//! });
//! let outcome = hooks.process("onPropertyChanged", &[json!("locked")], || None);
//! assert!(!outcome.proceeds());
//! hooks.unregister("onPropertyChanged", id);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Handle returned on registration, unique per hook name
pub type HandlerId = u64;

/// Context handed to each handler
#[derive(Debug)]
pub struct HookInfo<'a> {
    pub name: &'a str,
    pub handler_id: HandlerId,
    pub priority: i32,
    /// Return value chained by earlier handlers
    pub current_return_value: Option<&'a Value>,
}

/// What a handler asks the dispatcher to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookResult {
    pub return_value: Option<Value>,
    /// Later handlers only override this value with a priority >= this one
    pub result_priority: Option<i32>,
    pub prevent_default: bool,
    pub stop_replication: bool,
}

impl HookResult {
    /// Result that sets the chained return value
    pub fn value(value: Value) -> Self {
        Self {
            return_value: Some(value),
            ..Default::default()
        }
    }

    /// Result that refuses the operation and skips the default behaviour
    pub fn veto() -> Self {
        Self {
            return_value: Some(Value::Bool(false)),
            prevent_default: true,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.result_priority = Some(priority);
        self
    }

    pub fn stop(mut self) -> Self {
        self.stop_replication = true;
        self
    }
}

/// Outcome of processing a hook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutcome {
    pub return_value: Option<Value>,
    pub default_prevented: bool,
    pub handlers_run: usize,
}

impl HookOutcome {
    /// False when the outcome carries a `false` return value
    pub fn proceeds(&self) -> bool {
        !matches!(self.return_value, Some(Value::Bool(false)))
    }
}

/// Handler function shared between dispatch plans
pub type HookFn = Arc<dyn Fn(&HookInfo<'_>, &[Value]) -> Option<HookResult> + Send + Sync>;

#[derive(Clone)]
struct HandlerEntry {
    id: HandlerId,
    priority: i32,
    callback: HookFn,
}

#[derive(Default, Clone)]
struct HandlerList {
    last_id: HandlerId,
    handlers: Vec<HandlerEntry>,
}

/// Registry of named hook handlers
#[derive(Default, Clone)]
pub struct CallbackHandler {
    lists: HashMap<String, HandlerList>,
}

impl std::fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .lists
            .iter()
            .map(|(k, v)| (k.as_str(), v.handlers.len()))
            .collect();
        f.debug_struct("CallbackHandler").field("handlers", &counts).finish()
    }
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler; higher priorities run first, the default runs at 0
    pub fn register<F>(&mut self, name: &str, priority: i32, callback: F) -> HandlerId
    where
        F: Fn(&HookInfo<'_>, &[Value]) -> Option<HookResult> + Send + Sync + 'static,
    {
        let list = self.lists.entry(name.to_string()).or_default();
        let id = list.last_id;
        list.last_id += 1;
        list.handlers.push(HandlerEntry {
            id,
            priority,
            callback: Arc::new(callback),
        });
        // stable: equal priorities keep registration order
        list.handlers.sort_by(|a, b| b.priority.cmp(&a.priority));
        log::debug!("Registered handler {} for '{}' (priority {})", id, name, priority);
        id
    }

    /// Remove a handler, returning whether it existed
    pub fn unregister(&mut self, name: &str, id: HandlerId) -> bool {
        if let Some(list) = self.lists.get_mut(name) {
            let before = list.handlers.len();
            list.handlers.retain(|h| h.id != id);
            if list.handlers.len() < before {
                return true;
            }
        }
        log::warn!("No handler {} registered for '{}'", id, name);
        false
    }

    pub fn has_handlers(&self, name: &str) -> bool {
        self.lists.get(name).is_some_and(|l| !l.handlers.is_empty())
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.lists.get(name).map_or(0, |l| l.handlers.len())
    }

    /// Snapshot the handlers of one hook so it can run while the owner is mutably borrowed
    pub fn plan(&self, name: &str) -> DispatchPlan {
        DispatchPlan {
            name: name.to_string(),
            handlers: self
                .lists
                .get(name)
                .map(|l| l.handlers.clone())
                .unwrap_or_default(),
        }
    }

    /// Run a hook with a default behaviour
    pub fn process<D>(&self, name: &str, args: &[Value], default: D) -> HookOutcome
    where
        D: FnOnce() -> Option<Value>,
    {
        self.plan(name).run(args, default)
    }
}

/// Handlers of one hook captured at dispatch time
pub struct DispatchPlan {
    name: String,
    handlers: Vec<HandlerEntry>,
}

impl DispatchPlan {
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Execute the plan: handlers >= 0, the default, then handlers < 0
    pub fn run<D>(self, args: &[Value], default: D) -> HookOutcome
    where
        D: FnOnce() -> Option<Value>,
    {
        let mut default = Some(default);
        let mut outcome = HookOutcome::default();
        let mut chained: Option<Value> = None;
        let mut chained_priority: Option<i32> = None;
        let mut default_value: Option<Value> = None;

        let mut run_default = |prevented: bool, default_value: &mut Option<Value>| {
            if let Some(cb) = default.take() {
                if !prevented {
                    *default_value = cb();
                }
            }
        };

        for entry in &self.handlers {
            if entry.priority < 0 {
                run_default(outcome.default_prevented, &mut default_value);
            }
            let info = HookInfo {
                name: &self.name,
                handler_id: entry.id,
                priority: entry.priority,
                current_return_value: chained.as_ref(),
            };
            let result = (entry.callback)(&info, args);
            outcome.handlers_run += 1;

            let Some(result) = result else { continue };
            if result.prevent_default {
                outcome.default_prevented = true;
            }
            if let Some(value) = result.return_value {
                let accept = match (chained_priority, result.result_priority) {
                    (None, _) => true,
                    (Some(current), Some(new)) => current <= new,
                    (Some(current), None) => current <= 0,
                };
                if accept {
                    chained = Some(value);
                    chained_priority = result.result_priority.or(chained_priority);
                }
            }
            if result.stop_replication {
                log::debug!("Hook '{}' chain stopped by handler {}", self.name, entry.id);
                break;
            }
        }
        run_default(outcome.default_prevented, &mut default_value);

        outcome.return_value = chained.or(default_value);
        outcome
    }
}
