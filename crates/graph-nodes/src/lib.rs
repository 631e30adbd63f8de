//! Graph Nodes
//!
//! Concrete node types for the graph engine. Every type registers itself at
//! link time through `inventory`, so `NodeRegistry::with_builtins()` sees
//! all of them once this crate is linked.
//!
//! # Categories
//!
//! - **basic**: constants, watch, time
//! - **math**: binary operations on numbers
//! - **events**: counters, timers, delays and event logging
//! - **logic**: boolean gates and the event branch

pub mod basic;
pub mod events;
pub mod logic;
pub mod math;

pub use basic::*;
pub use events::*;
pub use logic::*;
pub use math::*;

use graph_engine::NodeRegistry;
use serde_json::Value;

/// Registry of every node type linked into the binary, this crate's included
pub fn registry() -> NodeRegistry {
    NodeRegistry::with_builtins()
}

/// Loose truthiness of a slot value: null, false, zero and "" are false
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Read a value as a number, parsing strings
pub(crate) fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_inventory_collects_all_node_types() {
        let registry = registry();
        for node_type in [
            "basic/const",
            "basic/boolean",
            "basic/string",
            "basic/watch",
            "basic/time",
            "math/operation",
            "events/log",
            "events/counter",
            "events/timer",
            "events/delay",
            "logic/AND",
            "logic/OR",
            "logic/NOT",
            "logic/CompareBool",
            "logic/IF",
        ] {
            assert!(registry.has_node_type(node_type), "missing {}", node_type);
        }
        assert_eq!(registry.get_node_types_in_category("logic").len(), 5);
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(truthy(Some(&json!("x"))));
        assert!(truthy(Some(&json!([]))));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(Some(&json!(" 2.5"))), Some(2.5));
        assert_eq!(as_number(Some(&json!(true))), Some(1.0));
        assert_eq!(as_number(Some(&json!(null))), None);
    }
}
