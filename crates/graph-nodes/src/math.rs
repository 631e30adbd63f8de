//! Math nodes

use graph_engine::{
    impl_as_any, ExecOptions, NodeBehavior, NodeContext, NodeDescriptor, NodeTypeMetadata, Result,
};
use serde_json::{json, Value};

use crate::as_number;

/// Binary operation selected by the `OP` property
///
/// Each operand comes from its input when connected, else from the property
/// of the same name. A connected operand is written back to its property so
/// the last value survives a disconnect.
#[derive(Default)]
pub struct MathOperation;

impl MathOperation {
    pub const NODE_TYPE: &'static str = "math/operation";
    pub const OPERATIONS: [&'static str; 8] = ["+", "-", "*", "/", "%", "^", "max", "min"];

    pub fn apply(op: &str, a: f64, b: f64) -> Option<f64> {
        let result = match op {
            "+" => a + b,
            "-" => a - b,
            "*" | "x" | "X" => a * b,
            "/" => a / b,
            "%" => a % b,
            "^" => a.powf(b),
            "max" => a.max(b),
            "min" => a.min(b),
            _ => return None,
        };
        Some(result)
    }

    fn operand(ctx: &mut NodeContext<'_>, slot: usize, name: &str) -> Result<f64> {
        match ctx.input_data(slot).and_then(|v| as_number(Some(&v))) {
            Some(value) => {
                ctx.set_property(name, json!(value))?;
                Ok(value)
            }
            None => Ok(as_number(ctx.property(name).as_ref()).unwrap_or(0.0)),
        }
    }
}

impl NodeDescriptor for MathOperation {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Operation")
            .with_description("Easy math operators")
            .input("A", "number")
            .input("B", "number")
            .output("=", "number")
            .property("A", json!(1))
            .property("B", json!(1))
            .property("OP", json!("+"))
    }
}

impl NodeBehavior for MathOperation {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let a = Self::operand(ctx, 0, "A")?;
        let b = Self::operand(ctx, 1, "B")?;
        let op = ctx
            .property("OP")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let result = match Self::apply(&op, a, b) {
            Some(result) => json!(result),
            None => {
                log::warn!("Node {}: unknown operation '{}'", ctx.node_id(), op);
                Value::Null
            }
        };
        ctx.set_output_data(0, result);
        Ok(())
    }

    fn on_property_changed(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        name: &str,
        value: &Value,
        _prev: Option<&Value>,
    ) -> bool {
        if name != "OP" {
            return true;
        }
        value
            .as_str()
            .is_some_and(|op| Self::OPERATIONS.contains(&op) || op == "x" || op == "X")
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<MathOperation>());

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::basic::ConstNumber;
    use crate::test_support::*;

    #[test]
    fn test_apply() {
        assert_eq!(MathOperation::apply("+", 2.0, 3.0), Some(5.0));
        assert_eq!(MathOperation::apply("^", 2.0, 3.0), Some(8.0));
        assert_eq!(MathOperation::apply("min", 2.0, 3.0), Some(2.0));
        assert_eq!(MathOperation::apply("%", 7.0, 4.0), Some(3.0));
        assert_eq!(MathOperation::apply("?", 2.0, 3.0), None);
    }

    #[test]
    fn test_operands_from_inputs_and_properties() {
        let mut graph = graph();
        let c = graph.add_new(ConstNumber::NODE_TYPE).unwrap();
        graph.set_property(&c, "value", json!(6)).unwrap();
        let op = graph.add_new(MathOperation::NODE_TYPE).unwrap();
        graph.connect(&c, 0, &op, 0).unwrap();
        graph.set_property(&op, "B", json!(4)).unwrap();
        graph.set_property(&op, "OP", json!("*")).unwrap();
        graph.run_step(1, None).unwrap();

        let node = graph.get_node(&op).unwrap();
        assert_eq!(node.get_output_data(0), Some(&json!(24.0)));
        // the connected operand is remembered
        assert_eq!(node.property("A"), Some(&json!(6.0)));
    }

    #[test]
    fn test_unknown_operation_refused() {
        let mut graph = graph();
        let op = graph.add_new(MathOperation::NODE_TYPE).unwrap();
        assert!(!graph.set_property(&op, "OP", json!("sqrt")).unwrap());
        assert_eq!(graph.get_node(&op).unwrap().property("OP"), Some(&json!("+")));
    }

    #[test]
    fn test_chain_runs_in_dependency_order() {
        let mut graph = graph();
        // added downstream first so insertion order disagrees with the links
        let last = graph.add_new(MathOperation::NODE_TYPE).unwrap();
        let first = graph.add_new(MathOperation::NODE_TYPE).unwrap();
        let c = graph.add_new(ConstNumber::NODE_TYPE).unwrap();
        graph.set_property(&c, "value", json!(2)).unwrap();
        graph.connect(&c, 0, &first, 0).unwrap();
        graph.connect(&first, 0, &last, 0).unwrap();
        graph.run_step(1, None).unwrap();

        // (2 + 1) + 1 in a single step
        assert_eq!(graph.get_node(&last).unwrap().get_output_data(0), Some(&json!(4.0)));
    }
}
