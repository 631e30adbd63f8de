//! Basic nodes
//!
//! Constants, a watch that keeps the last value it saw, and the graph clock.

use graph_engine::{
    impl_as_any, ConnectionChange, ExecOptions, NodeBehavior, NodeContext, NodeDescriptor, NodeTypeMetadata,
    Result, SlotDirection,
};
use serde_json::{json, Value};

use crate::as_number;

/// Constant number
///
/// Outputs its `value` property as a number. String values are parsed, so a
/// property edited as text still produces a number.
#[derive(Default)]
pub struct ConstNumber;

impl ConstNumber {
    pub const NODE_TYPE: &'static str = "basic/const";
}

impl NodeDescriptor for ConstNumber {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Const Number")
            .with_description("Constant number")
            .output("value", "number")
            .property("value", json!(1.0))
    }
}

impl NodeBehavior for ConstNumber {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let value = as_number(ctx.property("value").as_ref()).unwrap_or(0.0);
        ctx.set_output_data(0, json!(value));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<ConstNumber>());

/// Constant boolean, flipped by its `toggle` action
#[derive(Default)]
pub struct ConstBoolean;

impl ConstBoolean {
    pub const NODE_TYPE: &'static str = "basic/boolean";
}

impl NodeDescriptor for ConstBoolean {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Const Boolean")
            .with_description("Constant boolean")
            .action("toggle")
            .output("bool", "boolean")
            .property("value", json!(true))
    }
}

impl NodeBehavior for ConstBoolean {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let value = crate::truthy(ctx.property("value").as_ref());
        ctx.set_output_data(0, json!(value));
        Ok(())
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _action: &str,
        _param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        let value = crate::truthy(ctx.property("value").as_ref());
        ctx.set_property("value", json!(!value))?;
        ctx.set_output_data(0, json!(!value));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<ConstBoolean>());

/// Constant string
#[derive(Default)]
pub struct ConstString;

impl ConstString {
    pub const NODE_TYPE: &'static str = "basic/string";
}

impl NodeDescriptor for ConstString {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Const String")
            .with_description("Constant string")
            .output("string", "string")
            .property("value", json!(""))
    }
}

impl NodeBehavior for ConstString {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let value = match ctx.property("value") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        ctx.set_output_data(0, Value::String(value));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<ConstString>());

/// Keeps the last value seen on its input
///
/// The value is refreshed on every execution and when a link reaches the
/// input, in which case the origin runs first.
#[derive(Default)]
pub struct Watch {
    value: Option<Value>,
}

impl Watch {
    pub const NODE_TYPE: &'static str = "basic/watch";

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Display form: numbers with three decimals, arrays element-wise
    pub fn format(value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => "null".to_string(),
            Some(Value::Number(n)) => format!("{:.3}", n.as_f64().unwrap_or_default()),
            Some(Value::Array(items)) => {
                let items: Vec<String> = items.iter().map(|v| Self::format(Some(v))).collect();
                format!("[{}]", items.join(","))
            }
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl NodeDescriptor for Watch {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Watch")
            .with_description("Show value of input")
            .input("value", "*")
    }
}

impl NodeBehavior for Watch {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        self.value = ctx.input_data(0);
        Ok(())
    }

    fn on_connections_change(&mut self, ctx: &mut NodeContext<'_>, change: &ConnectionChange) {
        if change.direction != SlotDirection::Input {
            return;
        }
        self.value = ctx.input_data_forced(0, false).unwrap_or_else(|e| {
            log::debug!("Watch {}: forced read failed: {}", ctx.node_id(), e);
            None
        });
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<Watch>());

/// Graph clock in milliseconds and seconds
#[derive(Default)]
pub struct Time;

impl Time {
    pub const NODE_TYPE: &'static str = "basic/time";
}

impl NodeDescriptor for Time {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Time")
            .output("in ms", "number")
            .output("in sec", "number")
    }
}

impl NodeBehavior for Time {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let seconds = ctx.graph().globaltime;
        ctx.set_output_data(0, json!(seconds * 1000.0));
        ctx.set_output_data(1, json!(seconds));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<Time>());

#[cfg(test)]
mod tests {
    use graph_engine::ExecOptions;
    use serde_json::json;

    use super::*;
    use crate::test_support::*;

    fn watched(graph: &graph_engine::Graph, id: &graph_engine::NodeId) -> Option<Value> {
        graph.get_node(id).unwrap().behavior::<Watch>().unwrap().value().cloned()
    }

    #[test]
    fn test_const_number_parses_text() {
        let mut graph = graph();
        let c = graph.add_new(ConstNumber::NODE_TYPE).unwrap();
        let w = graph.add_new(Watch::NODE_TYPE).unwrap();
        graph.connect(&c, 0, &w, 0).unwrap();
        graph.set_property(&c, "value", json!("4.5")).unwrap();
        graph.run_step(1, None).unwrap();
        assert_eq!(watched(&graph, &w), Some(json!(4.5)));
    }

    #[test]
    fn test_watch_reads_on_connect() {
        let mut graph = graph();
        let c = graph.add_new(ConstString::NODE_TYPE).unwrap();
        graph.set_property(&c, "value", json!("hi")).unwrap();
        let w = graph.add_new(Watch::NODE_TYPE).unwrap();
        graph.connect(&c, 0, &w, 0).unwrap();
        // no step has run; the origin was executed for the forced read
        assert_eq!(watched(&graph, &w), Some(json!("hi")));
    }

    #[test]
    fn test_boolean_toggle() {
        let mut graph = immediate_graph();
        let b = graph.add_new(ConstBoolean::NODE_TYPE).unwrap();
        graph.action_do(&b, "toggle", Value::Null, ExecOptions::default(), Some(0)).unwrap();
        let node = graph.get_node(&b).unwrap();
        assert_eq!(node.property("value"), Some(&json!(false)));
        assert_eq!(node.get_output_data(0), Some(&json!(false)));
    }

    #[test]
    fn test_time_outputs_both_units() {
        let mut graph = graph();
        let t = graph.add_new(Time::NODE_TYPE).unwrap();
        graph.run_step(1, None).unwrap();
        let node = graph.get_node(&t).unwrap();
        let ms = node.get_output_data(0).and_then(Value::as_f64).unwrap();
        let sec = node.get_output_data(1).and_then(Value::as_f64).unwrap();
        assert!((ms - sec * 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_watch_format() {
        assert_eq!(Watch::format(None), "null");
        assert_eq!(Watch::format(Some(&json!(1))), "1.000");
        assert_eq!(Watch::format(Some(&json!([1, "a"]))), "[1.000,a]");
    }
}
