//! Logic nodes
//!
//! Boolean gates read every input slot the node has, so inputs added at
//! runtime take part as well. `logic/IF` turns a condition into one of two
//! events.

use graph_engine::{
    impl_as_any, ExecOptions, Node, NodeBehavior, NodeContext, NodeDescriptor, NodeMode, NodeTypeMetadata,
    Result,
};
use serde_json::{json, Value};

use crate::truthy;

fn input_values(ctx: &mut NodeContext<'_>) -> Result<Vec<Option<Value>>> {
    let count = ctx.node()?.inputs().len();
    Ok((0..count).map(|slot| ctx.input_data(slot)).collect())
}

/// True when every input is true
#[derive(Default)]
pub struct LogicAnd;

impl LogicAnd {
    pub const NODE_TYPE: &'static str = "logic/AND";
}

impl NodeDescriptor for LogicAnd {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "AND")
            .with_description("Return true if all inputs are true")
            .input("a", "boolean")
            .input("b", "boolean")
            .output("out", "boolean")
    }
}

impl NodeBehavior for LogicAnd {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let result = input_values(ctx)?.iter().all(|v| truthy(v.as_ref()));
        ctx.set_output_data(0, json!(result));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogicAnd>());

/// True when at least one input is true
#[derive(Default)]
pub struct LogicOr;

impl LogicOr {
    pub const NODE_TYPE: &'static str = "logic/OR";
}

impl NodeDescriptor for LogicOr {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "OR")
            .with_description("Return true if at least one input is true")
            .input("a", "boolean")
            .input("b", "boolean")
            .output("out", "boolean")
    }
}

impl NodeBehavior for LogicOr {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let result = input_values(ctx)?.iter().any(|v| truthy(v.as_ref()));
        ctx.set_output_data(0, json!(result));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogicOr>());

#[derive(Default)]
pub struct LogicNot;

impl LogicNot {
    pub const NODE_TYPE: &'static str = "logic/NOT";
}

impl NodeDescriptor for LogicNot {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "NOT")
            .with_description("Return the logical negation")
            .input("in", "boolean")
            .output("out", "boolean")
    }
}

impl NodeBehavior for LogicNot {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let input = ctx.input_data(0);
        ctx.set_output_data(0, json!(!truthy(input.as_ref())));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogicNot>());

/// True when all inputs hold the same value
#[derive(Default)]
pub struct LogicCompare;

impl LogicCompare {
    pub const NODE_TYPE: &'static str = "logic/CompareBool";
}

impl NodeDescriptor for LogicCompare {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "bool == bool")
            .with_description("Compare for logical equality")
            .input("a", "boolean")
            .input("b", "boolean")
            .output("out", "boolean")
    }
}

impl NodeBehavior for LogicCompare {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let values = input_values(ctx)?;
        let result = values.windows(2).all(|pair| pair[0] == pair[1]);
        ctx.set_output_data(0, json!(result));
        Ok(())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogicCompare>());

/// Fires `true` or `false` when triggered, depending on `condition`
///
/// Created in ON_TRIGGER mode, so it only runs when an event reaches its
/// `onTrigger` input.
#[derive(Default)]
pub struct LogicBranch;

impl LogicBranch {
    pub const NODE_TYPE: &'static str = "logic/IF";
}

impl NodeDescriptor for LogicBranch {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(Self::NODE_TYPE, "Branch")
            .with_description("Branch execution on condition")
            .action("onTrigger")
            .input("condition", "boolean")
            .event("true")
            .event("false")
    }
}

impl NodeBehavior for LogicBranch {
    fn init(&mut self, node: &mut Node) {
        node.mode = NodeMode::OnTrigger;
    }

    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, param: &Value, _options: &ExecOptions) -> Result<()> {
        let condition = truthy(ctx.input_data(1).as_ref());
        ctx.trigger_slot(if condition { 0 } else { 1 }, param.clone())
    }

    impl_as_any!();
}

inventory::submit!(graph_engine::NodeTypeFn::new::<LogicBranch>());
