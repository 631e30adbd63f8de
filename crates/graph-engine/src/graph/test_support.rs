//! Node types and helpers shared by the graph tests

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::callback::CallbackHandler;
use crate::config::RuntimeConfig;
use crate::descriptor::{NodeDescriptor, NodeTypeMetadata};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeContext};
use crate::impl_as_any;
use crate::node::{ExecOptions, NodeBehavior};
use crate::runtime::Runtime;

/// Outputs its `value` property
#[derive(Default)]
pub struct ConstNode;

impl NodeDescriptor for ConstNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/const", "Const")
            .output("value", "number")
            .property("value", json!(1.0))
    }
}

impl NodeBehavior for ConstNode {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let value = ctx.property("value").unwrap_or(Value::Null);
        ctx.set_output_data(0, value);
        Ok(())
    }

    impl_as_any!();
}

/// Adds its two inputs and counts its executions in the `runs` property
#[derive(Default)]
pub struct SumNode;

impl NodeDescriptor for SumNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/sum", "Sum")
            .input("A", "number")
            .input("B", "number")
            .output("A+B", "number")
            .property("runs", json!(0))
    }
}

impl NodeBehavior for SumNode {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let a = ctx.input_data(0).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let b = ctx.input_data(1).and_then(|v| v.as_f64()).unwrap_or(0.0);
        ctx.set_output_data(0, json!(a + b));
        let runs = ctx.property("runs").and_then(|v| v.as_u64()).unwrap_or(0);
        ctx.set_property("runs", json!(runs + 1))?;
        Ok(())
    }

    impl_as_any!();
}

/// Fires its EVENT output on every execution
#[derive(Default)]
pub struct EmitterNode;

impl NodeDescriptor for EmitterNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/emitter", "Emitter").event("out")
    }
}

impl NodeBehavior for EmitterNode {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, param: &Value, _options: &ExecOptions) -> Result<()> {
        ctx.trigger_slot(0, param.clone())
    }

    impl_as_any!();
}

/// Re-fires every action it receives on its EVENT output
#[derive(Default)]
pub struct RelayNode;

impl NodeDescriptor for RelayNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/relay", "Relay").action("in").event("out")
    }
}

impl NodeBehavior for RelayNode {
    fn handles_actions(&self) -> bool {
        true
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _action: &str,
        param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        ctx.trigger_slot(0, param.clone())
    }

    impl_as_any!();
}

/// Records every action it receives
#[derive(Default)]
pub struct SinkNode {
    pub received: Vec<(String, Option<String>)>,
}

impl NodeDescriptor for SinkNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/sink", "Sink").action("a").action("b")
    }
}

impl NodeBehavior for SinkNode {
    fn handles_actions(&self) -> bool {
        true
    }

    fn on_action(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        action: &str,
        _param: &Value,
        options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        self.received.push((action.to_string(), options.action_call.clone()));
        Ok(())
    }

    impl_as_any!();
}

/// Executes and handles actions, counting both
#[derive(Default)]
pub struct CounterNode {
    pub executions: usize,
    pub actions: Vec<String>,
}

impl NodeDescriptor for CounterNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/counter", "Counter")
            .action("inc")
            .input("value", "number")
            .output("count", "number")
    }
}

impl NodeBehavior for CounterNode {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        self.executions += 1;
        ctx.set_output_data(0, json!(self.executions));
        Ok(())
    }

    fn on_action(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        action: &str,
        _param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        self.actions.push(action.to_string());
        Ok(())
    }

    impl_as_any!();
}

/// Fails on every execution
#[derive(Default)]
pub struct FailingNode;

impl NodeDescriptor for FailingNode {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new("test/failing", "Failing").output("out", "number")
    }
}

impl NodeBehavior for FailingNode {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(&mut self, _ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        Err(GraphError::failed("boom"))
    }

    impl_as_any!();
}

pub fn test_runtime() -> Arc<Runtime> {
    test_runtime_with(RuntimeConfig::default())
}

pub fn test_runtime_with(config: RuntimeConfig) -> Arc<Runtime> {
    let runtime = Runtime::new(config);
    runtime.register_type::<ConstNode>().unwrap();
    runtime.register_type::<SumNode>().unwrap();
    runtime.register_type::<EmitterNode>().unwrap();
    runtime.register_type::<RelayNode>().unwrap();
    runtime.register_type::<SinkNode>().unwrap();
    runtime.register_type::<CounterNode>().unwrap();
    runtime.register_type::<FailingNode>().unwrap();
    runtime
}

pub fn test_graph() -> Graph {
    Graph::new(test_runtime())
}

/// Record the names of the given hooks as they fire
pub fn hook_log(callbacks: &mut CallbackHandler, names: &[&str]) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in names {
        let log = log.clone();
        callbacks.register(name, 0, move |info, _| {
            log.lock().push(info.name.to_string());
            None
        });
    }
    log
}
