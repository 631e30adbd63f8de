//! Nested graphs
//!
//! A `graph/subgraph` node owns a whole [`Graph`]. Inside it, `graph/input`
//! and `graph/output` nodes declare the named global inputs and outputs of
//! that graph. The inner graph queues every such change and the outer graph
//! mirrors it onto the slots of the subgraph node once the hook that caused
//! it returns.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::descriptor::{NodeDescriptor, NodeTypeMetadata};
use crate::error::Result;
use crate::graph::{Graph, NodeContext};
use crate::impl_as_any;
use crate::node::{ExecOptions, Node, NodeBehavior};
use crate::registry::{NodeFactory, NodeRegistry};
use crate::runtime::Runtime;
use crate::types::{is_valid_connection, Id, SlotType};

pub const SUBGRAPH_TYPE: &str = "graph/subgraph";
pub const GRAPH_INPUT_TYPE: &str = "graph/input";
pub const GRAPH_OUTPUT_TYPE: &str = "graph/output";

/// Taken by the subgraph node's own property
const RESERVED_NAME: &str = "enabled";

/// Register the subgraph node and its input/output nodes
pub(crate) fn register_builtins(registry: &mut NodeRegistry) {
    let factory: NodeFactory =
        Arc::new(|runtime: &Arc<Runtime>| Box::new(Subgraph::new(runtime.clone())) as Box<dyn NodeBehavior>);
    let results = [
        registry.register(Subgraph::descriptor(), factory),
        registry.register_type::<GraphInput>(),
        registry.register_type::<GraphOutput>(),
    ];
    for result in results {
        if let Err(e) = result {
            log::error!("Failed to register a built-in graph node: {}", e);
        }
    }
}

/// A node whose body is a graph
pub struct Subgraph {
    graph: Graph,
}

impl Subgraph {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            graph: Graph::nested(runtime),
        }
    }
}

impl NodeDescriptor for Subgraph {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(SUBGRAPH_TYPE, "Subgraph")
            .with_description("Graph inside a node")
            .property(RESERVED_NAME, json!(true))
    }
}

impl NodeBehavior for Subgraph {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    /// Inputs in, one inner step, outputs out
    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let enabled = ctx.input_or_property(RESERVED_NAME).map_or(true, |v| v.as_bool() != Some(false));
        if !enabled {
            return Ok(());
        }

        let inputs: Vec<String> = ctx.node()?.inputs().iter().map(|s| s.name.clone()).collect();
        for (slot, name) in inputs.iter().enumerate() {
            let value = ctx.input_data(slot).unwrap_or(Value::Null);
            self.graph.set_global_input_data(name, value);
        }

        log::trace!("Node {}: running inner step", ctx.node_id());
        self.graph.run_step(1, None)?;

        let outputs: Vec<String> = ctx.node()?.outputs().iter().map(|s| s.name.clone()).collect();
        for (slot, name) in outputs.iter().enumerate() {
            let value = self.graph.get_global_output_data(name).cloned().unwrap_or(Value::Null);
            ctx.set_output_data(slot, value);
        }
        Ok(())
    }

    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        action: &str,
        param: &Value,
        options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        if !self.graph.on_action(action, param.clone(), options.clone())? {
            log::debug!("Node {}: inner graph has no input '{}'", ctx.node_id(), action);
        }
        Ok(())
    }

    fn on_configure(&mut self, ctx: &mut NodeContext<'_>, data: &Value) -> Result<()> {
        ctx.node_mut()?.extra.remove("subgraph");
        let Some(inner) = data.get("subgraph") else {
            return Ok(());
        };
        if self.graph.configure(inner, false)? {
            log::warn!("Node {}: inner graph loaded with errors", ctx.node_id());
        }
        Ok(())
    }

    fn on_serialize(&self, _node: &Node, data: &mut Map<String, Value>) {
        data.insert("subgraph".into(), self.graph.serialize());
    }

    fn prepare_clone(&self, data: &mut Map<String, Value>, use_uuids: bool) {
        if !use_uuids {
            return;
        }
        if let Some(inner) = data.get_mut("subgraph") {
            reassign_ids(inner);
        }
    }

    fn subgraph(&self) -> Option<&Graph> {
        Some(&self.graph)
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        Some(&mut self.graph)
    }

    impl_as_any!();
}

/// Which global slot list of the graph a node declares an entry in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

/// Declares a global input of its graph and outputs its value
#[derive(Default)]
pub struct GraphInput {
    name_in_graph: Option<String>,
}

impl NodeDescriptor for GraphInput {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(GRAPH_INPUT_TYPE, "Input")
            .with_description("Input of the graph")
            .output("", "number")
            .property("name", json!(""))
            .property("type", json!("number"))
            .property("value", json!(0))
    }
}

impl NodeBehavior for GraphInput {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let name = ctx.property("name").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
        let value = ctx
            .graph()
            .get_global_input_data(&name)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| ctx.property("value"))
            .unwrap_or(Value::Null);
        ctx.set_output_data(0, value);
        Ok(())
    }

    /// EVENT inputs pass actions through
    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        action: &str,
        param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        let is_event = ctx.node()?.output(0).is_some_and(|s| s.slot_type.is_event());
        if !is_event {
            log::debug!("Node {}: ignoring action '{}' on a data input", ctx.node_id(), action);
            return Ok(());
        }
        ctx.trigger_slot(0, param.clone())
    }

    fn on_property_changed(
        &mut self,
        ctx: &mut NodeContext<'_>,
        name: &str,
        value: &Value,
        _prev: Option<&Value>,
    ) -> bool {
        match name {
            "name" => claim_name(ctx, Side::Input, &mut self.name_in_graph, value),
            "type" => {
                if let Err(e) = update_type(ctx, Side::Input, self.name_in_graph.as_deref()) {
                    log::warn!("Node {}: could not retype graph input: {}", ctx.node_id(), e);
                }
                true
            }
            _ => true,
        }
    }

    fn on_configure(&mut self, ctx: &mut NodeContext<'_>, _data: &Value) -> Result<()> {
        update_type(ctx, Side::Input, self.name_in_graph.as_deref())
    }

    fn on_removed(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(name) = self.name_in_graph.take() {
            ctx.graph_mut().remove_global_input(&name);
        }
    }

    impl_as_any!();
}

/// Declares a global output of its graph and writes its input into it
#[derive(Default)]
pub struct GraphOutput {
    name_in_graph: Option<String>,
}

impl NodeDescriptor for GraphOutput {
    fn descriptor() -> NodeTypeMetadata {
        NodeTypeMetadata::new(GRAPH_OUTPUT_TYPE, "Output")
            .with_description("Output of the graph")
            .input("", SlotType::Any)
            .property("name", json!(""))
            .property("type", json!(""))
    }
}

impl NodeBehavior for GraphOutput {
    fn executes(&self) -> bool {
        true
    }

    fn handles_actions(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut NodeContext<'_>, _param: &Value, _options: &ExecOptions) -> Result<()> {
        let Some(name) = self.name_in_graph.clone() else {
            return Ok(());
        };
        let value = ctx.input_data(0).unwrap_or(Value::Null);
        ctx.graph_mut().set_global_output_data(&name, value);
        Ok(())
    }

    /// EVENT outputs become graph-level triggers
    fn on_action(
        &mut self,
        ctx: &mut NodeContext<'_>,
        action: &str,
        param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        let is_event = ctx.node()?.input(0).is_some_and(|s| s.slot_type.is_event());
        match (&self.name_in_graph, is_event) {
            (Some(name), true) => ctx.graph_mut().trigger_event(name, param.clone()),
            _ => log::debug!("Node {}: ignoring action '{}' on a data output", ctx.node_id(), action),
        }
        Ok(())
    }

    fn on_property_changed(
        &mut self,
        ctx: &mut NodeContext<'_>,
        name: &str,
        value: &Value,
        _prev: Option<&Value>,
    ) -> bool {
        match name {
            "name" => claim_name(ctx, Side::Output, &mut self.name_in_graph, value),
            "type" => {
                if let Err(e) = update_type(ctx, Side::Output, self.name_in_graph.as_deref()) {
                    log::warn!("Node {}: could not retype graph output: {}", ctx.node_id(), e);
                }
                true
            }
            _ => true,
        }
    }

    fn on_configure(&mut self, ctx: &mut NodeContext<'_>, _data: &Value) -> Result<()> {
        update_type(ctx, Side::Output, self.name_in_graph.as_deref())
    }

    fn on_removed(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(name) = self.name_in_graph.take() {
            ctx.graph_mut().remove_global_output(&name);
        }
    }

    impl_as_any!();
}

/// Register or rename the graph entry backing a node; false refuses the name
fn claim_name(ctx: &mut NodeContext<'_>, side: Side, current: &mut Option<String>, value: &Value) -> bool {
    let Some(new) = value.as_str() else {
        return false;
    };
    if new.is_empty() || new == RESERVED_NAME || current.as_deref() == Some(new) {
        return false;
    }
    let slot_type = ctx.property("type").map(|t| io_slot_type(&t)).unwrap_or_default();
    let initial = ctx.property("value").unwrap_or(Value::Null);
    let graph = ctx.graph_mut();
    let claimed = match (side, current.as_deref()) {
        (Side::Input, Some(old)) => graph.rename_global_input(old, new),
        (Side::Input, None) => graph.add_global_input(new, slot_type, initial),
        (Side::Output, Some(old)) => graph.rename_global_output(old, new),
        (Side::Output, None) => graph.add_global_output(new, slot_type, Value::Null),
    };
    if !claimed {
        log::debug!("Node {}: graph {:?} '{}' is taken", ctx.node_id(), side, new);
        return false;
    }
    *current = Some(new.to_string());
    true
}

/// Retype the node's slot and its graph entry after the `type` property
///
/// Links that no longer fit the new type are disconnected.
fn update_type(ctx: &mut NodeContext<'_>, side: Side, name_in_graph: Option<&str>) -> Result<()> {
    let Some(raw) = ctx.property("type") else {
        return Ok(());
    };
    let slot_type = io_slot_type(&raw);
    let id = ctx.node_id().clone();
    let node = ctx.node()?;
    let current = match side {
        Side::Input => node.output(0).map(|s| s.slot_type.clone()),
        Side::Output => node.input(0).map(|s| s.slot_type.clone()),
    };

    if let Some(current) = current.filter(|t| t != &slot_type) {
        if !is_valid_connection(&current, &slot_type) {
            match side {
                Side::Input => ctx.graph_mut().disconnect_output(&id, 0, None)?,
                Side::Output => ctx.graph_mut().disconnect_input(&id, 0)?,
            };
        }
        let node = ctx.node_mut()?;
        match side {
            Side::Input => {
                if let Some(slot) = node.output_mut(0) {
                    slot.slot_type = slot_type.clone();
                }
            }
            Side::Output => {
                if let Some(slot) = node.input_mut(0) {
                    slot.slot_type = slot_type.clone();
                }
            }
        }
    }
    ctx.set_property("type", Value::from(slot_type.clone()))?;

    if side == Side::Input {
        let value = ctx.property("value").unwrap_or(Value::Null);
        ctx.set_property("value", coerce_value(&slot_type, value))?;
    }
    if let Some(name) = name_in_graph {
        let graph = ctx.graph_mut();
        match side {
            Side::Input => graph.change_global_input_type(name, slot_type),
            Side::Output => graph.change_global_output_type(name, slot_type),
        };
    }
    Ok(())
}

/// `"event"` and `"action"` name the EVENT type in these properties
fn io_slot_type(value: &Value) -> SlotType {
    match value.as_str() {
        Some("event") | Some("action") => SlotType::Event,
        _ => SlotType::from(value.clone()),
    }
}

/// Convert a default value to the scalar types the input node knows
fn coerce_value(slot_type: &SlotType, value: Value) -> Value {
    let SlotType::Named(name) = slot_type else {
        return value;
    };
    match name.as_str() {
        "number" => match value {
            Value::Number(_) => value,
            Value::String(s) => s.trim().parse::<f64>().map(|n| json!(n)).unwrap_or(json!(0)),
            Value::Bool(b) => json!(u8::from(b)),
            _ => json!(0),
        },
        "boolean" => Value::Bool(match &value {
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }),
        "string" => match value {
            Value::String(_) => value,
            Value::Null => json!(""),
            other => Value::String(other.to_string()),
        },
        _ => value,
    }
}

/// Give every node and link of a serialized graph a fresh UUID, nested graphs included
fn reassign_ids(graph: &mut Value) {
    let mut node_ids: HashMap<Id, Id> = HashMap::new();
    for node in nodes_mut(graph) {
        let fresh = Id::new_uuid();
        if let Some(old) = node.get("id").and_then(Id::from_value) {
            node_ids.insert(old, fresh.clone());
        }
        node.insert("id".into(), json!(fresh));
        if let Some(inner) = node.get_mut("subgraph") {
            reassign_ids(inner);
        }
    }

    let mut link_ids: HashMap<Id, Id> = HashMap::new();
    let links = graph.get_mut("links").and_then(Value::as_array_mut);
    for link in links.into_iter().flatten() {
        let fresh = Id::new_uuid();
        let (id, ends) = match link {
            Value::Array(fields) if fields.len() >= 4 => {
                let (id, rest) = fields.split_at_mut(1);
                let (origin, target) = rest.split_at_mut(2);
                (&mut id[0], [&mut origin[0], &mut target[0]])
            }
            Value::Object(fields) => {
                let mut id = None;
                let mut ends = Vec::new();
                for (key, value) in fields.iter_mut() {
                    match key.as_str() {
                        "id" => id = Some(value),
                        "origin_id" | "target_id" => ends.push(value),
                        _ => {}
                    }
                }
                for end in ends {
                    remap_id(end, &node_ids);
                }
                if let Some(id) = id {
                    if let Some(old) = Id::from_value(id) {
                        link_ids.insert(old, fresh.clone());
                    }
                    *id = json!(fresh);
                }
                continue;
            }
            _ => continue,
        };
        if let Some(old) = Id::from_value(id) {
            link_ids.insert(old, fresh.clone());
        }
        *id = json!(fresh);
        for end in ends {
            remap_id(end, &node_ids);
        }
    }

    for node in nodes_mut(graph) {
        for input in node.get_mut("inputs").and_then(Value::as_array_mut).into_iter().flatten() {
            if let Some(link) = input.get_mut("link") {
                remap_id(link, &link_ids);
            }
        }
        for output in node.get_mut("outputs").and_then(Value::as_array_mut).into_iter().flatten() {
            for link in output.get_mut("links").and_then(Value::as_array_mut).into_iter().flatten() {
                remap_id(link, &link_ids);
            }
        }
    }
}

fn nodes_mut(graph: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    graph
        .get_mut("nodes")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn remap_id(value: &mut Value, ids: &HashMap<Id, Id>) {
    if let Some(new) = Id::from_value(value).and_then(|old| ids.get(&old)) {
        *value = json!(new);
    }
}
