//! Execution and action dispatch
//!
//! Two paths drive a node. The pull path (`do_execute`) runs its execute
//! behaviour, once per step from the step loop or when triggered through an
//! `onTrigger` input. The push path (`trigger_slot` / `action_do`) walks the
//! links of an EVENT output and delivers an action to every target, either
//! immediately or queued until the target's next execution.
//!
//! Every dispatch carries an `action_call` token. The per-step guard maps
//! use it to skip re-entrant and duplicate deliveries.

use std::collections::{HashSet, VecDeque};

use serde_json::{json, Value};
use uuid::Uuid;

use crate::constants::{hooks, slots};
use crate::error::{GraphError, Result};
use crate::events::GraphEvent;
use crate::graph::Graph;
use crate::link::Link;
use crate::node::{ExecOptions, PendingAction};
use crate::slot::{InputSlot, OutputSlot};
use crate::types::{LinkId, NodeId, NodeMode, SlotRef, SlotType};

/// Which ancestors [`Graph::get_ancestors`] returns and walks through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestorFilter {
    /// Ancestors in these modes are neither returned nor walked through
    pub modes_skip: Vec<NodeMode>,
    /// When non-empty, only ancestors in these modes are returned
    pub modes_only: Vec<NodeMode>,
    /// Inputs of these types are not followed
    pub types_skip: Vec<SlotType>,
    /// When non-empty, only inputs of these types are followed
    pub types_only: Vec<SlotType>,
}

impl AncestorFilter {
    /// Data ancestors that recompute on demand
    pub fn data_refresh() -> Self {
        Self {
            modes_skip: vec![NodeMode::Never, NodeMode::OnEvent, NodeMode::OnTrigger],
            modes_only: vec![NodeMode::Always, NodeMode::OnRequest],
            types_skip: vec![SlotType::Event],
            types_only: Vec::new(),
        }
    }
}

fn fresh_call(id: &NodeId, kind: &str) -> String {
    format!("{}_{}_{}", id, kind, Uuid::new_v4())
}

impl Graph {
    /// Run the execute path of a node
    ///
    /// A node in NEVER mode, one that is already executing, or one skipped by
    /// the single execution and unique call guards is left alone. Queued
    /// actions are delivered first when deferred actions are enabled.
    pub fn do_execute(&mut self, id: &NodeId, param: Value, mut options: ExecOptions) -> Result<()> {
        let config = self.runtime().config();
        let node = self.node_or_err(id)?;
        if node.mode == NodeMode::Never {
            log::trace!("Node {} is in NEVER mode, not executing", id);
            return Ok(());
        }
        let action_call = options
            .action_call
            .get_or_insert_with(|| fresh_call(id, "exec"))
            .clone();

        if self.nodes_executing.contains(id) {
            return self.skip_duplicate(id, "already executing");
        }
        if config.ensure_node_single_execution && node.exec_version.is_some_and(|v| v >= self.iteration) {
            return self.skip_duplicate(id, "already executed this step");
        }
        if config.ensure_unique_execution_and_action_call
            && self.nodes_executed_action.get(id) == Some(&action_call)
        {
            return self.skip_duplicate(id, "already handled this action call");
        }

        if config.use_deferred_actions && !node.waiting_actions.is_empty() {
            self.execute_pending_actions(id)?;
        }

        self.nodes_executing.insert(id.clone());
        let args = [param.clone(), options.to_value()];
        let mut failure = None;
        self.run_node_hook(id, hooks::ON_EXECUTE, &args, |behavior, ctx| {
            if let Err(e) = behavior.on_execute(ctx, &param, &options) {
                failure = Some(e);
            }
            None
        });
        self.nodes_executing.remove(id);
        if let Some(error) = failure {
            return self.execution_failed(id, error);
        }

        let iteration = self.iteration;
        if let Some(node) = self.nodes.get_mut(id) {
            node.exec_version = Some(iteration);
            node.action_call = Some(action_call.clone());
        }
        self.nodes_executed_action.insert(id.clone(), action_call.clone());
        self.emit(GraphEvent::NodeExecuted {
            node_id: id.clone(),
            action_call: Some(action_call),
        });

        let outcome = self.run_node_hook(id, hooks::ON_AFTER_EXECUTE_NODE, &args, |_, _| None);
        if !outcome.default_prevented {
            self.trigger_executed_slot(id, param, options)?;
        }
        Ok(())
    }

    /// Deliver an action to a node's action path
    pub fn action_do(
        &mut self,
        id: &NodeId,
        action: &str,
        param: Value,
        mut options: ExecOptions,
        slot: Option<usize>,
    ) -> Result<()> {
        let config = self.runtime().config();
        self.node_or_err(id)?;
        let kind = if action.is_empty() { "action" } else { action };
        let action_call = options
            .action_call
            .get_or_insert_with(|| fresh_call(id, kind))
            .clone();

        if config.ensure_node_single_action && self.nodes_actioning.get(id) == Some(&action_call) {
            return self.skip_duplicate(id, "already handling this action call");
        }
        if config.ensure_unique_execution_and_action_call
            && self.nodes_executed_action.get(id) == Some(&action_call)
        {
            return self.skip_duplicate(id, "already handled this action call");
        }

        self.nodes_actioning.insert(id.clone(), action_call.clone());
        let args = [json!(action), param.clone(), options.to_value(), json!(slot)];
        let mut failure = None;
        self.run_node_hook(id, hooks::ON_ACTION, &args, |behavior, ctx| {
            if let Err(e) = behavior.on_action(ctx, action, &param, &options, slot) {
                failure = Some(e);
            }
            None
        });
        self.nodes_actioning.remove(id);
        if let Some(error) = failure {
            return self.execution_failed(id, error);
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.action_call = Some(action_call.clone());
        }
        self.nodes_executed_action.insert(id.clone(), action_call.clone());
        self.emit(GraphEvent::ActionDispatched {
            node_id: id.clone(),
            action: action.to_string(),
            action_call: Some(action_call),
        });

        let args = [param.clone(), options.to_value()];
        let outcome = self.run_node_hook(id, hooks::ON_AFTER_ACTIONED_NODE, &args, |_, _| None);
        if !outcome.default_prevented {
            self.trigger_executed_slot(id, param, options)?;
        }
        Ok(())
    }

    fn skip_duplicate(&self, id: &NodeId, reason: &str) -> Result<()> {
        log::debug!("Node {}: skipped, {}", id, reason);
        self.emit(GraphEvent::DuplicateSkipped {
            node_id: id.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Apply the error policy to a failed node hook
    fn execution_failed(&self, id: &NodeId, error: GraphError) -> Result<()> {
        if !self.runtime().config().catch_exceptions {
            return Err(error);
        }
        log::error!("Node {} failed: {}", id, error);
        self.emit(GraphEvent::NodeFailed {
            node_id: id.clone(),
            error: error.to_string(),
        });
        Ok(())
    }

    fn trigger_executed_slot(&mut self, id: &NodeId, param: Value, options: ExecOptions) -> Result<()> {
        let Some(slot) = self.nodes.get(id).and_then(|n| n.find_output_slot(slots::ON_EXECUTED)) else {
            return Ok(());
        };
        self.trigger_slot(id, slot.into(), param, None, options)
    }

    /// Fire every EVENT output named `action`, or all of them for `None`
    pub fn trigger(&mut self, id: &NodeId, action: Option<&str>, param: Value, options: ExecOptions) -> Result<()> {
        let node = self.node_or_err(id)?;
        let targets: Vec<usize> = node
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.slot_type.is_event() && action.map_or(true, |a| o.name == a))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            log::debug!("Node {}: no EVENT output to trigger for {:?}", id, action);
        }
        for slot in targets {
            self.trigger_slot(id, slot.into(), param.clone(), None, options.clone())?;
        }
        Ok(())
    }

    /// Fire one output slot, delivering to every link or only `link_id`
    ///
    /// Targets reached through an `onTrigger` input (or in ON_TRIGGER mode)
    /// execute; other targets receive an action named after their input.
    /// All deliveries of one call share the same `action_call`.
    pub fn trigger_slot(
        &mut self,
        id: &NodeId,
        slot: SlotRef,
        param: Value,
        link_id: Option<&LinkId>,
        mut options: ExecOptions,
    ) -> Result<()> {
        let node = self.node_or_err(id)?;
        if node.mode == NodeMode::Never {
            return Ok(());
        }
        let Some(index) = node.resolve_output(&slot) else {
            log::debug!("Node {}: output {} not found, nothing to trigger", id, slot);
            return Ok(());
        };
        let links = node.outputs[index].links.clone();
        if links.is_empty() {
            return Ok(());
        }
        if self.ancestors_call {
            log::debug!("Node {}: ancestor refresh in progress, not triggering {}", id, index);
            return Ok(());
        }
        let config = self.runtime().config();
        let now = self.globaltime;
        self.last_trigger_time = Some(now);

        for current in links {
            if link_id.is_some_and(|l| l != &current) {
                continue;
            }
            let Some(link) = self.links.get_mut(&current) else {
                log::debug!("Node {}: output {} refers to missing link {}", id, index, current);
                continue;
            };
            link.last_time = Some(now);
            let (target, target_slot) = (link.target_id.clone(), link.target_slot);
            let Some(target_node) = self.nodes.get(&target) else {
                log::warn!("Link {} points to missing node {}", current, target);
                continue;
            };
            let input_name = target_node.input(target_slot).map(|s| s.name.clone());
            let on_trigger = target_node.mode == NodeMode::OnTrigger
                || input_name.as_deref() == Some(slots::ON_TRIGGER);
            let executes = target_node.executes();
            let handles_actions = target_node.handles_actions();

            if on_trigger {
                options.action_call.get_or_insert_with(|| fresh_call(id, "trigg"));
                if config.refresh_ancestors_on_triggers {
                    self.refresh_ancestors(&target, "trigger", &param, &options)?;
                }
                if executes {
                    self.do_execute(&target, param.clone(), options.clone())?;
                }
            } else if handles_actions {
                options.action_call.get_or_insert_with(|| fresh_call(id, "act"));
                let action = input_name.unwrap_or_default();
                if config.refresh_ancestors_on_actions {
                    self.refresh_ancestors(&target, &action, &param, &options)?;
                }
                if config.use_deferred_actions && executes {
                    log::trace!("Node {}: deferring action '{}'", target, action);
                    if let Some(node) = self.nodes.get_mut(&target) {
                        node.waiting_actions.push(PendingAction {
                            action: action.clone(),
                            param: param.clone(),
                            options: options.clone(),
                            slot: Some(target_slot),
                        });
                    }
                    self.emit(GraphEvent::ActionDeferred { node_id: target, action });
                } else {
                    self.action_do(&target, &action, param.clone(), options.clone(), Some(target_slot))?;
                }
            } else {
                log::debug!("Node {} has no action path for input {}", target, target_slot);
            }
        }
        Ok(())
    }

    /// Forget when the links of an output were last triggered
    pub fn clear_triggered_slot(&mut self, id: &NodeId, slot: SlotRef, link_id: Option<&LinkId>) -> Result<()> {
        let node = self.node_or_err(id)?;
        let Some(index) = node.resolve_output(&slot) else {
            return Ok(());
        };
        for current in node.outputs[index].links.clone() {
            if link_id.is_some_and(|l| l != &current) {
                continue;
            }
            if let Some(link) = self.links.get_mut(&current) {
                link.last_time = None;
            }
        }
        Ok(())
    }

    /// Deliver the actions queued on a node
    pub fn execute_pending_actions(&mut self, id: &NodeId) -> Result<()> {
        let pending = std::mem::take(&mut self.node_mut_or_err(id)?.waiting_actions);
        for action in pending {
            self.action_do(id, &action.action, action.param, action.options, action.slot)?;
        }
        Ok(())
    }

    /// Re-execute the data ancestors of a node before it handles a trigger
    ///
    /// EVENT outputs of the ancestors do not fire while they recompute.
    /// Returns false when the node has no inputs or its subtree was already
    /// recomputed in this step (with ancestor recalculation prevented).
    pub fn refresh_ancestors(&mut self, id: &NodeId, action: &str, param: &Value, options: &ExecOptions) -> Result<bool> {
        let config = self.runtime().config();
        if self.node_or_err(id)?.inputs.is_empty() {
            return Ok(false);
        }
        if config.prevent_ancestor_recalculation && self.node_ancestors_calculated.contains(id) {
            log::trace!("Node {}: ancestors already recomputed", id);
            return Ok(false);
        }
        let action = if action.is_empty() {
            format!("{}_ancestors", id)
        } else {
            action.to_string()
        };
        let param = match param {
            Value::Null => json!(format!("{}_ancestors", id)),
            Value::String(s) if s.is_empty() => json!(format!("{}_ancestors", id)),
            other => other.clone(),
        };
        let mut options = options.clone();
        options.action_call.get_or_insert(action);

        let outer_call = std::mem::replace(&mut self.ancestors_call, true);
        let mut result = Ok(true);
        for ancestor in self.get_ancestors(id, &AncestorFilter::data_refresh()) {
            if let Err(e) = self.do_execute(&ancestor, param.clone(), options.clone()) {
                result = Err(e);
                break;
            }
            self.node_ancestors_calculated.insert(ancestor);
        }
        self.ancestors_call = outer_call;
        self.node_ancestors_calculated.insert(id.clone());
        result
    }

    /// Nodes upstream of `id` through its inputs, in execution order
    pub fn get_ancestors(&self, id: &NodeId, filter: &AncestorFilter) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = VecDeque::from([id.clone()]);

        while let Some(current) = pending.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else { continue };
            if &current != id {
                if filter.modes_skip.contains(&node.mode) {
                    continue;
                }
                if !filter.modes_only.is_empty() && !filter.modes_only.contains(&node.mode) {
                    continue;
                }
                ancestors.push(current.clone());
            }
            for (slot, input) in node.inputs.iter().enumerate() {
                if filter.types_skip.contains(&input.slot_type) {
                    continue;
                }
                if !filter.types_only.is_empty() && !filter.types_only.contains(&input.slot_type) {
                    continue;
                }
                if let Some(origin) = self.get_input_node(&current, slot) {
                    if !visited.contains(&origin) {
                        pending.push_back(origin);
                    }
                }
            }
        }
        ancestors.sort_by_key(|a| self.nodes.get(a).map_or(usize::MAX, |n| n.order));
        ancestors
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Data travelling on the link of an input
    ///
    /// ACTION inputs and unconnected inputs yield `None`. With
    /// `force_update` the origin node executes first, after its own
    /// ancestors when `refresh_tree` is set.
    pub fn get_input_data(
        &mut self,
        id: &NodeId,
        slot: SlotRef,
        force_update: bool,
        refresh_tree: bool,
    ) -> Result<Option<Value>> {
        let node = self.node_or_err(id)?;
        let Some(input) = node.resolve_input(&slot).map(|i| &node.inputs[i]) else {
            return Ok(None);
        };
        if input.slot_type.is_event() {
            return Ok(None);
        }
        let Some(link_id) = input.link.clone() else {
            return Ok(None);
        };
        let Some(link) = self.links.get(&link_id) else {
            log::debug!("Node {}: input {} refers to missing link {}", id, slot, link_id);
            return Ok(None);
        };
        if !force_update {
            return Ok(link.data.clone());
        }
        let origin = link.origin_id.clone();
        if !self.nodes.contains_key(&origin) {
            return Ok(link.data.clone());
        }
        if refresh_tree {
            let call = fresh_call(id, "getInputData_forced");
            self.refresh_ancestors(id, &call, &Value::Null, &ExecOptions::with_action_call(call.clone()))?;
        }
        self.do_execute(&origin, Value::Null, ExecOptions::default())?;
        Ok(self.links.get(&link_id).and_then(|l| l.data.clone()))
    }

    /// Type of the output feeding an input
    pub fn get_input_data_type(&self, id: &NodeId, slot: SlotRef) -> Option<SlotType> {
        let link = self.get_input_link(id, slot)?;
        let origin_type = self
            .nodes
            .get(&link.origin_id)
            .and_then(|n| n.output(link.origin_slot))
            .map(|o| o.slot_type.clone());
        Some(origin_type.unwrap_or_else(|| link.link_type.clone()))
    }

    /// Data on the input named `name` when connected, else the property of that name
    pub fn get_input_or_property(&self, id: &NodeId, name: &str) -> Option<Value> {
        let node = self.nodes.get(id)?;
        let linked = node
            .inputs
            .iter()
            .filter(|i| i.name == name)
            .find_map(|i| i.link.as_ref().and_then(|l| self.links.get(l)));
        match linked {
            Some(link) => link.data.clone(),
            None => node.properties.get(name).cloned(),
        }
    }

    /// Store a value on an output and on every link leaving it
    pub fn set_output_data(&mut self, id: &NodeId, slot: SlotRef, value: Value) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let Some(index) = node.resolve_output(&slot) else {
            return false;
        };
        let output = &mut node.outputs[index];
        for link_id in &output.links {
            if let Some(link) = self.links.get_mut(link_id) {
                link.data = Some(value.clone());
            }
        }
        output.data = Some(value);
        true
    }

    /// Retype an output and the links leaving it
    pub fn set_output_data_type(&mut self, id: &NodeId, slot: SlotRef, slot_type: SlotType) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let Some(index) = node.resolve_output(&slot) else {
            return false;
        };
        let output = &mut node.outputs[index];
        for link_id in &output.links {
            if let Some(link) = self.links.get_mut(link_id) {
                link.link_type = slot_type.clone();
            }
        }
        output.slot_type = slot_type;
        true
    }

    pub fn get_input_info(&self, id: &NodeId, slot: usize) -> Option<&InputSlot> {
        self.nodes.get(id)?.input(slot)
    }

    pub fn get_output_info(&self, id: &NodeId, slot: usize) -> Option<&OutputSlot> {
        self.nodes.get(id)?.output(slot)
    }

    pub fn get_input_link(&self, id: &NodeId, slot: SlotRef) -> Option<&Link> {
        let node = self.nodes.get(id)?;
        let input = node.input(node.resolve_input(&slot)?)?;
        self.links.get(input.link.as_ref()?)
    }

    /// Node feeding an input
    pub fn get_input_node(&self, id: &NodeId, slot: usize) -> Option<NodeId> {
        let link = self.get_input_link(id, slot.into())?;
        self.nodes
            .contains_key(&link.origin_id)
            .then(|| link.origin_id.clone())
    }

    /// Nodes fed by an output
    pub fn get_output_nodes(&self, id: &NodeId, slot: usize) -> Vec<NodeId> {
        let Some(output) = self.nodes.get(id).and_then(|n| n.output(slot)) else {
            return Vec::new();
        };
        output
            .links
            .iter()
            .filter_map(|l| self.links.get(l))
            .filter(|l| self.nodes.contains_key(&l.target_id))
            .map(|l| l.target_id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Properties and mode
    // ------------------------------------------------------------------

    /// Set a property through the node's `onPropertyChanged` hook
    ///
    /// Returns false when the value was unchanged or the hook refused it; a
    /// refused value is reverted.
    pub fn set_property(&mut self, id: &NodeId, name: &str, value: Value) -> Result<bool> {
        let node = self.node_mut_or_err(id)?;
        let prev = node.properties.get(name).cloned();
        if prev.as_ref() == Some(&value) {
            return Ok(false);
        }
        node.properties.insert(name.to_string(), value.clone());

        let args = [json!(name), value.clone(), prev.clone().unwrap_or(Value::Null)];
        let outcome = self.run_node_hook(id, hooks::ON_PROPERTY_CHANGED, &args, |behavior, ctx| {
            Some(Value::Bool(behavior.on_property_changed(ctx, name, &value, prev.as_ref())))
        });
        if outcome.proceeds() {
            return Ok(true);
        }
        log::debug!("Node {}: change of property '{}' refused", id, name);
        if let Some(node) = self.nodes.get_mut(id) {
            match prev {
                Some(prev) => node.properties.insert(name.to_string(), prev),
                None => node.properties.remove(name),
            };
        }
        Ok(false)
    }

    /// Change a node's mode; ON_TRIGGER adds the `onTrigger` input and `onExecuted` output
    pub fn change_mode(&mut self, id: &NodeId, mode: NodeMode) -> Result<()> {
        let node = self.node_mut_or_err(id)?;
        if mode == NodeMode::OnTrigger {
            let mut extra = serde_json::Map::new();
            extra.insert("removable".into(), Value::Bool(true));
            extra.insert("nameLocked".into(), Value::Bool(true));
            if node.find_input_slot(slots::ON_TRIGGER).is_none() {
                node.add_input_with(slots::ON_TRIGGER, SlotType::Event, extra.clone());
            }
            if node.find_output_slot(slots::ON_EXECUTED).is_none() {
                node.add_output_with(slots::ON_EXECUTED, SlotType::Event, extra);
            }
        }
        node.mode = mode;
        self.on_graph_changed("modeChange", true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::test_support::*;
    use super::*;
    use crate::callback::HookResult;
    use crate::config::RuntimeConfig;
    use crate::events::EventLog;

    fn sink_calls(graph: &Graph, id: &NodeId) -> Vec<(String, Option<String>)> {
        graph
            .get_node(id)
            .and_then(|n| n.behavior::<SinkNode>())
            .map(|s| s.received.clone())
            .unwrap_or_default()
    }

    fn counter(graph: &Graph, id: &NodeId) -> (usize, Vec<String>) {
        let c = graph.get_node(id).unwrap().behavior::<CounterNode>().unwrap();
        (c.executions, c.actions.clone())
    }

    #[test]
    fn test_diamond_dispatch_reaches_sink_twice() {
        let config = RuntimeConfig {
            ensure_unique_execution_and_action_call: true,
            ..Default::default()
        };
        let mut graph = Graph::new(test_runtime_with(config));
        let source = graph.add_new("test/emitter").unwrap();
        let a = graph.add_new("test/relay").unwrap();
        let b = graph.add_new("test/relay").unwrap();
        let sink = graph.add_new("test/sink").unwrap();
        graph.connect(&source, 0, &a, 0).unwrap();
        graph.connect(&source, 0, &b, 0).unwrap();
        graph.connect(&a, 0, &sink, "a").unwrap();
        graph.connect(&b, 0, &sink, "b").unwrap();

        graph
            .trigger_slot(&source, 0.into(), json!("go"), None, ExecOptions::default())
            .unwrap();

        let received = sink_calls(&graph, &sink);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].0, "a");
        assert_eq!(received[1].0, "b");
        assert!(received[0].1.is_some());
        assert_ne!(received[0].1, received[1].1);
        // both branches saw the same logical trigger
        let call_a = graph.get_node(&a).unwrap().action_call().map(str::to_string);
        let call_b = graph.get_node(&b).unwrap().action_call().map(str::to_string);
        assert!(call_a.is_some());
        assert_eq!(call_a, call_b);
    }

    #[test]
    fn test_unique_action_call_guard() {
        let config = RuntimeConfig {
            ensure_unique_execution_and_action_call: true,
            ..Default::default()
        };
        let mut graph = Graph::new(test_runtime_with(config));
        let sink = graph.add_new("test/sink").unwrap();
        for _ in 0..2 {
            graph
                .action_do(&sink, "a", Value::Null, ExecOptions::with_action_call("same"), None)
                .unwrap();
        }
        assert_eq!(sink_calls(&graph, &sink).len(), 1);
        graph
            .action_do(&sink, "a", Value::Null, ExecOptions::with_action_call("other"), None)
            .unwrap();
        assert_eq!(sink_calls(&graph, &sink).len(), 2);
    }

    #[test]
    fn test_duplicate_calls_delivered_without_guard() {
        let mut graph = test_graph();
        let sink = graph.add_new("test/sink").unwrap();
        for _ in 0..2 {
            graph
                .action_do(&sink, "a", Value::Null, ExecOptions::with_action_call("same"), None)
                .unwrap();
        }
        assert_eq!(sink_calls(&graph, &sink).len(), 2);
    }

    #[test]
    fn test_action_gets_call_token() {
        let mut graph = test_graph();
        let sink = graph.add_new("test/sink").unwrap();
        graph.action_do(&sink, "b", json!(1), ExecOptions::default(), Some(1)).unwrap();
        let received = sink_calls(&graph, &sink);
        let call = received[0].1.as_deref().unwrap();
        assert!(call.starts_with(&format!("{}_b_", sink)));
    }

    fn single_execution_graph(single: bool) -> (Graph, NodeId) {
        let config = RuntimeConfig {
            ensure_node_single_execution: single,
            use_deferred_actions: false,
            ..Default::default()
        };
        let mut graph = Graph::new(test_runtime_with(config));
        let emitter = graph.add_new("test/emitter").unwrap();
        let target = graph.add_new("test/counter").unwrap();
        graph
            .get_node_mut(&target)
            .unwrap()
            .add_input(slots::ON_TRIGGER, SlotType::Event);
        graph.connect(&emitter, 0, &target, slots::ON_TRIGGER).unwrap();
        (graph, target)
    }

    #[test]
    fn test_single_execution_per_step() {
        let (mut graph, target) = single_execution_graph(true);
        graph.run_step(1, None).unwrap();
        assert_eq!(counter(&graph, &target).0, 1);
        graph.run_step(1, None).unwrap();
        assert_eq!(counter(&graph, &target).0, 2);
    }

    #[test]
    fn test_two_paths_execute_twice_without_guard() {
        let (mut graph, target) = single_execution_graph(false);
        graph.run_step(1, None).unwrap();
        assert_eq!(counter(&graph, &target).0, 2);
    }

    #[test]
    fn test_deferred_action_runs_at_next_execution() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let target = graph.add_new("test/counter").unwrap();
        graph.get_node_mut(&target).unwrap().mode = NodeMode::OnEvent;
        graph.connect(&emitter, 0, &target, "inc").unwrap();

        graph
            .trigger_slot(&emitter, 0.into(), Value::Null, None, ExecOptions::default())
            .unwrap();
        assert_eq!(graph.get_node(&target).unwrap().pending_actions().len(), 1);
        assert!(counter(&graph, &target).1.is_empty());

        graph.do_execute(&target, Value::Null, ExecOptions::default()).unwrap();
        assert!(graph.get_node(&target).unwrap().pending_actions().is_empty());
        assert_eq!(counter(&graph, &target), (1, vec!["inc".to_string()]));
    }

    #[test]
    fn test_immediate_action_without_deferral() {
        let config = RuntimeConfig {
            use_deferred_actions: false,
            ..Default::default()
        };
        let mut graph = Graph::new(test_runtime_with(config));
        let emitter = graph.add_new("test/emitter").unwrap();
        let target = graph.add_new("test/counter").unwrap();
        graph.connect(&emitter, 0, &target, "inc").unwrap();
        graph
            .trigger_slot(&emitter, 0.into(), Value::Null, None, ExecOptions::default())
            .unwrap();
        assert_eq!(counter(&graph, &target), (0, vec!["inc".to_string()]));
    }

    #[test]
    fn test_trigger_slot_single_link() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let first = graph.add_new("test/sink").unwrap();
        let second = graph.add_new("test/sink").unwrap();
        let link = graph.connect(&emitter, 0, &first, 0).unwrap();
        graph.connect(&emitter, 0, &second, 0).unwrap();
        graph
            .trigger_slot(&emitter, "out".into(), Value::Null, Some(&link), ExecOptions::default())
            .unwrap();
        assert_eq!(sink_calls(&graph, &first).len(), 1);
        assert!(sink_calls(&graph, &second).is_empty());
    }

    #[test]
    fn test_trigger_stamps_links() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let first = graph.add_new("test/sink").unwrap();
        let second = graph.add_new("test/sink").unwrap();
        let hit = graph.connect(&emitter, 0, &first, 0).unwrap();
        let missed = graph.connect(&emitter, 0, &second, 0).unwrap();
        graph.globaltime = 2.5;

        graph
            .trigger_slot(&emitter, SlotRef::Index(0), Value::Null, Some(&hit), ExecOptions::default())
            .unwrap();
        assert_eq!(graph.last_trigger_time, Some(2.5));
        assert_eq!(graph.get_link(&hit).unwrap().last_time, Some(2.5));
        assert_eq!(graph.get_link(&missed).unwrap().last_time, None);

        graph.clear_triggered_slot(&emitter, "out".into(), None).unwrap();
        assert_eq!(graph.get_link(&hit).unwrap().last_time, None);
    }

    #[test]
    fn test_trigger_by_name() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let sink = graph.add_new("test/sink").unwrap();
        graph.connect(&emitter, 0, &sink, 1).unwrap();
        graph.trigger(&emitter, Some("missing"), Value::Null, ExecOptions::default()).unwrap();
        assert!(sink_calls(&graph, &sink).is_empty());
        graph.trigger(&emitter, Some("out"), Value::Null, ExecOptions::default()).unwrap();
        assert_eq!(sink_calls(&graph, &sink)[0].0, "b");
    }

    #[test]
    fn test_never_mode_does_nothing() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let sink = graph.add_new("test/sink").unwrap();
        graph.connect(&emitter, 0, &sink, 0).unwrap();
        graph.get_node_mut(&emitter).unwrap().mode = NodeMode::Never;
        graph.do_execute(&emitter, Value::Null, ExecOptions::default()).unwrap();
        graph
            .trigger_slot(&emitter, 0.into(), Value::Null, None, ExecOptions::default())
            .unwrap();
        assert!(sink_calls(&graph, &sink).is_empty());
        assert_eq!(graph.get_node(&emitter).unwrap().exec_version(), None);
    }

    #[test]
    fn test_executed_slot_chains_triggers() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph.change_mode(&a, NodeMode::OnTrigger).unwrap();
        let b = graph.add_new("test/sum").unwrap();
        graph.change_mode(&b, NodeMode::OnTrigger).unwrap();
        let executed = graph.get_node(&a).unwrap().find_output_slot(slots::ON_EXECUTED).unwrap();
        graph.connect(&a, executed, &b, slots::ON_TRIGGER).unwrap();

        graph.do_execute(&a, Value::Null, ExecOptions::default()).unwrap();
        let b_node = graph.get_node(&b).unwrap();
        assert_eq!(b_node.property("runs"), Some(&json!(1)));
        assert_eq!(b_node.action_call(), graph.get_node(&a).unwrap().action_call());
    }

    #[test]
    fn test_after_execute_hook_can_prevent_chain() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph.change_mode(&a, NodeMode::OnTrigger).unwrap();
        let b = graph.add_new("test/sum").unwrap();
        graph.change_mode(&b, NodeMode::OnTrigger).unwrap();
        let executed = graph.get_node(&a).unwrap().find_output_slot(slots::ON_EXECUTED).unwrap();
        graph.connect(&a, executed, &b, slots::ON_TRIGGER).unwrap();
        graph
            .get_node_mut(&a)
            .unwrap()
            .callbacks
            .register(hooks::ON_AFTER_EXECUTE_NODE, 0, |_, _| {
                Some(HookResult {
                    prevent_default: true,
                    ..Default::default()
                })
            });
        graph.do_execute(&a, Value::Null, ExecOptions::default()).unwrap();
        assert_eq!(graph.get_node(&b).unwrap().property("runs"), Some(&json!(0)));
    }

    #[test]
    fn test_caught_failure_emits_event() {
        let sink = Arc::new(EventLog::default());
        let mut graph = test_graph().with_event_sink(sink.clone());
        let failing = graph.add_new("test/failing").unwrap();
        graph.do_execute(&failing, Value::Null, ExecOptions::default()).unwrap();
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, GraphEvent::NodeFailed { node_id, .. } if node_id == &failing)));
        assert_eq!(graph.get_node(&failing).unwrap().exec_version(), None);
    }

    #[test]
    fn test_uncaught_failure_propagates() {
        let config = RuntimeConfig {
            catch_exceptions: false,
            ..Default::default()
        };
        let mut graph = Graph::new(test_runtime_with(config));
        let failing = graph.add_new("test/failing").unwrap();
        let result = graph.do_execute(&failing, Value::Null, ExecOptions::default());
        assert!(matches!(result, Err(GraphError::ExecutionFailed(_))));
        assert!(graph.nodes_executing.is_empty());
    }

    #[test]
    fn test_get_input_data_forced_runs_origin() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph.set_property(&a, "value", json!(4.0)).unwrap();
        let b = graph.add_new("test/sum").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();

        assert_eq!(graph.get_input_data(&b, 0.into(), false, false).unwrap(), None);
        assert_eq!(
            graph.get_input_data(&b, "A".into(), true, false).unwrap(),
            Some(json!(4.0))
        );
        assert_eq!(graph.get_input_data(&b, 1.into(), true, false).unwrap(), None);
    }

    #[test]
    fn test_action_inputs_have_no_data() {
        let mut graph = test_graph();
        let counter = graph.add_new("test/counter").unwrap();
        assert_eq!(graph.get_input_data(&counter, "inc".into(), true, true).unwrap(), None);
    }

    #[test]
    fn test_refresh_ancestors_recomputes_data_chain() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let c = graph.add_new("test/sum").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();
        graph.connect(&b, 0, &c, 0).unwrap();

        let ancestors = graph.get_ancestors(&c, &AncestorFilter::data_refresh());
        assert_eq!(ancestors, vec![a.clone(), b.clone()]);
        assert!(graph.refresh_ancestors(&c, "", &Value::Null, &ExecOptions::default()).unwrap());
        assert_eq!(graph.get_input_data(&c, 0.into(), false, false).unwrap(), Some(json!(1.0)));
        assert!(!graph.ancestors_call);
    }

    #[test]
    fn test_nested_refresh_keeps_outer_flag() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();

        graph.ancestors_call = true;
        assert!(graph.refresh_ancestors(&b, "", &Value::Null, &ExecOptions::default()).unwrap());
        assert!(graph.ancestors_call);
        graph.ancestors_call = false;
    }

    #[test]
    fn test_ancestors_skip_modes_and_action_edges() {
        let mut graph = test_graph();
        let emitter = graph.add_new("test/emitter").unwrap();
        let a = graph.add_new("test/const").unwrap();
        graph.get_node_mut(&a).unwrap().mode = NodeMode::Never;
        let counter = graph.add_new("test/counter").unwrap();
        graph.connect(&emitter, 0, &counter, "inc").unwrap();
        graph.connect(&a, 0, &counter, "value").unwrap();
        assert!(graph.get_ancestors(&counter, &AncestorFilter::data_refresh()).is_empty());
        assert_eq!(
            graph.get_ancestors(&counter, &AncestorFilter::default()).len(),
            2
        );
    }

    #[test]
    fn test_set_output_data_reaches_links() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let c = graph.add_new("test/sum").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();
        graph.connect(&a, 0, &c, 1).unwrap();
        assert!(graph.set_output_data(&a, "value".into(), json!(9)));
        assert!(!graph.set_output_data(&a, 3.into(), json!(9)));
        assert_eq!(graph.get_node(&a).unwrap().get_output_data(0), Some(&json!(9)));
        assert_eq!(graph.get_input_or_property(&c, "B"), Some(json!(9)));
        assert_eq!(graph.get_output_nodes(&a, 0), vec![b.clone(), c]);
        assert_eq!(graph.get_input_node(&b, 0), Some(a));
    }

    #[test]
    fn test_set_output_data_type_retypes_links() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let link = graph.connect(&a, 0, &b, 0).unwrap();
        assert!(graph.set_output_data_type(&a, 0.into(), "float".into()));
        assert_eq!(graph.get_link(&link).unwrap().link_type, SlotType::named("float"));
        assert_eq!(graph.get_input_data_type(&b, 0.into()), Some(SlotType::named("float")));
    }

    #[test]
    fn test_input_or_property_falls_back() {
        let mut graph = test_graph();
        let b = graph.add_new("test/sum").unwrap();
        assert_eq!(graph.get_input_or_property(&b, "runs"), Some(json!(0)));
        assert_eq!(graph.get_input_or_property(&b, "A"), None);
    }

    #[test]
    fn test_set_property_veto_reverts() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph
            .get_node_mut(&a)
            .unwrap()
            .callbacks
            .register(hooks::ON_PROPERTY_CHANGED, 0, |_, args| {
                (args[1] == json!(13)).then(HookResult::veto)
            });
        assert!(graph.set_property(&a, "value", json!(2)).unwrap());
        assert!(!graph.set_property(&a, "value", json!(2)).unwrap());
        assert!(!graph.set_property(&a, "value", json!(13)).unwrap());
        assert_eq!(graph.get_node(&a).unwrap().property("value"), Some(&json!(2)));
        assert!(!graph.set_property(&a, "fresh", json!(13)).unwrap());
        assert!(graph.get_node(&a).unwrap().property("fresh").is_none());
    }

    #[test]
    fn test_change_mode_adds_trigger_slots_once() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph.change_mode(&a, NodeMode::OnTrigger).unwrap();
        graph.change_mode(&a, NodeMode::OnTrigger).unwrap();
        let node = graph.get_node(&a).unwrap();
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.outputs().len(), 2);
        assert_eq!(node.inputs()[0].extra.get("nameLocked"), Some(&json!(true)));
        assert!(node.outputs()[1].slot_type.is_event());
    }
}
