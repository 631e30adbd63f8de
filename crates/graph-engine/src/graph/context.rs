//! Access handed to node behaviours while one of their hooks runs

use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{ExecOptions, Node};
use crate::types::{NodeId, SlotRef};

/// Mutable view of the graph from the perspective of one node
///
/// The node's own behaviour is checked out while the hook runs, so its
/// hooks are not re-entered through this context.
pub struct NodeContext<'a> {
    graph: &'a mut Graph,
    node_id: NodeId,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(graph: &'a mut Graph, node_id: NodeId) -> Self {
        Self { graph, node_id }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn node(&self) -> Result<&Node> {
        self.graph
            .get_node(&self.node_id)
            .ok_or_else(|| GraphError::NodeNotFound(self.node_id.clone()))
    }

    pub fn node_mut(&mut self) -> Result<&mut Node> {
        self.graph
            .get_node_mut(&self.node_id)
            .ok_or_else(|| GraphError::NodeNotFound(self.node_id.clone()))
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.node().ok()?.property(name).cloned()
    }

    /// Data on an input link, `None` when unconnected or an action input
    pub fn input_data(&mut self, slot: impl Into<SlotRef>) -> Option<Value> {
        let slot = slot.into();
        self.graph
            .get_input_data(&self.node_id, slot, false, false)
            .unwrap_or_else(|e| {
                log::debug!("Node {}: input lookup failed: {}", self.node_id, e);
                None
            })
    }

    /// Data on an input link after running its origin node first
    pub fn input_data_forced(&mut self, slot: impl Into<SlotRef>, refresh_tree: bool) -> Result<Option<Value>> {
        let id = self.node_id.clone();
        self.graph.get_input_data(&id, slot.into(), true, refresh_tree)
    }

    /// Input data when connected, else the property with the same name
    pub fn input_or_property(&mut self, name: &str) -> Option<Value> {
        let id = self.node_id.clone();
        self.graph.get_input_or_property(&id, name)
    }

    pub fn set_output_data(&mut self, slot: impl Into<SlotRef>, value: Value) -> bool {
        let id = self.node_id.clone();
        self.graph.set_output_data(&id, slot.into(), value)
    }

    pub fn trigger_slot(&mut self, slot: impl Into<SlotRef>, param: Value) -> Result<()> {
        let id = self.node_id.clone();
        self.graph
            .trigger_slot(&id, slot.into(), param, None, ExecOptions::default())
    }

    /// Trigger the node's EVENT outputs named `action` (all of them for `None`)
    pub fn trigger(&mut self, action: Option<&str>, param: Value, options: ExecOptions) -> Result<()> {
        let id = self.node_id.clone();
        self.graph.trigger(&id, action, param, options)
    }

    /// Set a property without running this node's own property hook
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        self.node_mut()?.properties.insert(name.to_string(), value);
        Ok(())
    }
}
