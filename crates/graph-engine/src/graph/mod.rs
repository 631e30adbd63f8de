//! The graph container
//!
//! A [`Graph`] owns its nodes, links and groups and implements every
//! operation that spans more than one node: connecting, execution, event
//! dispatch, ordering and persistence. The operations are split across the
//! submodules of this module; this file holds the container itself, node
//! membership and hook dispatch.
//!
//! Node hooks run with the node's behaviour checked out of the node, so the
//! behaviour can borrow the graph mutably through a [`NodeContext`].

mod connect;
mod context;
mod execute;
mod io;
mod order;
mod persist;
mod step;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

pub use connect::ConnectByTypeOptions;
pub use context::NodeContext;
pub use execute::AncestorFilter;
pub use io::GraphIo;

use crate::callback::{CallbackHandler, HookOutcome};
use crate::config::GraphConfig;
use crate::constants::hooks;
use crate::error::{GraphError, Result};
use crate::events::{EventSink, GraphEvent};
use crate::group::Group;
use crate::history::ActionHistory;
use crate::link::Link;
use crate::node::{ExecOptions, Node, NodeBehavior};
use crate::runtime::Runtime;
use crate::types::{Id, LinkId, NodeId, SlotType};

/// Change to the global inputs or outputs of a graph, reported to the node
/// that owns it as a subgraph
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IoChange {
    InputAdded { name: String, slot_type: SlotType },
    InputRenamed { old: String, new: String },
    InputTypeChanged { name: String, slot_type: SlotType },
    InputRemoved { name: String },
    OutputAdded { name: String, slot_type: SlotType },
    OutputRenamed { old: String, new: String },
    OutputTypeChanged { name: String, slot_type: SlotType },
    OutputRemoved { name: String },
    Trigger { name: String, param: Value },
}

/// A dataflow graph
pub struct Graph {
    runtime: Arc<Runtime>,
    pub(crate) nodes: HashMap<NodeId, Node>,
    /// Insertion order of the nodes
    pub(crate) node_order: Vec<NodeId>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    pub(crate) groups: Vec<Group>,
    pub(crate) nodes_in_order: Vec<NodeId>,
    pub(crate) executable: Vec<NodeId>,
    pub last_node_id: i64,
    pub last_link_id: i64,
    pub(crate) iteration: u64,
    pub globaltime: f64,
    pub fixedtime: f64,
    pub elapsed_time: f64,
    pub execution_time: f64,
    /// Graph time of the last slot trigger
    pub last_trigger_time: Option<f64>,
    started: Instant,
    last_update: Option<Instant>,
    pub(crate) errors_in_execution: bool,
    // per-step guards, cleared at the end of every step
    pub(crate) nodes_executing: HashSet<NodeId>,
    pub(crate) nodes_actioning: HashMap<NodeId, String>,
    pub(crate) nodes_executed_action: HashMap<NodeId, String>,
    pub(crate) node_ancestors_calculated: HashSet<NodeId>,
    pub(crate) ancestors_call: bool,
    pub(crate) inputs: BTreeMap<String, GraphIo>,
    pub(crate) outputs: BTreeMap<String, GraphIo>,
    pub config: GraphConfig,
    pub extra: Map<String, Value>,
    /// Graph-level hook handlers
    pub callbacks: CallbackHandler,
    events: Option<Arc<dyn EventSink>>,
    is_subgraph: bool,
    pub(crate) io_changes: Vec<IoChange>,
    pub(crate) history: Option<ActionHistory>,
    pub(crate) loading: bool,
    version: u64,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_order)
            .field("links", &self.links.len())
            .field("iteration", &self.iteration)
            .field("is_subgraph", &self.is_subgraph)
            .finish_non_exhaustive()
    }
}

impl Graph {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let config = runtime.config().graph_default_config;
        Self {
            runtime,
            nodes: HashMap::new(),
            node_order: Vec::new(),
            links: BTreeMap::new(),
            groups: Vec::new(),
            nodes_in_order: Vec::new(),
            executable: Vec::new(),
            last_node_id: 0,
            last_link_id: 0,
            iteration: 0,
            globaltime: 0.0,
            fixedtime: 0.0,
            elapsed_time: 0.0,
            execution_time: 0.0,
            last_trigger_time: None,
            started: Instant::now(),
            last_update: None,
            errors_in_execution: false,
            nodes_executing: HashSet::new(),
            nodes_actioning: HashMap::new(),
            nodes_executed_action: HashMap::new(),
            node_ancestors_calculated: HashSet::new(),
            ancestors_call: false,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            config,
            extra: Map::new(),
            callbacks: CallbackHandler::new(),
            events: None,
            is_subgraph: false,
            io_changes: Vec::new(),
            history: None,
            loading: false,
            version: 0,
        }
    }

    /// Graph nested inside a subgraph node
    pub(crate) fn nested(runtime: Arc<Runtime>) -> Self {
        let mut graph = Self::new(runtime);
        graph.is_subgraph = true;
        graph
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn set_event_sink(&mut self, events: Option<Arc<dyn EventSink>>) {
        self.events = events;
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn is_subgraph(&self) -> bool {
        self.is_subgraph
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Whether the last step ended with an error
    pub fn errors_in_execution(&self) -> bool {
        self.errors_in_execution
    }

    /// Counter bumped on every change
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        if let Some(sink) = &self.events {
            sink.record(&event);
        }
    }

    /// Run a graph-level hook without default behaviour
    pub(crate) fn fire(&self, name: &str, args: &[Value]) -> HookOutcome {
        self.callbacks.process(name, args, || None)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn node_or_err(&self, id: &NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    pub(crate) fn node_mut_or_err(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_order
    }

    pub fn get_link(&self, id: &LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn find_nodes_by_type(&self, node_type: &str) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.node_type() == node_type)
            .map(|n| n.id().clone())
            .collect()
    }

    pub fn find_node_by_title(&self, title: &str) -> Option<NodeId> {
        self.nodes().find(|n| n.title == title).map(|n| n.id().clone())
    }

    pub fn find_nodes_by_title(&self, title: &str) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.title == title)
            .map(|n| n.id().clone())
            .collect()
    }

    /// Topmost node whose bounding box contains the point
    pub fn get_node_on_pos(&self, x: f64, y: f64, margin: f64) -> Option<NodeId> {
        self.node_order
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .find(|n| {
                let b = n.bounding();
                x >= b[0] - margin
                    && x <= b[0] + b[2] + margin
                    && y >= b[1] - margin
                    && y <= b[1] + b[3] + margin
            })
            .map(|n| n.id().clone())
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn add_group(&mut self, group: Group) -> usize {
        self.groups.push(group);
        self.on_graph_changed("groupAdd", true);
        self.groups.len() - 1
    }

    pub fn remove_group(&mut self, index: usize) -> Option<Group> {
        if index >= self.groups.len() {
            return None;
        }
        let group = self.groups.remove(index);
        self.on_graph_changed("groupRemove", true);
        Some(group)
    }

    /// Move a group, and unless `ignore_nodes`, the nodes inside it
    pub fn move_group(&mut self, index: usize, dx: f64, dy: f64, ignore_nodes: bool) -> bool {
        let Some(group) = self.groups.get_mut(index) else {
            return false;
        };
        group.recompute_inside_nodes(self.nodes.values());
        let inside = group.move_by(dx, dy, ignore_nodes);
        for id in inside {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.pos[0] += dx;
                node.pos[1] += dy;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Create a node of a registered type, with the runtime of this graph
    pub fn create_node(&self, node_type: &str) -> Option<Node> {
        self.runtime.create_node(node_type, None, None)
    }

    /// Add a node, assigning it an id
    ///
    /// A node whose id is already taken gets a fresh one.
    pub fn add(&mut self, node: Node) -> Result<NodeId> {
        self.add_node(node, false, true)
    }

    /// Create a node of `node_type` and add it
    pub fn add_new(&mut self, node_type: &str) -> Result<NodeId> {
        let node = self
            .create_node(node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))?;
        self.add(node)
    }

    pub(crate) fn add_node(&mut self, mut node: Node, skip_order: bool, process_change: bool) -> Result<NodeId> {
        let config = self.runtime.config();
        if self.nodes.len() >= config.max_number_of_nodes {
            return Err(GraphError::TooManyNodes(config.max_number_of_nodes));
        }
        if !node.id.is_unset() && self.nodes.contains_key(&node.id) {
            log::warn!("Node id {} already in use, assigning a new one", node.id);
            node.id = Id::UNSET;
        }
        if node.id.is_unset() {
            node.id = if config.use_uuids {
                Id::new_uuid()
            } else {
                self.last_node_id += 1;
                Id::Num(self.last_node_id)
            };
        } else if let Some(n) = node.id.as_num() {
            self.last_node_id = self.last_node_id.max(n);
        }
        if self.config.align_to_grid {
            node.pos[0] = (node.pos[0] / 10.0).round() * 10.0;
            node.pos[1] = (node.pos[1] / 10.0).round() * 10.0;
        }

        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.node_order.push(id.clone());
        log::debug!("Added node {}", id);

        self.run_node_hook(&id, hooks::ON_ADDED, &[], |behavior, ctx| {
            behavior.on_added(ctx);
            None
        });
        if !skip_order {
            self.update_execution_order();
        }
        self.fire(hooks::ON_NODE_ADDED, &[json!(id)]);
        self.on_graph_changed("nodeAdd", process_change);
        Ok(id)
    }

    /// Remove a node after disconnecting all of its slots
    pub fn remove(&mut self, id: &NodeId) -> Result<Node> {
        let node = self.node_or_err(id)?;
        let inputs: Vec<usize> = (0..node.inputs.len())
            .filter(|&i| node.is_input_connected(i))
            .collect();
        let outputs: Vec<usize> = (0..node.outputs.len())
            .filter(|&i| node.is_output_connected(i))
            .collect();
        for slot in inputs {
            self.disconnect_input(id, slot)?;
        }
        for slot in outputs {
            self.disconnect_output(id, slot, None)?;
        }

        self.run_node_hook(id, hooks::ON_REMOVED, &[], |behavior, ctx| {
            behavior.on_removed(ctx);
            None
        });

        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        self.node_order.retain(|n| n != id);
        self.nodes_executing.remove(id);
        self.nodes_actioning.remove(id);
        self.nodes_executed_action.remove(id);
        self.node_ancestors_calculated.remove(id);
        log::debug!("Removed node {}", id);

        self.fire(hooks::ON_NODE_REMOVED, &[json!(id)]);
        self.on_graph_changed("nodeRemove", true);
        self.update_execution_order();
        Ok(node)
    }

    /// Remove every node, link, group and global slot
    pub fn clear(&mut self) {
        for id in self.node_order.clone() {
            self.run_node_hook(&id, hooks::ON_REMOVED, &[], |behavior, ctx| {
                behavior.on_removed(ctx);
                None
            });
        }
        // removals caused by the clear itself are not mirrored outward
        self.io_changes.clear();

        self.nodes.clear();
        self.node_order.clear();
        self.links.clear();
        self.groups.clear();
        self.nodes_in_order.clear();
        self.executable.clear();
        self.last_node_id = 0;
        self.last_link_id = 0;
        self.iteration = 0;
        self.globaltime = 0.0;
        self.fixedtime = 0.0;
        self.elapsed_time = 0.0;
        self.execution_time = 0.0;
        self.last_trigger_time = None;
        self.started = Instant::now();
        self.last_update = None;
        self.errors_in_execution = false;
        self.clear_step_guards();
        self.inputs.clear();
        self.outputs.clear();
        self.config = self.runtime.config().graph_default_config;
        self.extra.clear();
        self.on_graph_changed("clear", false);
    }

    pub(crate) fn clear_step_guards(&mut self) {
        self.nodes_executing.clear();
        self.nodes_actioning.clear();
        self.nodes_executed_action.clear();
        self.node_ancestors_calculated.clear();
        self.ancestors_call = false;
    }

    /// Bump the version and, when history is enabled, record a snapshot
    pub(crate) fn on_graph_changed(&mut self, action: &str, do_save: bool) {
        self.version += 1;
        if self.loading || !do_save {
            return;
        }
        let config = self.runtime.config();
        if !config.action_history_enabled {
            return;
        }
        let snapshot = self.serialize();
        let history = self
            .history
            .get_or_insert_with(|| ActionHistory::new(config.action_history_max_save));
        if let Err(e) = history.record(action, &snapshot) {
            log::error!("Failed to record history for '{}': {}", action, e);
        }
    }

    // ------------------------------------------------------------------
    // Hook dispatch
    // ------------------------------------------------------------------

    /// Run a node hook: registered handlers around the behaviour's default
    ///
    /// The behaviour is checked out of the node for the duration of the
    /// call. A node that has no behaviour at hand (a placeholder, or a node
    /// whose hook is already running) only runs its handlers.
    pub(crate) fn run_node_hook<F>(&mut self, id: &NodeId, name: &str, args: &[Value], default: F) -> HookOutcome
    where
        F: FnOnce(&mut dyn NodeBehavior, &mut NodeContext<'_>) -> Option<Value>,
    {
        let Some(node) = self.nodes.get_mut(id) else {
            return HookOutcome::default();
        };
        let plan = node.callbacks.plan(name);
        let Some(mut behavior) = node.behavior.take() else {
            if !plan.is_empty() {
                log::trace!("Node {}: '{}' runs handlers only", id, name);
            }
            return plan.run(args, || None);
        };
        let outcome = {
            let mut ctx = NodeContext::new(self, id.clone());
            plan.run(args, || default(&mut *behavior, &mut ctx))
        };
        self.restore_behavior(id, behavior);
        outcome
    }

    fn restore_behavior(&mut self, id: &NodeId, mut behavior: Box<dyn NodeBehavior>) {
        let changes = behavior
            .subgraph_mut()
            .map(|inner| std::mem::take(&mut inner.io_changes))
            .unwrap_or_default();
        match self.nodes.get_mut(id) {
            Some(node) => node.behavior = Some(behavior),
            None => {
                log::debug!("Node {} was removed during its own hook", id);
                return;
            }
        }
        if !changes.is_empty() {
            self.apply_io_changes(id, changes);
        }
    }

    /// Nested graph of a subgraph node
    pub fn subgraph(&self, id: &NodeId) -> Option<&Graph> {
        self.nodes.get(id)?.behavior.as_ref()?.subgraph()
    }

    /// Work on the nested graph of a subgraph node
    ///
    /// Changes to the nested graph's global inputs and outputs are mirrored
    /// onto the node's slots when `f` returns.
    pub fn with_subgraph<R>(&mut self, id: &NodeId, f: impl FnOnce(&mut Graph) -> R) -> Result<R> {
        let node = self.node_mut_or_err(id)?;
        let inner = node
            .behavior
            .as_mut()
            .and_then(|b| b.subgraph_mut())
            .ok_or_else(|| GraphError::failed(format!("node {} has no subgraph", id)))?;
        let result = f(inner);
        let changes = std::mem::take(&mut inner.io_changes);
        self.apply_io_changes(id, changes);
        Ok(result)
    }

    /// Mirror nested graph I/O changes onto the slots of the owning node
    fn apply_io_changes(&mut self, id: &NodeId, changes: Vec<IoChange>) {
        for change in changes {
            let Some(node) = self.nodes.get_mut(id) else {
                return;
            };
            match change {
                IoChange::InputAdded { name, slot_type } => {
                    if node.find_input_slot(&name).is_none() {
                        node.add_input(name, slot_type);
                    }
                }
                IoChange::InputRenamed { old, new } => {
                    if let Some(slot) = node.find_input_slot(&old) {
                        node.inputs[slot].name = new;
                    }
                }
                IoChange::InputTypeChanged { name, slot_type } => {
                    if let Some(slot) = node.find_input_slot(&name) {
                        node.inputs[slot].slot_type = slot_type;
                    }
                }
                IoChange::InputRemoved { name } => {
                    if let Some(slot) = node.find_input_slot(&name) {
                        if let Err(e) = self.remove_input(id, slot) {
                            log::warn!("Node {}: could not remove input '{}': {}", id, name, e);
                        }
                    }
                }
                IoChange::OutputAdded { name, slot_type } => {
                    if node.find_output_slot(&name).is_none() {
                        node.add_output(name, slot_type);
                    }
                }
                IoChange::OutputRenamed { old, new } => {
                    if let Some(slot) = node.find_output_slot(&old) {
                        node.outputs[slot].name = new;
                    }
                }
                IoChange::OutputTypeChanged { name, slot_type } => {
                    if let Some(slot) = node.find_output_slot(&name) {
                        node.outputs[slot].slot_type = slot_type;
                    }
                }
                IoChange::OutputRemoved { name } => {
                    if let Some(slot) = node.find_output_slot(&name) {
                        if let Err(e) = self.remove_output(id, slot) {
                            log::warn!("Node {}: could not remove output '{}': {}", id, name, e);
                        }
                    }
                }
                IoChange::Trigger { name, param } => {
                    if let Some(slot) = node.find_output_slot(&name) {
                        let result = self.trigger_slot(id, slot.into(), param, None, ExecOptions::default());
                        if let Err(e) = result {
                            log::error!("Node {}: trigger of '{}' failed: {}", id, name, e);
                        }
                    }
                }
            }
        }
    }

    /// Dispatch a named event to every node in `mode`, recursing into subgraphs
    pub fn send_event_to_all_nodes(&mut self, event: &str, params: &Value, mode: crate::types::NodeMode) {
        for id in self.nodes_in_order.clone() {
            let Some(node) = self.nodes.get(&id) else { continue };
            if node.mode != mode {
                continue;
            }
            let is_subgraph = node.behavior.as_ref().is_some_and(|b| b.subgraph().is_some());
            if is_subgraph && event != hooks::ON_EXECUTE {
                if node.property("enabled").and_then(Value::as_bool) == Some(false) {
                    continue;
                }
                let params = params.clone();
                if let Err(e) = self.with_subgraph(&id, |inner| inner.send_event_to_all_nodes(event, &params, mode)) {
                    log::debug!("Node {}: {}", id, e);
                }
                continue;
            }
            self.run_node_hook(&id, event, std::slice::from_ref(params), |behavior, ctx| {
                behavior.on_event(ctx, event, params);
                None
            });
        }
    }

    /// Bounding box `[min_x, min_y, max_x, max_y]` of all nodes
    pub fn get_bounding_box(&self) -> Option<[f64; 4]> {
        let mut nodes = self.nodes();
        let first = nodes.next()?.bounding();
        let mut bbox = [first[0], first[1], first[0] + first[2], first[1] + first[3]];
        for node in nodes {
            let b = node.bounding();
            bbox[0] = bbox[0].min(b[0]);
            bbox[1] = bbox[1].min(b[1]);
            bbox[2] = bbox[2].max(b[0] + b[2]);
            bbox[3] = bbox[3].max(b[1] + b[3]);
        }
        Some(bbox)
    }

    /// Recreate nodes whose registered type changed since they were created
    ///
    /// The node keeps its id, data and slots (and thus its links).
    pub fn check_node_types(&mut self) -> Result<usize> {
        let mut replaced = 0;
        for id in self.node_order.clone() {
            let Some(node) = self.nodes.get(&id) else { continue };
            if node.is_placeholder() {
                continue;
            }
            let Some(revision) = self.runtime.registry().revision(node.node_type()) else {
                continue;
            };
            if revision == node.type_revision {
                continue;
            }
            let node_type = node.node_type().to_string();
            let data = node.serialize();
            let Some(mut fresh) = self.runtime.create_node(&node_type, None, None) else {
                continue;
            };
            log::info!("Node {} has an outdated type '{}', recreating", id, node_type);
            let Some(old) = self.nodes.remove(&id) else { continue };
            fresh.id = id.clone();
            fresh.callbacks = old.callbacks.clone();
            fresh.inputs = old.inputs;
            fresh.outputs = old.outputs;
            self.nodes.insert(id.clone(), fresh);
            self.configure_node(&id, &data)?;
            replaced += 1;
        }
        if replaced > 0 {
            self.update_execution_order();
        }
        Ok(replaced)
    }
}

#[cfg(test)]
pub(crate) mod test_support;
