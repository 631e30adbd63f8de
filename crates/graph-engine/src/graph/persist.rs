//! JSON persistence, node cloning and the action history
//!
//! Loading tolerates drift between the saved data and the registered node
//! types: unknown types become placeholders, links whose ends no longer
//! exist are dropped, and persisted slots are reconciled against the slots
//! the node type declares today.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::GraphConfig;
use crate::constants::{hooks, FORMAT_VERSION};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::group::Group;
use crate::link::Link;
use crate::node::Node;
use crate::reconcile::sync_slots;
use crate::slot::{InputSlot, OutputSlot};
use crate::types::{Id, LinkId, NodeId, SlotDirection};

impl Graph {
    /// Plain JSON form of the graph
    pub fn serialize(&self) -> Value {
        let nodes: Vec<Value> = self.nodes().map(Node::serialize).collect();
        let links: Vec<Value> = self
            .links
            .values()
            .filter_map(|l| serde_json::to_value(l).ok())
            .collect();
        let groups: Vec<Value> = self.groups.iter().map(Group::serialize).collect();
        let data = json!({
            "last_node_id": self.last_node_id,
            "last_link_id": self.last_link_id,
            "nodes": nodes,
            "links": links,
            "groups": groups,
            "config": serde_json::to_value(&self.config).unwrap_or(Value::Null),
            "extra": self.extra,
            "version": FORMAT_VERSION,
        });
        self.fire(hooks::ON_SERIALIZE, std::slice::from_ref(&data));
        data
    }

    /// Load a serialized graph
    ///
    /// Unless `keep_old`, the graph is cleared first. Returns whether any
    /// error was recovered from (unknown node types, dropped links, a node
    /// that failed to configure).
    pub fn configure(&mut self, data: &Value, keep_old: bool) -> Result<bool> {
        let object = data
            .as_object()
            .ok_or_else(|| GraphError::failed("graph data is not an object"))?;
        if !keep_old {
            self.clear();
        }
        self.loading = true;
        let error = self.load(object);
        self.loading = false;

        self.update_execution_order();
        self.fire(hooks::ON_CONFIGURE, std::slice::from_ref(data));
        self.on_graph_changed("configure", false);
        log::info!(
            "Configured graph: {} nodes, {} links{}",
            self.nodes.len(),
            self.links.len(),
            if error { " (with errors)" } else { "" }
        );
        Ok(error)
    }

    /// Add the persisted nodes and links, returning whether any error was
    /// recovered from
    ///
    /// Nodes whose ids are taken get fresh ids, and so do links. Loaded
    /// links follow their nodes to the ids they were added under.
    fn load(&mut self, data: &Map<String, Value>) -> bool {
        let mut error = false;
        let config = self.runtime().config();

        if let Some(config) = data.get("config") {
            match serde_json::from_value::<GraphConfig>(config.clone()) {
                Ok(config) => self.config = config,
                Err(e) => log::warn!("Ignoring invalid graph config: {}", e),
            }
        }
        if let Some(extra) = data.get("extra").and_then(Value::as_object) {
            self.extra = extra.clone();
        }

        let nodes: Vec<&Value> = data.get("nodes").and_then(Value::as_array).into_iter().flatten().collect();
        let saved_node_ids = nodes
            .iter()
            .filter_map(|info| info.get("id").and_then(Id::from_value))
            .filter_map(|id| id.as_num());
        let last_node_id = data.get("last_node_id").and_then(Value::as_i64).unwrap_or(0);
        self.last_node_id = saved_node_ids.fold(self.last_node_id.max(last_node_id), i64::max);

        let mut node_ids: HashMap<NodeId, NodeId> = HashMap::new();
        let mut loaded = Vec::new();
        for info in nodes {
            let node_type = info.get("type").and_then(Value::as_str).unwrap_or_default();
            let mut node = match self.runtime().create_node(node_type, None, None) {
                Some(node) => node,
                None => {
                    error = true;
                    if !config.keep_unknown_nodes {
                        log::warn!("Dropping node of unknown type '{}'", node_type);
                        continue;
                    }
                    log::warn!("Node type '{}' not registered, keeping a placeholder", node_type);
                    Node::placeholder(info)
                }
            };
            let requested = info.get("id").and_then(Id::from_value).unwrap_or(Id::UNSET);
            node.id = requested.clone();
            let id = match self.add_node(node, true, false) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("Skipping node {} of type '{}': {}", requested, node_type, e);
                    error = true;
                    continue;
                }
            };
            if !requested.is_unset() {
                if id != requested {
                    log::warn!("Node id {} was taken, loaded as {}", requested, id);
                }
                node_ids.insert(requested, id.clone());
            }
            loaded.push((id, info));
        }

        let last_link_id = data.get("last_link_id").and_then(Value::as_i64).unwrap_or(0);
        let mut links = Vec::new();
        for raw in data.get("links").and_then(Value::as_array).into_iter().flatten() {
            match serde_json::from_value::<Link>(raw.clone()) {
                Ok(link) => links.push(link),
                Err(e) => {
                    log::warn!("Skipping malformed link {}: {}", raw, e);
                    error = true;
                }
            }
        }
        let reserved = links
            .iter()
            .filter_map(|l| l.id.as_num())
            .fold(last_link_id, i64::max);

        let mut link_ids: HashMap<LinkId, LinkId> = HashMap::new();
        for mut link in links {
            let ends = (node_ids.get(&link.origin_id), node_ids.get(&link.target_id));
            let (Some(origin), Some(target)) = ends else {
                log::warn!(
                    "Dropping link {} from {}:{} to {}:{}, an end was not loaded",
                    link.id,
                    link.origin_id,
                    link.origin_slot,
                    link.target_id,
                    link.target_slot
                );
                error = true;
                continue;
            };
            link.origin_id = origin.clone();
            link.target_id = target.clone();
            let saved = link.id.clone();
            if self.links.contains_key(&link.id) {
                self.last_link_id = self.last_link_id.max(reserved);
                link.id = self.next_link_id();
                log::debug!("Link id {} was taken, loaded as {}", saved, link.id);
            }
            link_ids.insert(saved, link.id.clone());
            self.links.insert(link.id.clone(), link);
        }

        for (id, info) in loaded {
            let info = relink_slots(info, &link_ids);
            if let Err(e) = self.configure_node(&id, &info) {
                log::warn!("Node {} failed to configure: {}", id, e);
                error = true;
            }
        }

        if self.drop_invalid_links() > 0 {
            error = true;
        }

        for raw in data.get("groups").and_then(Value::as_array).into_iter().flatten() {
            let mut group = Group::default();
            group.configure(raw);
            self.groups.push(group);
        }

        self.last_link_id = self.last_link_id.max(last_link_id);
        let max_link = self.links.keys().filter_map(Id::as_num).max().unwrap_or(0);
        self.last_link_id = self.last_link_id.max(max_link);
        error
    }

    /// Remove links whose ends are missing or disagree with the slots, and
    /// slot references to links that do not exist
    fn drop_invalid_links(&mut self) -> usize {
        let invalid: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| {
                let origin_ok = self
                    .nodes
                    .get(&link.origin_id)
                    .and_then(|n| n.output(link.origin_slot))
                    .is_some_and(|o| o.links.contains(&link.id));
                let target_ok = self
                    .nodes
                    .get(&link.target_id)
                    .and_then(|n| n.input(link.target_slot))
                    .is_some_and(|i| i.link.as_ref() == Some(&link.id));
                !(origin_ok && target_ok)
            })
            .map(|link| link.id.clone())
            .collect();
        for id in &invalid {
            if let Some(link) = self.links.remove(id) {
                log::warn!(
                    "Dropping link {} from {}:{} to {}:{}, an end is missing",
                    id,
                    link.origin_id,
                    link.origin_slot,
                    link.target_id,
                    link.target_slot
                );
            }
        }

        let links = &self.links;
        for node in self.nodes.values_mut() {
            for input in &mut node.inputs {
                if input.link.as_ref().is_some_and(|l| !links.contains_key(l)) {
                    input.link = None;
                }
            }
            for output in &mut node.outputs {
                output.links.retain(|l| links.contains_key(l));
            }
        }
        invalid.len()
    }

    /// Apply a serialized node to the node `id`
    ///
    /// Persisted slots are reconciled against the slots the node has now
    /// (when `reprocess_slot_while_node_configure`), and the link table
    /// follows every slot that moved.
    pub fn configure_node(&mut self, id: &NodeId, data: &Value) -> Result<()> {
        let info = data
            .as_object()
            .ok_or_else(|| GraphError::failed(format!("data for node {} is not an object", id)))?;
        let reprocess = self.runtime().config().reprocess_slot_while_node_configure;
        let persisted_inputs: Option<Vec<InputSlot>> = match info.get("inputs") {
            Some(v) if !v.is_null() => Some(serde_json::from_value(v.clone())?),
            _ => None,
        };
        let persisted_outputs: Option<Vec<OutputSlot>> = match info.get("outputs") {
            Some(v) if !v.is_null() => Some(serde_json::from_value(v.clone())?),
            _ => None,
        };

        let node = self.node_mut_or_err(id)?;
        if node.is_placeholder() {
            if let Some(inputs) = persisted_inputs {
                node.inputs = inputs;
            }
            if let Some(outputs) = persisted_outputs {
                node.outputs = outputs;
            }
            for (key, value) in info {
                node.apply_fields(key, value);
            }
            return Ok(());
        }

        for (key, value) in info {
            if !value.is_null() {
                node.apply_fields(key, value);
            }
        }
        if !info.contains_key("title") {
            node.title = node.type_title().to_string();
        }

        let mut discarded = Vec::new();
        if let Some(persisted) = persisted_inputs {
            if reprocess {
                let sync = sync_slots(&persisted, &node.inputs);
                let changed = sync.has_changes();
                discarded.extend(sync.dropped.iter().filter_map(|&i| persisted[i].link.clone()));
                node.inputs = sync.slots;
                if changed {
                    log::debug!("Node {}: inputs reconciled, remap {:?}", id, sync.remap);
                }
                self.remap_node_links(id, SlotDirection::Input, &sync.remap);
            } else {
                node.inputs = persisted;
            }
        }
        let node = self.node_mut_or_err(id)?;
        if let Some(persisted) = persisted_outputs {
            if reprocess {
                let sync = sync_slots(&persisted, &node.outputs);
                let changed = sync.has_changes();
                discarded.extend(sync.dropped.iter().flat_map(|&i| persisted[i].links.clone()));
                node.outputs = sync.slots;
                if changed {
                    log::debug!("Node {}: outputs reconciled, remap {:?}", id, sync.remap);
                }
                self.remap_node_links(id, SlotDirection::Output, &sync.remap);
            } else {
                node.outputs = persisted;
            }
        }
        for link in discarded {
            log::warn!("Node {}: dropping link {} of a duplicate slot", id, link);
            self.links.remove(&link);
        }

        if let Some(properties) = info.get("properties").and_then(Value::as_object) {
            for (name, value) in properties {
                let node = self.node_mut_or_err(id)?;
                let prev = node.properties.insert(name.clone(), value.clone());
                let args = [json!(name), value.clone(), prev.clone().unwrap_or(Value::Null)];
                self.run_node_hook(id, hooks::ON_PROPERTY_CHANGED, &args, |behavior, ctx| {
                    Some(Value::Bool(behavior.on_property_changed(ctx, name, value, prev.as_ref())))
                });
            }
        }

        self.notify_configured_links(id);

        let mut failure = None;
        self.run_node_hook(id, hooks::ON_CONFIGURE, std::slice::from_ref(data), |behavior, ctx| {
            if let Err(e) = behavior.on_configure(ctx, data) {
                failure = Some(e);
            }
            None
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Report every link of a freshly configured node as connected
    fn notify_configured_links(&mut self, id: &NodeId) {
        let Some(node) = self.nodes.get(id) else { return };
        let mut connected: Vec<(SlotDirection, usize, Link)> = Vec::new();
        for (slot, input) in node.inputs.iter().enumerate() {
            if let Some(link) = input.link.as_ref().and_then(|l| self.links.get(l)) {
                connected.push((SlotDirection::Input, slot, link.clone()));
            }
        }
        for (slot, output) in node.outputs.iter().enumerate() {
            for link in output.links.iter().filter_map(|l| self.links.get(l)) {
                connected.push((SlotDirection::Output, slot, link.clone()));
            }
        }
        for (direction, slot, link) in connected {
            self.notify_connection(id, direction, slot, true, &link);
        }
    }

    /// Add a copy of a node: same type and data, fresh id, no links
    pub fn clone_node(&mut self, id: &NodeId) -> Result<NodeId> {
        let use_uuids = self.runtime().config().use_uuids;
        let node = self.node_or_err(id)?;
        if node.is_placeholder() {
            return Err(GraphError::failed(format!("node {} has an unknown type and cannot be cloned", id)));
        }
        let node_type = node.node_type().to_string();
        let Value::Object(mut data) = node.serialize() else {
            return Err(GraphError::failed(format!("node {} did not serialize to an object", id)));
        };
        data.remove("id");
        for input in data.get_mut("inputs").and_then(Value::as_array_mut).into_iter().flatten() {
            if let Some(input) = input.as_object_mut() {
                input.insert("link".into(), Value::Null);
            }
        }
        for output in data.get_mut("outputs").and_then(Value::as_array_mut).into_iter().flatten() {
            if let Some(output) = output.as_object_mut() {
                output.insert("links".into(), json!([]));
            }
        }
        if let Some(behavior) = &node.behavior {
            behavior.prepare_clone(&mut data, use_uuids);
        }

        let fresh = self
            .create_node(&node_type)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.clone()))?;
        let clone = self.add(fresh)?;
        self.configure_node(&clone, &Value::Object(data))?;
        Ok(clone)
    }

    /// Restore the previous history snapshot; false when there is none
    pub fn action_history_back(&mut self) -> Result<bool> {
        let Some(snapshot) = self.history.as_mut().and_then(|h| h.back()) else {
            return Ok(false);
        };
        self.restore_snapshot(&snapshot?)?;
        Ok(true)
    }

    /// Restore the next history snapshot; false when there is none
    pub fn action_history_forward(&mut self) -> Result<bool> {
        let Some(snapshot) = self.history.as_mut().and_then(|h| h.forward()) else {
            return Ok(false);
        };
        self.restore_snapshot(&snapshot?)?;
        Ok(true)
    }

    fn restore_snapshot(&mut self, data: &Value) -> Result<()> {
        let history = self.history.take();
        let result = self.configure(data, false);
        self.history = history;
        result.map(|_| ())
    }
}

/// Copy of a persisted node whose slot link references point at the links
/// as loaded; references to links that were not loaded are cleared
fn relink_slots(info: &Value, links: &HashMap<LinkId, LinkId>) -> Value {
    let resolve = |raw: &Value| Id::from_value(raw).and_then(|id| links.get(&id)).map(|id| json!(id));
    let mut info = info.clone();
    if let Some(inputs) = info.get_mut("inputs").and_then(Value::as_array_mut) {
        for input in inputs.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(link) = input.get_mut("link") {
                *link = resolve(link).unwrap_or(Value::Null);
            }
        }
    }
    if let Some(outputs) = info.get_mut("outputs").and_then(Value::as_array_mut) {
        for output in outputs.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(Value::Array(list)) = output.get_mut("links") {
                *list = list.iter().filter_map(&resolve).collect();
            }
        }
    }
    info
}
