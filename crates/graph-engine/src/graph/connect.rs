//! Linking and unlinking slots, and slot removal with index shifting

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::constants::{hooks, slots};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::link::Link;
use crate::node::ConnectionChange;
use crate::types::{is_valid_connection, Id, LinkId, NodeId, NodeMode, SlotDirection, SlotRef, SlotType};

/// Options for [`Graph::connect_by_type`] and [`Graph::connect_by_type_output`]
#[derive(Debug, Clone)]
pub struct ConnectByTypeOptions {
    /// Create a trigger slot when an EVENT is connected to a node without one
    pub create_event_slot: bool,
    /// Fall back to a wildcard slot
    pub generic_fallback: bool,
    /// Fall back to any free slot that is not an EVENT slot
    pub first_free_fallback: bool,
    pub prefer_free: bool,
}

impl Default for ConnectByTypeOptions {
    fn default() -> Self {
        Self {
            create_event_slot: true,
            generic_fallback: true,
            first_free_fallback: true,
            prefer_free: true,
        }
    }
}

impl Graph {
    pub(crate) fn next_link_id(&mut self) -> LinkId {
        if self.runtime().config().use_uuids {
            Id::new_uuid()
        } else {
            self.last_link_id += 1;
            Id::Num(self.last_link_id)
        }
    }

    /// Link an output of `origin` to an input of `target`
    ///
    /// An existing link on the input is replaced. Fails for self links,
    /// incompatible types, unresolved slots and vetoes from hooks.
    pub fn connect(
        &mut self,
        origin: &NodeId,
        slot: impl Into<SlotRef>,
        target: &NodeId,
        target_slot: impl Into<SlotRef>,
    ) -> Result<LinkId> {
        let slot = slot.into();
        let origin_node = self.node_or_err(origin)?;
        let out_slot = origin_node
            .resolve_output(&slot)
            .ok_or_else(|| GraphError::slot(origin, &slot))?;
        if origin == target {
            return Err(GraphError::SelfLink(origin.clone()));
        }
        let target_ref = target_slot.into();
        let target_node = self.node_or_err(target)?;
        let mut in_slot = target_node
            .resolve_input(&target_ref)
            .ok_or_else(|| GraphError::slot(target, &target_ref))?;

        // the target may redirect the connection
        let redirected = self.run_node_hook(
            target,
            hooks::ON_BEFORE_CONNECT_INPUT,
            &[json!(in_slot)],
            |behavior, ctx| Some(json!(behavior.on_before_connect_input(ctx, in_slot))),
        );
        if let Some(redirect) = redirected.return_value.as_ref().and_then(Value::as_u64) {
            in_slot = redirect as usize;
        }
        let input = self
            .node_or_err(target)?
            .input(in_slot)
            .cloned()
            .ok_or_else(|| GraphError::slot(target, in_slot))?;
        let output = self
            .node_or_err(origin)?
            .output(out_slot)
            .cloned()
            .ok_or_else(|| GraphError::slot(origin, out_slot))?;

        let outcome = self.run_node_hook(
            origin,
            hooks::ON_CONNECT_OUTPUT,
            &[json!(out_slot), json!(input.slot_type), json!(target), json!(in_slot)],
            |behavior, ctx| {
                Some(Value::Bool(behavior.on_connect_output(
                    ctx,
                    out_slot,
                    &input.slot_type,
                    target,
                    in_slot,
                )))
            },
        );
        if !outcome.proceeds() {
            log::debug!("Connection from node {} vetoed by its output hook", origin);
            return Err(GraphError::Vetoed(hooks::ON_CONNECT_OUTPUT.into()));
        }

        if !is_valid_connection(&output.slot_type, &input.slot_type) {
            return Err(GraphError::IncompatibleTypes {
                output: output.slot_type.to_string(),
                input: input.slot_type.to_string(),
            });
        }

        let outcome = self.run_node_hook(
            target,
            hooks::ON_CONNECT_INPUT,
            &[json!(in_slot), json!(output.slot_type), json!(origin), json!(out_slot)],
            |behavior, ctx| {
                Some(Value::Bool(behavior.on_connect_input(
                    ctx,
                    in_slot,
                    &output.slot_type,
                    origin,
                    out_slot,
                )))
            },
        );
        if !outcome.proceeds() {
            log::debug!("Connection to node {} vetoed by its input hook", target);
            return Err(GraphError::Vetoed(hooks::ON_CONNECT_INPUT.into()));
        }

        if input.link.is_some() {
            self.disconnect_input(target, in_slot)?;
        }
        if output.slot_type.is_event()
            && !output.links.is_empty()
            && !self.runtime().config().allow_multi_output_for_events
        {
            self.disconnect_output(origin, out_slot, None)?;
        }

        let link_type = if input.slot_type.is_any() {
            output.slot_type.clone()
        } else {
            input.slot_type.clone()
        };
        let link_id = self.next_link_id();
        let link = Link::new(
            link_id.clone(),
            link_type,
            origin.clone(),
            out_slot,
            target.clone(),
            in_slot,
        );
        self.links.insert(link_id.clone(), link.clone());
        if let Some(slot) = self.nodes.get_mut(origin).and_then(|n| n.output_mut(out_slot)) {
            slot.links.push(link_id.clone());
        }
        if let Some(slot) = self.nodes.get_mut(target).and_then(|n| n.input_mut(in_slot)) {
            slot.link = Some(link_id.clone());
        }
        log::debug!(
            "Linked {}:{} -> {}:{} as {}",
            origin,
            out_slot,
            target,
            in_slot,
            link_id
        );

        self.notify_connection(origin, SlotDirection::Output, out_slot, true, &link);
        self.notify_connection(target, SlotDirection::Input, in_slot, true, &link);
        self.fire_graph_connection(SlotDirection::Input, target, in_slot, true, &link);
        self.fire_graph_connection(SlotDirection::Output, origin, out_slot, true, &link);
        self.connection_changed();
        Ok(link_id)
    }

    /// Link an output to the EVENT pseudo slot of `target`
    ///
    /// The target switches to ON_TRIGGER mode, gaining its `onTrigger` input.
    pub fn connect_trigger(&mut self, origin: &NodeId, slot: impl Into<SlotRef>, target: &NodeId) -> Result<LinkId> {
        if !self.runtime().config().do_add_triggers_slots {
            return Err(GraphError::slot(target, "EVENT"));
        }
        self.change_mode(target, NodeMode::OnTrigger)?;
        let trigger_slot = self
            .node_or_err(target)?
            .find_input_slot(slots::ON_TRIGGER)
            .ok_or_else(|| GraphError::slot(target, slots::ON_TRIGGER))?;
        self.connect(origin, slot, target, trigger_slot)
    }

    pub(crate) fn notify_connection(&mut self, id: &NodeId, direction: SlotDirection, slot: usize, connected: bool, link: &Link) {
        let change = ConnectionChange {
            direction,
            slot,
            connected,
            link: Some(link.clone()),
        };
        let args = change.to_args();
        self.run_node_hook(id, hooks::ON_CONNECTIONS_CHANGE, &args, |behavior, ctx| {
            behavior.on_connections_change(ctx, &change);
            None
        });
    }

    fn fire_graph_connection(&self, direction: SlotDirection, id: &NodeId, slot: usize, connected: bool, link: &Link) {
        self.fire(
            hooks::ON_NODE_CONNECTION_CHANGE,
            &[
                json!(direction.code()),
                json!(id),
                json!(slot),
                json!(connected),
                link.to_object(),
            ],
        );
    }

    fn connection_changed(&mut self) {
        self.update_execution_order();
        self.on_graph_changed("connectionChange", true);
    }

    /// Remove a link from the table and from both of its slots
    fn detach_link(&mut self, link_id: &LinkId) -> Option<Link> {
        let link = self.links.remove(link_id)?;
        if let Some(input) = self
            .nodes
            .get_mut(&link.target_id)
            .and_then(|n| n.input_mut(link.target_slot))
        {
            if input.link.as_ref() == Some(link_id) {
                input.link = None;
            }
        }
        if let Some(output) = self
            .nodes
            .get_mut(&link.origin_id)
            .and_then(|n| n.output_mut(link.origin_slot))
        {
            output.links.retain(|l| l != link_id);
        }
        Some(link)
    }

    fn notify_disconnect(&mut self, link: &Link) {
        self.notify_connection(&link.target_id, SlotDirection::Input, link.target_slot, false, link);
        self.notify_connection(&link.origin_id, SlotDirection::Output, link.origin_slot, false, link);
        self.fire_graph_connection(SlotDirection::Output, &link.origin_id, link.origin_slot, false, link);
        self.fire_graph_connection(SlotDirection::Input, &link.target_id, link.target_slot, false, link);
    }

    /// Remove the link on an input, returning whether one was removed
    pub fn disconnect_input(&mut self, id: &NodeId, slot: impl Into<SlotRef>) -> Result<bool> {
        let slot = slot.into();
        let node = self.node_or_err(id)?;
        let index = node.resolve_input(&slot).ok_or_else(|| GraphError::slot(id, &slot))?;
        let Some(link_id) = node.inputs[index].link.clone() else {
            return Ok(false);
        };
        let Some(link) = self.detach_link(&link_id) else {
            log::warn!("Node {}: input {} refers to missing link {}", id, index, link_id);
            if let Some(input) = self.nodes.get_mut(id).and_then(|n| n.input_mut(index)) {
                input.link = None;
            }
            return Ok(false);
        };
        self.notify_disconnect(&link);
        self.connection_changed();
        Ok(true)
    }

    /// Remove the links of an output, only those going to `target` when given
    ///
    /// Returns whether any link was removed.
    pub fn disconnect_output(&mut self, id: &NodeId, slot: impl Into<SlotRef>, target: Option<&NodeId>) -> Result<bool> {
        let slot = slot.into();
        let node = self.node_or_err(id)?;
        let index = node.resolve_output(&slot).ok_or_else(|| GraphError::slot(id, &slot))?;
        let link_ids = node.outputs[index].links.clone();

        let mut removed = false;
        for link_id in link_ids {
            let Some(link) = self.links.get(&link_id) else {
                log::warn!("Node {}: output {} refers to missing link {}", id, index, link_id);
                if let Some(output) = self.nodes.get_mut(id).and_then(|n| n.output_mut(index)) {
                    output.links.retain(|l| l != &link_id);
                }
                continue;
            };
            if target.is_some_and(|t| t != &link.target_id) {
                continue;
            }
            if let Some(link) = self.detach_link(&link_id) {
                self.notify_disconnect(&link);
                removed = true;
            }
            if target.is_some() {
                break;
            }
        }
        if removed {
            self.connection_changed();
        }
        Ok(removed)
    }

    /// Remove a link by id through its target input
    pub fn remove_link(&mut self, link_id: &LinkId) -> Result<bool> {
        let link = self
            .links
            .get(link_id)
            .ok_or_else(|| GraphError::LinkNotFound(link_id.clone()))?;
        let (target, slot) = (link.target_id.clone(), link.target_slot);
        self.disconnect_input(&target, slot)
    }

    /// Remove an input; later inputs shift down and their links follow
    pub fn remove_input(&mut self, id: &NodeId, slot: usize) -> Result<()> {
        self.disconnect_input(id, slot)?;
        let node = self.node_mut_or_err(id)?;
        if slot >= node.inputs.len() {
            return Err(GraphError::slot(id, slot));
        }
        let removed = node.inputs.remove(slot);
        let shifted: Vec<LinkId> = node.inputs[slot..]
            .iter()
            .filter_map(|s| s.link.clone())
            .collect();
        node.size = node.compute_size();
        for link_id in shifted {
            if let Some(link) = self.links.get_mut(&link_id) {
                link.target_slot = link.target_slot.saturating_sub(1);
            }
        }
        let args = [json!(slot), serde_json::to_value(&removed).unwrap_or(Value::Null)];
        self.run_node_hook(id, hooks::ON_INPUT_REMOVED, &args, |_, _| None);
        self.on_graph_changed("removeInput", true);
        Ok(())
    }

    /// Remove an output; later outputs shift down and their links follow
    pub fn remove_output(&mut self, id: &NodeId, slot: usize) -> Result<()> {
        self.disconnect_output(id, slot, None)?;
        let node = self.node_mut_or_err(id)?;
        if slot >= node.outputs.len() {
            return Err(GraphError::slot(id, slot));
        }
        let removed = node.outputs.remove(slot);
        let shifted: Vec<LinkId> = node.outputs[slot..]
            .iter()
            .flat_map(|s| s.links.iter().cloned())
            .collect();
        node.size = node.compute_size();
        for link_id in shifted {
            if let Some(link) = self.links.get_mut(&link_id) {
                link.origin_slot = link.origin_slot.saturating_sub(1);
            }
        }
        let args = [json!(slot), serde_json::to_value(&removed).unwrap_or(Value::Null)];
        self.run_node_hook(id, hooks::ON_OUTPUT_REMOVED, &args, |_, _| None);
        self.on_graph_changed("removeOutput", true);
        Ok(())
    }

    /// Move the links of a node from one slot index to another
    pub fn update_node_links(&mut self, id: &NodeId, direction: SlotDirection, from: usize, to: usize) {
        let mut remap = BTreeMap::new();
        remap.insert(from, to);
        self.remap_node_links(id, direction, &remap);
    }

    /// Apply a slot index remap to every link on one side of a node at once
    pub(crate) fn remap_node_links(&mut self, id: &NodeId, direction: SlotDirection, remap: &BTreeMap<usize, usize>) {
        for link in self.links.values_mut() {
            match direction {
                SlotDirection::Input if &link.target_id == id => {
                    if let Some(&to) = remap.get(&link.target_slot) {
                        link.target_slot = to;
                    }
                }
                SlotDirection::Output if &link.origin_id == id => {
                    if let Some(&to) = remap.get(&link.origin_slot) {
                        link.origin_slot = to;
                    }
                }
                _ => {}
            }
        }
    }

    /// Connect an output to the first compatible input of `target`
    pub fn connect_by_type(
        &mut self,
        origin: &NodeId,
        slot: impl Into<SlotRef>,
        target: &NodeId,
        target_type: &SlotType,
        options: &ConnectByTypeOptions,
    ) -> Result<LinkId> {
        let slot = slot.into();
        let node = self.node_or_err(target)?;
        let mut found = node.find_slot_by_type(SlotDirection::Input, target_type, options.prefer_free, false);
        if found.is_none()
            && target_type.is_event()
            && options.create_event_slot
            && self.runtime().config().do_add_triggers_slots
        {
            return self.connect_trigger(origin, slot, target);
        }
        let node = self.node_or_err(target)?;
        if found.is_none() && options.generic_fallback {
            found = node.find_slot_by_type(SlotDirection::Input, &SlotType::Any, options.prefer_free, false);
        }
        if found.is_none() && options.first_free_fallback {
            found = node.find_input_slot_free(&[SlotType::Event]);
        }
        match found {
            Some(index) => self.connect(origin, slot, target, index),
            None => {
                log::debug!("No input of type {} on node {}", target_type, target);
                Err(GraphError::slot(target, target_type))
            }
        }
    }

    /// Connect the first compatible output of `origin` to an input of `target`
    pub fn connect_by_type_output(
        &mut self,
        target: &NodeId,
        slot: impl Into<SlotRef>,
        origin: &NodeId,
        source_type: &SlotType,
        options: &ConnectByTypeOptions,
    ) -> Result<LinkId> {
        let slot = slot.into();
        let node = self.node_or_err(origin)?;
        let mut found = node.find_slot_by_type(SlotDirection::Output, source_type, options.prefer_free, false);
        if found.is_none()
            && source_type.is_event()
            && options.create_event_slot
            && self.runtime().config().do_add_triggers_slots
        {
            self.change_mode(origin, NodeMode::OnTrigger)?;
            found = self.node_or_err(origin)?.find_output_slot(slots::ON_EXECUTED);
        }
        let node = self.node_or_err(origin)?;
        if found.is_none() && options.generic_fallback {
            found = node.find_slot_by_type(SlotDirection::Output, &SlotType::Any, options.prefer_free, false);
        }
        if found.is_none() && options.first_free_fallback {
            found = node.find_output_slot_free(&[SlotType::Event]);
        }
        match found {
            Some(index) => self.connect(origin, index, target, slot),
            None => {
                log::debug!("No output of type {} on node {}", source_type, origin);
                Err(GraphError::slot(origin, source_type))
            }
        }
    }
}
