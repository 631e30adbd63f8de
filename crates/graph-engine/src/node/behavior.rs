//! The per-type behaviour of a node
//!
//! A node type is a [`NodeBehavior`] implementation plus its
//! [`crate::NodeTypeMetadata`]. The graph owns the node; while one of its
//! hooks runs, the behaviour is lent a [`NodeContext`] with mutable access to
//! the whole graph, so a hook can read inputs, write outputs and trigger
//! events. Hooks of a node are not re-entered while one of them runs.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::graph::{Graph, NodeContext};
use crate::link::Link;
use crate::node::Node;
use crate::types::{NodeId, SlotDirection, SlotType};

/// Options carried along an execution or action chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Token identifying one logical dispatch, used by the duplicate guards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_call: Option<String>,
}

impl ExecOptions {
    pub fn with_action_call(action_call: impl Into<String>) -> Self {
        Self {
            action_call: Some(action_call.into()),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match &self.action_call {
            Some(call) => serde_json::json!({ "action_call": call }),
            None => Value::Object(Map::new()),
        }
    }
}

/// Connection change reported to both ends of a link
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionChange {
    pub direction: SlotDirection,
    pub slot: usize,
    pub connected: bool,
    pub link: Option<Link>,
}

impl ConnectionChange {
    pub(crate) fn to_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.direction.code()),
            Value::from(self.slot),
            Value::Bool(self.connected),
            self.link.as_ref().map(Link::to_object).unwrap_or(Value::Null),
        ]
    }
}

/// An action queued until the node's next execution pass
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action: String,
    pub param: Value,
    pub options: ExecOptions,
    pub slot: Option<usize>,
}

/// Behaviour of one node type
///
/// Every hook has a no-op default, so a type only implements what it needs.
/// `executes` and `handles_actions` tell the scheduler whether the type has
/// an execute path and an action path; they are read once at creation.
pub trait NodeBehavior: Any + Send {
    /// Called once after the node has been created from its metadata
    fn init(&mut self, _node: &mut Node) {}

    fn executes(&self) -> bool {
        false
    }

    fn handles_actions(&self) -> bool {
        false
    }

    fn on_execute(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _param: &Value,
        _options: &ExecOptions,
    ) -> Result<()> {
        Ok(())
    }

    fn on_action(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _action: &str,
        _param: &Value,
        _options: &ExecOptions,
        _slot: Option<usize>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_connections_change(&mut self, _ctx: &mut NodeContext<'_>, _change: &ConnectionChange) {}

    /// May redirect an incoming connection to another input slot
    fn on_before_connect_input(&mut self, _ctx: &mut NodeContext<'_>, target_slot: usize) -> usize {
        target_slot
    }

    /// Return false to refuse an incoming link
    fn on_connect_input(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _slot: usize,
        _output_type: &SlotType,
        _origin: &NodeId,
        _origin_slot: usize,
    ) -> bool {
        true
    }

    /// Return false to refuse an outgoing link
    fn on_connect_output(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _slot: usize,
        _input_type: &SlotType,
        _target: &NodeId,
        _target_slot: usize,
    ) -> bool {
        true
    }

    /// Return false to revert the property to its previous value
    fn on_property_changed(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _name: &str,
        _value: &Value,
        _prev: Option<&Value>,
    ) -> bool {
        true
    }

    fn on_added(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_removed(&mut self, _ctx: &mut NodeContext<'_>) {}

    fn on_configure(&mut self, _ctx: &mut NodeContext<'_>, _data: &Value) -> Result<()> {
        Ok(())
    }

    /// Add type-specific fields to the serialized node
    fn on_serialize(&self, _node: &Node, _data: &mut Map<String, Value>) {}

    /// Adjust the serialized node before it is used to configure a clone
    fn prepare_clone(&self, _data: &mut Map<String, Value>, _use_uuids: bool) {}

    /// Generic named event, see [`Graph::send_event_to_all_nodes`]
    fn on_event(&mut self, _ctx: &mut NodeContext<'_>, _event: &str, _params: &Value) {}

    /// Override the computed node size
    fn compute_size(&self, _node: &Node) -> Option<[f64; 2]> {
        None
    }

    /// Nested graph owned by this node, if any
    fn subgraph(&self) -> Option<&Graph> {
        None
    }

    fn subgraph_mut(&mut self) -> Option<&mut Graph> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Implements the `as_any` plumbing of [`NodeBehavior`]
#[macro_export]
macro_rules! impl_as_any {
    () => {
        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
