//! Execution events for observers
//!
//! A graph reports steps, node executions, dispatched actions and caught
//! failures to an optional [`EventSink`]. Hooks (see
//! [`crate::CallbackHandler`]) are for changing behaviour; events are for
//! watching it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Receiver of the events of a graph
///
/// Any `Fn(&GraphEvent)` closure is a sink, so a host can forward events to
/// a channel or a logger without a wrapper type.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &GraphEvent);
}

impl<F> EventSink for F
where
    F: Fn(&GraphEvent) + Send + Sync,
{
    fn record(&self, event: &GraphEvent) {
        self(event)
    }
}

/// Events emitted while a graph runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A step finished
    #[serde(rename_all = "camelCase")]
    StepCompleted { iteration: u64, executed: usize },

    /// A node ran its execute path
    #[serde(rename_all = "camelCase")]
    NodeExecuted {
        node_id: NodeId,
        action_call: Option<String>,
    },

    /// A node handled an action
    #[serde(rename_all = "camelCase")]
    ActionDispatched {
        node_id: NodeId,
        action: String,
        action_call: Option<String>,
    },

    /// An action was queued until the node's next execution
    #[serde(rename_all = "camelCase")]
    ActionDeferred { node_id: NodeId, action: String },

    /// A duplicate execution or action was skipped by a guard
    #[serde(rename_all = "camelCase")]
    DuplicateSkipped { node_id: NodeId, reason: String },

    /// A node hook failed and the failure was caught
    #[serde(rename_all = "camelCase")]
    NodeFailed { node_id: NodeId, error: String },
}

impl GraphEvent {
    /// Node the event is about, if any
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            GraphEvent::StepCompleted { .. } => None,
            GraphEvent::NodeExecuted { node_id, .. }
            | GraphEvent::ActionDispatched { node_id, .. }
            | GraphEvent::ActionDeferred { node_id, .. }
            | GraphEvent::DuplicateSkipped { node_id, .. }
            | GraphEvent::NodeFailed { node_id, .. } => Some(node_id),
        }
    }
}

/// Sink that keeps the most recent events in memory
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<Vec<GraphEvent>>,
    capacity: usize,
}

impl EventLog {
    /// Keep at most `capacity` events, dropping the oldest
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Events about one node, oldest first
    pub fn for_node(&self, id: &NodeId) -> Vec<GraphEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.node_id() == Some(id))
            .cloned()
            .collect()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(crate::constants::limits::EVENT_LOG_CAPACITY)
    }
}

impl EventSink for EventLog {
    fn record(&self, event: &GraphEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            let excess = events.len() + 1 - self.capacity;
            events.drain(..excess);
        }
        events.push(event.clone());
    }
}
