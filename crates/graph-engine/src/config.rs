//! Runtime configuration flags
//!
//! One `RuntimeConfig` is shared by every graph created from the same
//! [`crate::Runtime`]. Missing fields deserialize to their defaults so a
//! partial JSON file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::constants::limits;

/// Flags that shape execution, connection and configure behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Catch errors raised by node hooks, log them and keep going
    pub catch_exceptions: bool,
    /// When an error is not caught, return it from the step instead of only logging
    pub throw_errors: bool,
    /// Queue actions on nodes that also execute, and run them at their next execution
    pub use_deferred_actions: bool,
    /// Connecting to the EVENT pseudo slot switches the target to ON_TRIGGER
    pub do_add_triggers_slots: bool,
    /// EVENT outputs may fan out to several targets
    pub allow_multi_output_for_events: bool,
    pub refresh_ancestors_on_triggers: bool,
    pub refresh_ancestors_on_actions: bool,
    /// Skip a node that already handled the same `action_call`
    pub ensure_unique_execution_and_action_call: bool,
    /// Node and link ids are UUID strings instead of counters
    pub use_uuids: bool,
    /// A node executes at most once per step
    pub ensure_node_single_execution: bool,
    /// A node handles a given `action_call` at most once while it is still handling it
    pub ensure_node_single_action: bool,
    /// Do not recompute an ancestor subtree twice in one step
    pub prevent_ancestor_recalculation: bool,
    /// Reconcile persisted slots against the current node type on configure
    pub reprocess_slot_while_node_configure: bool,
    /// Keep nodes of unregistered types as inert placeholders on configure
    pub keep_unknown_nodes: bool,
    pub max_number_of_nodes: usize,
    pub action_history_enabled: bool,
    pub action_history_max_save: usize,
    /// Defaults copied into the `config` of new graphs
    pub graph_default_config: GraphConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            catch_exceptions: true,
            throw_errors: true,
            use_deferred_actions: true,
            do_add_triggers_slots: false,
            allow_multi_output_for_events: true,
            refresh_ancestors_on_triggers: false,
            refresh_ancestors_on_actions: false,
            ensure_unique_execution_and_action_call: false,
            use_uuids: false,
            ensure_node_single_execution: false,
            ensure_node_single_action: false,
            prevent_ancestor_recalculation: false,
            reprocess_slot_while_node_configure: true,
            keep_unknown_nodes: true,
            max_number_of_nodes: limits::MAX_NUMBER_OF_NODES,
            action_history_enabled: false,
            action_history_max_save: limits::ACTION_HISTORY_MAX_SAVE,
            graph_default_config: GraphConfig::default(),
        }
    }
}

/// Per-graph editor preferences, persisted under `config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub align_to_grid: bool,
    pub links_ontop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_value(json!({"use_uuids": true, "max_number_of_nodes": 5})).unwrap();
        assert!(config.use_uuids);
        assert_eq!(config.max_number_of_nodes, 5);
        assert!(config.catch_exceptions);
        assert!(config.use_deferred_actions);
        assert!(!config.ensure_node_single_execution);
    }

    #[test]
    fn test_graph_config_round_trip() {
        let config = GraphConfig {
            align_to_grid: true,
            links_ontop: false,
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"align_to_grid": true, "links_ontop": false}));
    }
}
