//! Engine-wide constants
//!
//! Single source of truth for wire codes, layout defaults and limits.

/// Version tag written into serialized graphs
pub const FORMAT_VERSION: f64 = 0.4;

/// Wire codes shared with the persisted JSON format
pub mod codes {
    /// Slot direction code for inputs (used in connection hooks)
    pub const INPUT: i64 = 1;
    /// Slot direction code for outputs (used in connection hooks)
    pub const OUTPUT: i64 = 2;
    /// Type code for EVENT / ACTION slots
    pub const EVENT: i64 = -1;
    /// Type token used by slot registries and type searches for EVENT slots
    pub const EVENT_TOKEN: &str = "_event_";
}

/// Limits and timing
pub mod limits {
    /// Default maximum number of nodes a single graph accepts
    pub const MAX_NUMBER_OF_NODES: usize = 1000;
    /// Amount `fixedtime` advances per step
    pub const FIXED_TIME_LAPSE: f64 = 0.01;
    /// Default number of history snapshots kept
    pub const ACTION_HISTORY_MAX_SAVE: usize = 300;
    /// Events an `EventLog` keeps by default
    pub const EVENT_LOG_CAPACITY: usize = 1024;
}

/// Layout defaults (geometry is carried through but never drives execution)
pub mod layout {
    pub const NODE_TITLE_HEIGHT: f64 = 30.0;
    pub const NODE_SLOT_HEIGHT: f64 = 20.0;
    pub const NODE_WIDTH: f64 = 140.0;
    pub const NODE_MIN_WIDTH: f64 = 50.0;
    pub const NODE_MIN_HEIGHT: f64 = 25.0;
    pub const NODE_TEXT_SIZE: f64 = 14.0;
    pub const DEFAULT_POSITION: [f64; 2] = [100.0, 100.0];

    pub const GROUP_FONT_SIZE: f64 = 24.0;
    pub const GROUP_DEFAULT_BOUNDING: [f64; 4] = [10.0, 10.0, 140.0, 80.0];
    pub const GROUP_MIN_SIZE: [f64; 2] = [140.0, 80.0];
    /// Margin by which a node may stick out of a group and still count as inside
    pub const GROUP_INCLUSION_DISTANCE: f64 = 36.0;
}

/// Hook names dispatched through [`crate::CallbackHandler`]
pub mod hooks {
    pub const ON_NODE_CREATED: &str = "onNodeCreated";
    pub const ON_NODE_TYPE_REGISTERED: &str = "onNodeTypeRegistered";
    pub const ON_NODE_TYPE_REPLACED: &str = "onNodeTypeReplaced";

    pub const ON_EXECUTE: &str = "onExecute";
    pub const ON_ACTION: &str = "onAction";
    pub const ON_AFTER_EXECUTE_NODE: &str = "onAfterExecuteNode";
    pub const ON_AFTER_ACTIONED_NODE: &str = "onAfterActionedNode";
    pub const ON_CONNECTIONS_CHANGE: &str = "onConnectionsChange";
    pub const ON_BEFORE_CONNECT_INPUT: &str = "onBeforeConnectInput";
    pub const ON_CONNECT_INPUT: &str = "onConnectInput";
    pub const ON_CONNECT_OUTPUT: &str = "onConnectOutput";
    pub const ON_PROPERTY_CHANGED: &str = "onPropertyChanged";
    pub const ON_INPUT_ADDED: &str = "onInputAdded";
    pub const ON_OUTPUT_ADDED: &str = "onOutputAdded";
    pub const ON_INPUT_REMOVED: &str = "onInputRemoved";
    pub const ON_OUTPUT_REMOVED: &str = "onOutputRemoved";
    pub const ON_ADDED: &str = "onAdded";
    pub const ON_REMOVED: &str = "onRemoved";
    pub const ON_CONFIGURE: &str = "onConfigure";
    pub const ON_SERIALIZE: &str = "onSerialize";

    pub const ON_NODE_ADDED: &str = "onNodeAdded";
    pub const ON_NODE_REMOVED: &str = "onNodeRemoved";
    pub const ON_NODE_CONNECTION_CHANGE: &str = "onNodeConnectionChange";
    pub const ON_EXECUTE_STEP: &str = "onExecuteStep";
    pub const ON_AFTER_EXECUTE: &str = "onAfterExecute";
    pub const ON_GRAPH_INPUT_ADDED: &str = "onInputAdded";
    pub const ON_GRAPH_INPUT_RENAMED: &str = "onInputRenamed";
    pub const ON_GRAPH_INPUT_TYPE_CHANGED: &str = "onInputTypeChanged";
    pub const ON_GRAPH_INPUT_REMOVED: &str = "onInputRemoved";
    pub const ON_GRAPH_OUTPUT_ADDED: &str = "onOutputAdded";
    pub const ON_GRAPH_OUTPUT_RENAMED: &str = "onOutputRenamed";
    pub const ON_GRAPH_OUTPUT_TYPE_CHANGED: &str = "onOutputTypeChanged";
    pub const ON_GRAPH_OUTPUT_REMOVED: &str = "onOutputRemoved";
    pub const ON_INPUTS_OUTPUTS_CHANGE: &str = "onInputsOutputsChange";
    pub const ON_TRIGGER: &str = "onTrigger";
}

/// Well-known slot names
pub mod slots {
    /// EVENT input that makes an ON_TRIGGER node execute
    pub const ON_TRIGGER: &str = "onTrigger";
    /// EVENT output fired after a node executed or handled an action
    pub const ON_EXECUTED: &str = "onExecuted";
}
