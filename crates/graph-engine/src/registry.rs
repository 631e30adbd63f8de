//! Node type registry for dynamic node resolution
//!
//! This module provides a registry that maps node type strings to
//! behaviour factories and metadata, plus a slot type index recording which
//! node types accept or produce each slot type.
//!
//! # Usage
//!
//! ```ignore
//! use graph_engine::{NodeRegistry, NodeDescriptor};
//!
//! let mut registry = NodeRegistry::new();
//! registry.register_type::<SumNode>()?;
//!
//! // Or pick up every type submitted with inventory::submit!
//! let registry = NodeRegistry::with_builtins();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use crate::constants::codes;
use crate::descriptor::{NodeDescriptor, NodeTypeFn, NodeTypeMetadata};
use crate::error::{GraphError, Result};
use crate::graph::NodeContext;
use crate::node::{ExecOptions, NodeBehavior};
use crate::runtime::Runtime;
use crate::types::{SlotDirection, SlotType};

/// Creates the behaviour of a new node instance
pub type NodeFactory = Arc<dyn Fn(&Arc<Runtime>) -> Box<dyn NodeBehavior> + Send + Sync>;

/// Plain function wrapped as a node, see [`NodeRegistry::wrap_function_as_node`]
pub type NodeFunction = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A registration entry combining metadata with a behaviour factory
#[derive(Clone)]
struct RegistryEntry {
    metadata: NodeTypeMetadata,
    factory: NodeFactory,
    /// Bumped every time the type is registered again
    revision: u64,
}

/// What a registration did
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Added,
    /// The type existed; the previous metadata is returned
    Replaced(NodeTypeMetadata),
}

/// Registry of node types with their metadata and factories
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::new();
/// registry.merge(plugin_registry);
/// ```
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    slots: SlotTypeIndex,
    revision: u64,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every node type submitted through `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in inventory::iter::<NodeTypeFn> {
            if let Err(e) = registry.register_fn(entry) {
                log::warn!("Skipping node type from inventory: {}", e);
            }
        }
        registry
    }

    /// Register a node type with metadata and a behaviour factory
    pub fn register(&mut self, metadata: NodeTypeMetadata, factory: NodeFactory) -> Result<Registration> {
        let node_type = metadata.node_type.clone();
        if node_type.is_empty() {
            return Err(GraphError::Registration("node type name is empty".into()));
        }
        self.slots.index(&metadata);
        self.revision += 1;
        let previous = self.entries.insert(
            node_type.clone(),
            RegistryEntry {
                metadata,
                factory,
                revision: self.revision,
            },
        );
        match previous {
            Some(old) => {
                log::info!("Replacing node type '{}'", node_type);
                Ok(Registration::Replaced(old.metadata))
            }
            None => {
                log::debug!("Registered node type '{}'", node_type);
                Ok(Registration::Added)
            }
        }
    }

    /// Register a type that describes itself and has a default value
    pub fn register_type<T>(&mut self) -> Result<Registration>
    where
        T: NodeDescriptor + NodeBehavior + Default,
    {
        self.register(
            T::descriptor(),
            Arc::new(|_: &Arc<Runtime>| Box::new(T::default()) as Box<dyn NodeBehavior>),
        )
    }

    /// Register a link-time submitted type
    pub fn register_fn(&mut self, entry: &NodeTypeFn) -> Result<Registration> {
        let factory = entry.factory;
        self.register((entry.descriptor)(), Arc::new(move |_: &Arc<Runtime>| factory()))
    }

    /// Remove a node type
    pub fn unregister(&mut self, node_type: &str) -> Result<NodeTypeMetadata> {
        self.entries
            .remove(node_type)
            .map(|e| e.metadata)
            .ok_or_else(|| GraphError::UnknownNodeType(node_type.to_string()))
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<&NodeTypeMetadata> {
        self.entries.get(node_type).map(|e| &e.metadata)
    }

    /// Alias of [`Self::get_metadata`]
    pub fn get_node_type(&self, node_type: &str) -> Option<&NodeTypeMetadata> {
        self.get_metadata(node_type)
    }

    /// Forget every registered type and the slot type index
    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots = SlotTypeIndex::default();
    }

    /// Node types with a slot of `slot_type`, on their outputs when `is_output`
    pub fn node_types_for_slot_type(&self, slot_type: &SlotType, is_output: bool) -> Vec<&str> {
        let direction = if is_output {
            SlotDirection::Output
        } else {
            SlotDirection::Input
        };
        self.slots.node_types_for(slot_type, direction)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&NodeTypeMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Current revision of a type, bumped on every registration
    pub fn revision(&self, node_type: &str) -> Option<u64> {
        self.entries.get(node_type).map(|e| e.revision)
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        for (_, entry) in other.entries {
            if let Err(e) = self.register(entry.metadata, entry.factory) {
                log::warn!("Skipping merged node type: {}", e);
            }
        }
    }

    /// Types in a category; the empty category holds the top-level types
    pub fn get_node_types_in_category(&self, category: &str) -> Vec<&NodeTypeMetadata> {
        self.entries
            .values()
            .map(|e| &e.metadata)
            .filter(|m| !m.skip_list && m.category() == category)
            .collect()
    }

    /// Sorted list of the categories in use, including `""`
    pub fn get_node_types_categories(&self) -> Vec<String> {
        let mut categories = BTreeSet::new();
        categories.insert(String::new());
        for entry in self.entries.values() {
            if !entry.metadata.skip_list {
                categories.insert(entry.metadata.category().to_string());
            }
        }
        categories.into_iter().collect()
    }

    /// Slot type index built from the registered metadata
    pub fn slot_types(&self) -> &SlotTypeIndex {
        &self.slots
    }

    /// Metadata, factory and revision of a type, cloned so the lock can be released
    pub(crate) fn factory(&self, node_type: &str) -> Option<(NodeTypeMetadata, NodeFactory, u64)> {
        self.entries
            .get(node_type)
            .map(|e| (e.metadata.clone(), e.factory.clone(), e.revision))
    }

    /// Register a plain function as a node type
    ///
    /// Inputs are named after `params` (`a0`, `a1`, ... when empty names are
    /// given), the single output is `out`, and the title is the last path
    /// segment of `name`.
    pub fn wrap_function_as_node(
        &mut self,
        name: &str,
        function: NodeFunction,
        params: &[(&str, SlotType)],
        return_type: SlotType,
        properties: &[(&str, Value)],
    ) -> Result<Registration> {
        let title = name.rsplit('/').next().unwrap_or(name).to_string();
        let mut metadata = NodeTypeMetadata::new(name, title);
        for (index, (param, slot_type)) in params.iter().enumerate() {
            let param = if param.is_empty() {
                format!("a{}", index)
            } else {
                param.to_string()
            };
            metadata = metadata.input(param, slot_type.clone());
        }
        metadata = metadata.output("out", return_type);
        for (property, default) in properties {
            metadata = metadata.property(*property, default.clone());
        }
        self.register(
            metadata,
            Arc::new(move |_: &Arc<Runtime>| {
                Box::new(FunctionNode {
                    function: function.clone(),
                }) as Box<dyn NodeBehavior>
            }),
        )
    }
}

/// Behaviour of a node created by [`NodeRegistry::wrap_function_as_node`]
struct FunctionNode {
    function: NodeFunction,
}

impl NodeBehavior for FunctionNode {
    fn executes(&self) -> bool {
        true
    }

    fn on_execute(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _param: &Value,
        _options: &ExecOptions,
    ) -> Result<()> {
        let count = ctx.node()?.inputs().len();
        let args: Vec<Value> = (0..count)
            .map(|i| ctx.input_data(i).unwrap_or(Value::Null))
            .collect();
        let result = (self.function)(&args);
        ctx.set_output_data(0, result);
        Ok(())
    }

    crate::impl_as_any!();
}

/// Index from slot type token to the node types using it
#[derive(Debug, Clone, Default)]
pub struct SlotTypeIndex {
    inputs: BTreeMap<String, BTreeSet<String>>,
    outputs: BTreeMap<String, BTreeSet<String>>,
}

impl SlotTypeIndex {
    /// Record every slot declared by `metadata`
    pub fn index(&mut self, metadata: &NodeTypeMetadata) {
        for slot in &metadata.inputs {
            self.register(&metadata.node_type, &slot.slot_type, SlotDirection::Input);
        }
        for slot in &metadata.outputs {
            self.register(&metadata.node_type, &slot.slot_type, SlotDirection::Output);
        }
    }

    /// Record that `node_type` has a slot of `slot_type` on one side
    pub fn register(&mut self, node_type: &str, slot_type: &SlotType, direction: SlotDirection) {
        let map = match direction {
            SlotDirection::Input => &mut self.inputs,
            SlotDirection::Output => &mut self.outputs,
        };
        for token in slot_type.tokens() {
            map.entry(token).or_default().insert(node_type.to_string());
        }
    }

    /// Node types with a slot of `slot_type` on the given side
    pub fn node_types_for(&self, slot_type: &SlotType, direction: SlotDirection) -> Vec<&str> {
        let map = match direction {
            SlotDirection::Input => &self.inputs,
            SlotDirection::Output => &self.outputs,
        };
        let mut found = BTreeSet::new();
        for token in slot_type.tokens() {
            if let Some(types) = map.get(&token) {
                found.extend(types.iter().map(String::as_str));
            }
        }
        found.into_iter().collect()
    }

    /// Sorted, lowercased slot type tokens seen on inputs
    pub fn slot_types_in(&self) -> Vec<&str> {
        self.inputs.keys().map(String::as_str).collect()
    }

    /// Sorted, lowercased slot type tokens seen on outputs
    pub fn slot_types_out(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    pub fn has_event_slots(&self) -> bool {
        self.inputs.contains_key(codes::EVENT_TOKEN) || self.outputs.contains_key(codes::EVENT_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::node::Node;
    use serde_json::json;

    #[derive(Default)]
    struct Dummy;

    impl NodeDescriptor for Dummy {
        fn descriptor() -> NodeTypeMetadata {
            NodeTypeMetadata::new("test/dummy", "Dummy")
                .input("in", "number,string")
                .output("out", "number")
                .action("reset")
        }
    }

    impl NodeBehavior for Dummy {
        crate::impl_as_any!();
    }

    fn test_metadata(node_type: &str) -> NodeTypeMetadata {
        NodeTypeMetadata::new(node_type, "").output("value", "number")
    }

    fn dummy_factory() -> NodeFactory {
        Arc::new(|_: &Arc<Runtime>| Box::new(Dummy) as Box<dyn NodeBehavior>)
    }

    #[test]
    fn test_register_and_lookup_metadata() {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Dummy>().unwrap();

        assert!(registry.has_node_type("test/dummy"));
        assert!(!registry.has_node_type("unknown"));
        let meta = registry.get_metadata("test/dummy").unwrap();
        assert_eq!(meta.title, "Dummy");
        assert_eq!(meta.category(), "test");
    }

    #[test]
    fn test_reregistration_reports_replacement() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.register(test_metadata("a/x"), dummy_factory()).unwrap(),
            Registration::Added
        );
        let first = registry.revision("a/x").unwrap();
        let outcome = registry.register(test_metadata("a/x"), dummy_factory()).unwrap();
        assert!(matches!(outcome, Registration::Replaced(_)));
        assert!(registry.revision("a/x").unwrap() > first);
    }

    #[test]
    fn test_clear_and_slot_type_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Dummy>().unwrap();
        registry.register(test_metadata("a/x"), dummy_factory()).unwrap();

        let number = SlotType::named("number");
        assert_eq!(registry.node_types_for_slot_type(&number, true), vec!["a/x", "test/dummy"]);
        assert_eq!(registry.node_types_for_slot_type(&number, false), vec!["test/dummy"]);
        assert_eq!(registry.node_types_for_slot_type(&SlotType::Event, false), vec!["test/dummy"]);
        assert!(registry.get_node_type("a/x").is_some());

        registry.clear();
        assert!(registry.node_types().is_empty());
        assert!(registry.node_types_for_slot_type(&number, true).is_empty());
    }

    #[test]
    fn test_empty_type_rejected() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register(test_metadata(""), dummy_factory()).is_err());
    }

    #[test]
    fn test_unregister_unknown_is_error() {
        let mut registry = NodeRegistry::new();
        registry.register(test_metadata("a/x"), dummy_factory()).unwrap();
        assert!(registry.unregister("a/x").is_ok());
        assert!(matches!(
            registry.unregister("a/x"),
            Err(GraphError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_categories() {
        let mut registry = NodeRegistry::new();
        registry.register(test_metadata("math/sum"), dummy_factory()).unwrap();
        registry.register(test_metadata("math/trig/sin"), dummy_factory()).unwrap();
        registry.register(test_metadata("toplevel"), dummy_factory()).unwrap();

        assert_eq!(
            registry.get_node_types_categories(),
            vec!["".to_string(), "math".to_string(), "math/trig".to_string()]
        );
        let top: Vec<&str> = registry
            .get_node_types_in_category("")
            .iter()
            .map(|m| m.node_type.as_str())
            .collect();
        assert_eq!(top, vec!["toplevel"]);
        assert_eq!(registry.get_node_types_in_category("math").len(), 1);
    }

    #[test]
    fn test_merge_override() {
        let mut registry1 = NodeRegistry::new();
        let mut meta1 = test_metadata("node-a");
        meta1.title = "Original".to_string();
        registry1.register(meta1, dummy_factory()).unwrap();

        let mut registry2 = NodeRegistry::new();
        let mut meta2 = test_metadata("node-a");
        meta2.title = "Override".to_string();
        registry2.register(meta2, dummy_factory()).unwrap();
        registry2.register(test_metadata("node-b"), dummy_factory()).unwrap();

        registry1.merge(registry2);
        assert_eq!(registry1.all_metadata().len(), 2);
        assert_eq!(registry1.get_metadata("node-a").unwrap().title, "Override");
    }

    #[test]
    fn test_slot_type_index() {
        let mut registry = NodeRegistry::new();
        registry.register_type::<Dummy>().unwrap();
        let index = registry.slot_types();
        assert_eq!(index.slot_types_in(), vec!["_event_", "number", "string"]);
        assert_eq!(index.slot_types_out(), vec!["number"]);
        assert_eq!(
            index.node_types_for(&"String".into(), SlotDirection::Input),
            vec!["test/dummy"]
        );
        assert!(index.has_event_slots());
    }

    #[test]
    fn test_wrap_function_metadata() {
        let mut registry = NodeRegistry::new();
        registry
            .wrap_function_as_node(
                "math/mul",
                Arc::new(|args: &[Value]| {
                    json!(args.iter().filter_map(Value::as_f64).product::<f64>())
                }),
                &[("x", "number".into()), ("", "number".into())],
                "number".into(),
                &[("scale", json!(1))],
            )
            .unwrap();
        let meta = registry.get_metadata("math/mul").unwrap();
        assert_eq!(meta.title, "mul");
        assert_eq!(meta.inputs[0].name, "x");
        assert_eq!(meta.inputs[1].name, "a1");
        assert_eq!(meta.outputs[0].name, "out");
        assert_eq!(meta.properties[0].name, "scale");
    }

    #[test]
    fn test_factory_builds_slots() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let mut registry = NodeRegistry::new();
        registry.register_type::<Dummy>().unwrap();
        let (meta, factory, revision) = registry.factory("test/dummy").unwrap();
        let node = Node::from_metadata(&meta, factory(&runtime));
        assert_eq!(node.inputs().len(), 2);
        assert_eq!(node.outputs().len(), 1);
        assert!(node.behavior::<Dummy>().is_some());
        assert!(revision > 0);
        assert!(registry.factory("nope").is_none());
    }
}
