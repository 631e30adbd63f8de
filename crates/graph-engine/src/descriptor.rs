//! Node type descriptor trait and metadata types
//!
//! This module provides the `NodeDescriptor` trait that allows node types to
//! self-describe their metadata (slots, properties, title, priority).
//!
//! This creates a single source of truth for node definitions - the node
//! behaviour defines both what it does AND the slots it is created with.
//!
//! Node crates submit a [`NodeTypeFn`] with `inventory::submit!` so that
//! [`crate::NodeRegistry::with_builtins`] can find every linked type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::NodeBehavior;
use crate::types::SlotType;

/// Trait for node types that can describe their metadata
///
/// # Example
///
/// ```ignore
/// use graph_engine::{NodeDescriptor, NodeTypeMetadata};
///
/// impl NodeDescriptor for SumNode {
///     fn descriptor() -> NodeTypeMetadata {
///         NodeTypeMetadata::new("math/sum", "Sum")
///             .input("A", "number")
///             .input("B", "number")
///             .output("A+B", "number")
///     }
/// }
/// ```
pub trait NodeDescriptor {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeTypeMetadata
    where
        Self: Sized;
}

/// Complete metadata for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeMetadata {
    /// Unique type path (e.g., "math/sum"); the part before the last `/` is the category
    pub node_type: String,
    /// Default title of created nodes
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<SlotSpec>,
    #[serde(default)]
    pub outputs: Vec<SlotSpec>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
    /// Nodes with a higher priority run later within the same order
    #[serde(default)]
    pub priority: i32,
    /// Hidden from category listings
    #[serde(default)]
    pub skip_list: bool,
}

impl NodeTypeMetadata {
    pub fn new(node_type: impl Into<String>, title: impl Into<String>) -> Self {
        let node_type = node_type.into();
        let mut title = title.into();
        if title.is_empty() {
            title = node_type.rsplit('/').next().unwrap_or_default().to_string();
        }
        Self {
            node_type,
            title,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            priority: 0,
            skip_list: false,
        }
    }

    /// Category path: everything before the last `/`, empty for top-level types
    pub fn category(&self) -> &str {
        match self.node_type.rfind('/') {
            Some(idx) => &self.node_type[..idx],
            None => "",
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        self.inputs.push(SlotSpec::new(name, slot_type));
        self
    }

    pub fn output(mut self, name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        self.outputs.push(SlotSpec::new(name, slot_type));
        self
    }

    /// Add an ACTION input
    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(SlotSpec::new(name, SlotType::Event));
        self
    }

    /// Add an EVENT output
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(SlotSpec::new(name, SlotType::Event));
        self
    }

    pub fn property(mut self, name: impl Into<String>, default: Value) -> Self {
        self.properties.push(PropertySpec::new(name, default));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.skip_list = true;
        self
    }
}

/// Declared slot of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: SlotType,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl SlotSpec {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Declared property of a node type, with its default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "default_value")]
    pub default: Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, default: Value) -> Self {
        let property_type = match &default {
            Value::Number(_) => Some("number".to_string()),
            Value::String(_) => Some("string".to_string()),
            Value::Bool(_) => Some("boolean".to_string()),
            _ => None,
        };
        Self {
            name: name.into(),
            default,
            property_type,
            extra: Map::new(),
        }
    }
}

/// Link-time registration of a node type
///
/// ```ignore
/// inventory::submit!(graph_engine::NodeTypeFn::new::<SumNode>());
/// ```
pub struct NodeTypeFn {
    pub descriptor: fn() -> NodeTypeMetadata,
    pub factory: fn() -> Box<dyn NodeBehavior>,
}

impl NodeTypeFn {
    pub const fn new<T>() -> Self
    where
        T: NodeDescriptor + NodeBehavior + Default,
    {
        Self {
            descriptor: T::descriptor,
            factory: boxed_default::<T>,
        }
    }
}

fn boxed_default<T: NodeBehavior + Default>() -> Box<dyn NodeBehavior> {
    Box::new(T::default())
}

inventory::collect!(NodeTypeFn);
