//! Slot descriptors
//!
//! Inputs hold at most one link id, outputs hold any number. Both keep
//! unknown persisted fields in `extra` so they survive a round trip.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::{LinkId, SlotType};

/// An input connection point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: SlotType,
    #[serde(default)]
    pub link: Option<LinkId>,
    /// Extra descriptor fields (label, removable, nameLocked, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            link: None,
            extra: Map::new(),
        }
    }

    /// Attach extra descriptor fields
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(extra);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn label(&self) -> &str {
        self.extra
            .get("label")
            .and_then(|l| l.as_str())
            .unwrap_or(&self.name)
    }
}

/// An output connection point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: SlotType,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub links: Vec<LinkId>,
    /// Last value written to this output, never persisted
    #[serde(skip)]
    pub data: Option<Value>,
    /// Extra descriptor fields (label, removable, nameLocked, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<SlotType>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            links: Vec::new(),
            data: None,
            extra: Map::new(),
        }
    }

    /// Attach extra descriptor fields
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(extra);
        self
    }

    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn label(&self) -> &str {
        self.extra
            .get("label")
            .and_then(|l| l.as_str())
            .unwrap_or(&self.name)
    }
}

/// Read-only view over either slot kind, used by the slot reconciliation
pub trait SlotDescriptor {
    fn name(&self) -> &str;
    fn slot_type(&self) -> &SlotType;
}

impl SlotDescriptor for InputSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot_type(&self) -> &SlotType {
        &self.slot_type
    }
}

impl SlotDescriptor for OutputSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot_type(&self) -> &SlotType {
        &self.slot_type
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<LinkId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LinkId>>::deserialize(deserializer)?.unwrap_or_default())
}
