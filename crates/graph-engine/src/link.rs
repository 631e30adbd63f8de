//! Links between an output slot and an input slot
//!
//! Links are persisted as compact arrays
//! `[id, origin_id, origin_slot, target_id, target_slot, type]`; the object
//! form is accepted on input as well.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use crate::types::{LinkId, NodeId, SlotType};

/// A directed edge from one output slot to one input slot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawLink")]
pub struct Link {
    pub id: LinkId,
    pub link_type: SlotType,
    pub origin_id: NodeId,
    pub origin_slot: usize,
    pub target_id: NodeId,
    pub target_slot: usize,
    /// Value carried during execution, never persisted
    pub data: Option<Value>,
    /// Graph time of the last event sent through this link
    pub last_time: Option<f64>,
}

impl Link {
    pub fn new(
        id: LinkId,
        link_type: SlotType,
        origin_id: NodeId,
        origin_slot: usize,
        target_id: NodeId,
        target_slot: usize,
    ) -> Self {
        Self {
            id,
            link_type,
            origin_id,
            origin_slot,
            target_id,
            target_slot,
            data: None,
            last_time: None,
        }
    }

    /// Object form, as handed to hooks
    pub fn to_object(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.link_type,
            "origin_id": self.origin_id,
            "origin_slot": self.origin_slot,
            "target_id": self.target_id,
            "target_slot": self.target_slot,
        })
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (
            &self.id,
            &self.origin_id,
            self.origin_slot,
            &self.target_id,
            self.target_slot,
            &self.link_type,
        )
            .serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLink {
    Array(LinkId, NodeId, i64, NodeId, i64, SlotType),
    Object {
        id: LinkId,
        origin_id: NodeId,
        origin_slot: i64,
        target_id: NodeId,
        target_slot: i64,
        #[serde(rename = "type", default)]
        link_type: SlotType,
    },
}

impl TryFrom<RawLink> for Link {
    type Error = String;

    fn try_from(raw: RawLink) -> Result<Self, Self::Error> {
        let (id, origin_id, origin_slot, target_id, target_slot, link_type) = match raw {
            RawLink::Array(id, o, os, t, ts, ty) => (id, o, os, t, ts, ty),
            RawLink::Object {
                id,
                origin_id,
                origin_slot,
                target_id,
                target_slot,
                link_type,
            } => (id, origin_id, origin_slot, target_id, target_slot, link_type),
        };
        let origin_slot = usize::try_from(origin_slot)
            .map_err(|_| format!("link {} has negative origin slot", id))?;
        let target_slot = usize::try_from(target_slot)
            .map_err(|_| format!("link {} has negative target slot", id))?;
        Ok(Link::new(id, link_type, origin_id, origin_slot, target_id, target_slot))
    }
}
