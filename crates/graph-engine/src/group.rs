//! Visual groups
//!
//! A group is a titled rectangle. It owns no nodes; the nodes inside it are
//! found by bounding box overlap whenever the group is about to move them.

use serde_json::{json, Value};

use crate::constants::layout;
use crate::node::Node;
use crate::types::NodeId;

const DEFAULT_COLOR: &str = "#3f789e";

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub title: String,
    pub color: String,
    pub font_size: f64,
    bounding: [f64; 4],
    inside: Vec<NodeId>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new("Group")
    }
}

impl Group {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: DEFAULT_COLOR.to_string(),
            font_size: layout::GROUP_FONT_SIZE,
            bounding: layout::GROUP_DEFAULT_BOUNDING,
            inside: Vec::new(),
        }
    }

    /// `[x, y, width, height]`
    pub fn bounding(&self) -> [f64; 4] {
        self.bounding
    }

    /// Set the bounding box; the size never drops below the minimum group size
    pub fn set_bounding(&mut self, bounding: [f64; 4]) {
        self.bounding = [
            bounding[0],
            bounding[1],
            bounding[2].max(layout::GROUP_MIN_SIZE[0]),
            bounding[3].max(layout::GROUP_MIN_SIZE[1]),
        ];
    }

    pub fn pos(&self) -> [f64; 2] {
        [self.bounding[0], self.bounding[1]]
    }

    pub fn size(&self) -> [f64; 2] {
        [self.bounding[2], self.bounding[3]]
    }

    /// Nodes found inside by the last [`Group::recompute_inside_nodes`]
    pub fn inside_nodes(&self) -> &[NodeId] {
        &self.inside
    }

    pub fn configure(&mut self, data: &Value) {
        if let Some(title) = data.get("title").and_then(Value::as_str) {
            self.title = title.to_string();
        }
        if let Some(bounding) = data.get("bounding").and_then(read_bounding) {
            self.bounding = bounding;
        }
        if let Some(color) = data.get("color").and_then(Value::as_str) {
            self.color = color.to_string();
        }
        if let Some(font_size) = data.get("font_size").and_then(Value::as_f64) {
            self.font_size = font_size;
        }
    }

    pub fn serialize(&self) -> Value {
        json!({
            "title": self.title,
            "bounding": self.bounding.map(f64::round),
            "color": self.color,
            "font_size": self.font_size,
        })
    }

    /// Move the group, returning the nodes that should move along with it
    pub fn move_by(&mut self, dx: f64, dy: f64, ignore_nodes: bool) -> Vec<NodeId> {
        self.bounding[0] += dx;
        self.bounding[1] += dy;
        if ignore_nodes {
            return Vec::new();
        }
        self.inside.clone()
    }

    /// Find the nodes overlapping the group by more than the inclusion distance
    pub fn recompute_inside_nodes<'a>(&mut self, nodes: impl Iterator<Item = &'a Node>) {
        let bounding = self.bounding;
        self.inside = nodes
            .filter(|n| overlap(&bounding, &n.bounding(), -layout::GROUP_INCLUSION_DISTANCE))
            .map(|n| n.id().clone())
            .collect();
    }
}

/// Bounding boxes are persisted as arrays, sometimes as `{"0": x, "1": y, ...}` objects
fn read_bounding(value: &Value) -> Option<[f64; 4]> {
    let mut out = [0.0; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let item = match value {
            Value::Array(items) => items.get(i),
            Value::Object(map) => map.get(&i.to_string()),
            _ => None,
        }?;
        *slot = item.as_f64()?;
    }
    Some(out)
}

fn overlap(a: &[f64; 4], b: &[f64; 4], add: f64) -> bool {
    let a_end_x = a[0] + a[2] + add;
    let a_end_y = a[1] + a[3] + add;
    let b_end_x = b[0] + b[2] + add;
    let b_end_y = b[1] + b[3] + add;
    !(a[0] > b_end_x || a[1] > b_end_y || a_end_x < b[0] || a_end_y < b[1])
}
