//! Action history of a graph as compressed snapshots
//!
//! Every recorded change stores the serialized graph, zstd-compressed,
//! labelled with the action that caused it. Moving back or forward hands
//! out the snapshot at the new position; the caller reconfigures the graph
//! from it.

use serde_json::Value;

use crate::error::{GraphError, Result};

const COMPRESSION_LEVEL: i32 = 3;

struct Snapshot {
    action: String,
    data: Vec<u8>,
}

impl Snapshot {
    fn capture(action: &str, graph: &Value) -> Result<Self> {
        let json = serde_json::to_vec(graph)?;
        let data = zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(Self {
            action: action.to_string(),
            data,
        })
    }

    fn restore(&self) -> Result<Value> {
        let json = zstd::decode_all(self.data.as_slice()).map_err(|e| GraphError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Bounded back/forward history of graph snapshots
///
/// `position` indexes the snapshot matching the graph as it is now.
pub struct ActionHistory {
    snapshots: Vec<Snapshot>,
    position: usize,
    max_save: usize,
}

impl std::fmt::Debug for ActionHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHistory")
            .field("snapshots", &self.snapshots.len())
            .field("position", &self.position)
            .field("max_save", &self.max_save)
            .finish()
    }
}

impl ActionHistory {
    pub fn new(max_save: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            position: 0,
            max_save: max_save.max(1),
        }
    }

    /// Record the graph after `action`
    ///
    /// Snapshots ahead of the current position are discarded. A graph equal
    /// to the current snapshot is not recorded again.
    pub fn record(&mut self, action: &str, graph: &Value) -> Result<()> {
        let snapshot = Snapshot::capture(action, graph)?;
        if self.snapshots.get(self.position).is_some_and(|s| s.data == snapshot.data) {
            return Ok(());
        }
        self.snapshots.truncate(self.position + 1);
        self.snapshots.push(snapshot);
        let overflow = self.snapshots.len().saturating_sub(self.max_save);
        self.snapshots.drain(..overflow);
        self.position = self.snapshots.len() - 1;
        Ok(())
    }

    /// Graph before the current snapshot, `None` at the oldest one
    pub fn back(&mut self) -> Option<Result<Value>> {
        let target = self.position.checked_sub(1)?;
        self.move_to(target)
    }

    /// Graph after the current snapshot, `None` at the newest one
    pub fn forward(&mut self) -> Option<Result<Value>> {
        self.move_to(self.position + 1)
    }

    fn move_to(&mut self, target: usize) -> Option<Result<Value>> {
        let snapshot = self.snapshots.get(target)?;
        self.position = target;
        Some(snapshot.restore())
    }

    /// Label of the action that produced the current snapshot
    pub fn current_action(&self) -> Option<&str> {
        self.snapshots.get(self.position).map(|s| s.action.as_str())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.position = 0;
    }
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(crate::constants::limits::ACTION_HISTORY_MAX_SAVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(name: &str) -> Value {
        json!({"nodes": [{"id": 1, "type": "test", "title": name}], "links": []})
    }

    fn title(value: Option<Result<Value>>) -> String {
        value.unwrap().unwrap()["nodes"][0]["title"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_back_and_forward() {
        let mut history = ActionHistory::new(10);
        history.record("nodeAdd", &graph("first")).unwrap();
        history.record("nodeAdd", &graph("second")).unwrap();
        history.record("connectionChange", &graph("third")).unwrap();

        assert_eq!(history.current_action(), Some("connectionChange"));
        assert_eq!(title(history.back()), "second");
        assert_eq!(title(history.back()), "first");
        assert!(history.back().is_none());
        assert_eq!(title(history.forward()), "second");
        assert_eq!(history.current_action(), Some("nodeAdd"));
    }

    #[test]
    fn test_record_after_back_drops_forward_snapshots() {
        let mut history = ActionHistory::new(10);
        history.record("a", &graph("first")).unwrap();
        history.record("b", &graph("second")).unwrap();
        history.back();
        history.record("c", &graph("third")).unwrap();
        assert!(history.forward().is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(title(history.back()), "first");
    }

    #[test]
    fn test_unchanged_graph_not_recorded() {
        let mut history = ActionHistory::new(10);
        history.record("a", &graph("same")).unwrap();
        history.record("b", &graph("same")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.current_action(), Some("a"));
    }

    #[test]
    fn test_oldest_snapshots_dropped() {
        let mut history = ActionHistory::new(3);
        for i in 0..5 {
            history.record("step", &graph(&format!("graph_{}", i))).unwrap();
        }
        assert_eq!(history.len(), 3);
        assert_eq!(title(history.back()), "graph_3");
        assert_eq!(title(history.back()), "graph_2");
        assert!(history.back().is_none());
    }

    #[test]
    fn test_empty_history() {
        let mut history = ActionHistory::default();
        assert!(history.is_empty());
        assert!(history.back().is_none());
        assert!(history.forward().is_none());
        history.record("a", &graph("x")).unwrap();
        history.clear();
        assert!(history.is_empty());
    }
}
