//! Execution ordering and layout by dependency level

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::constants::layout;
use crate::graph::Graph;
use crate::types::NodeId;

impl Graph {
    /// Order nodes so every node comes after the nodes feeding its inputs
    ///
    /// Kahn's algorithm seeded in insertion order. Nodes left over because
    /// they sit on a cycle are appended in insertion order. The result is
    /// then stably sorted by node priority, and every node's `order` is set
    /// to its position. With `set_level`, the returned map holds the
    /// dependency level of every node (1 for nodes without linked inputs).
    pub fn compute_execution_order(&mut self, only_executable: bool, set_level: bool) -> (Vec<NodeId>, HashMap<NodeId, usize>) {
        let candidates: Vec<NodeId> = self
            .node_order
            .iter()
            .filter(|id| !only_executable || self.nodes.get(*id).is_some_and(|n| n.executes()))
            .cloned()
            .collect();

        let mut remaining: HashMap<NodeId, usize> = HashMap::new();
        let mut levels: HashMap<NodeId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        for id in &candidates {
            let Some(node) = self.nodes.get(id) else { continue };
            let linked = node.inputs.iter().filter(|i| i.link.is_some()).count();
            if linked == 0 {
                queue.push_back(id.clone());
                levels.insert(id.clone(), 1);
            } else {
                remaining.insert(id.clone(), linked);
                levels.insert(id.clone(), 0);
            }
        }

        let mut ordered = Vec::with_capacity(candidates.len());
        let mut placed = HashSet::new();
        let mut visited_links = HashSet::new();
        while let Some(id) = queue.pop_front() {
            placed.insert(id.clone());
            ordered.push(id.clone());
            let Some(node) = self.nodes.get(&id) else { continue };
            let level = levels.get(&id).copied().unwrap_or(1);
            for link_id in node.outputs.iter().flat_map(|o| o.links.iter()) {
                let Some(link) = self.links.get(link_id) else { continue };
                if !visited_links.insert(link_id.clone()) {
                    continue;
                }
                let target = &link.target_id;
                if let Some(target_level) = levels.get_mut(target) {
                    if *target_level <= level {
                        *target_level = level + 1;
                    }
                }
                if let Some(count) = remaining.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        remaining.remove(target);
                        queue.push_back(target.clone());
                    }
                }
            }
        }

        let cyclic: Vec<NodeId> = candidates
            .into_iter()
            .filter(|id| !placed.contains(id) && self.nodes.contains_key(id))
            .collect();
        if !cyclic.is_empty() {
            log::debug!("{} nodes are on a cycle or fed by one, appended in insertion order", cyclic.len());
        }
        ordered.extend(cyclic);

        let priority = |id: &NodeId| self.nodes.get(id).map_or(0, |n| n.priority);
        ordered.sort_by_key(|id| priority(id));
        for (position, id) in ordered.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order = position;
            }
        }
        if !set_level {
            levels.clear();
        }
        (ordered, levels)
    }

    /// Recompute the execution order and the list of executable nodes
    pub fn update_execution_order(&mut self) {
        let (ordered, _) = self.compute_execution_order(false, false);
        self.executable = ordered
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| n.executes()))
            .cloned()
            .collect();
        self.nodes_in_order = ordered;
    }

    /// Nodes in execution order
    pub fn nodes_in_order(&self) -> &[NodeId] {
        &self.nodes_in_order
    }

    /// Nodes the step loop visits, in execution order
    pub fn executable_nodes(&self) -> &[NodeId] {
        &self.executable
    }

    /// Lay nodes out in columns by dependency level
    pub fn arrange(&mut self, margin: f64) {
        let (ordered, levels) = self.compute_execution_order(false, true);
        let mut columns: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for id in ordered {
            let level = levels.get(&id).copied().filter(|l| *l > 0).unwrap_or(1);
            columns.entry(level).or_default().push(id);
        }

        let mut x = margin;
        for column in columns.values() {
            let mut max_width: f64 = 100.0;
            let mut y = margin + layout::NODE_TITLE_HEIGHT;
            for id in column {
                let Some(node) = self.nodes.get_mut(id) else { continue };
                node.pos = [x, y];
                max_width = max_width.max(node.size[0]);
                y += node.size[1] + margin + layout::NODE_TITLE_HEIGHT;
            }
            x += max_width + margin;
        }
        self.on_graph_changed("arrange", true);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_chain_ordered_regardless_of_insertion() {
        let mut graph = test_graph();
        let c = graph.add_new("test/sum").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let a = graph.add_new("test/const").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();
        graph.connect(&b, 0, &c, 0).unwrap();

        let (order, _) = graph.compute_execution_order(false, false);
        assert_eq!(order, vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(graph.nodes_in_order(), &[a.clone(), b.clone(), c.clone()]);
        assert_eq!(graph.get_node(&c).unwrap().order, 2);
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let mut graph = test_graph();
        let ids: Vec<NodeId> = (0..4).map(|_| graph.add_new("test/const").unwrap()).collect();
        assert_eq!(graph.nodes_in_order(), ids.as_slice());
    }

    #[test]
    fn test_cycle_does_not_drop_nodes() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let c = graph.add_new("test/sum").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();
        graph.connect(&b, 0, &c, 0).unwrap();
        graph.connect(&c, 0, &b, 1).unwrap();

        let (order, _) = graph.compute_execution_order(false, false);
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_priority_sorts_stably() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/const").unwrap();
        let c = graph.add_new("test/const").unwrap();
        graph.get_node_mut(&a).unwrap().priority = 5;
        graph.update_execution_order();
        assert_eq!(graph.nodes_in_order(), &[b, c, a]);
    }

    #[test]
    fn test_executable_excludes_passive_nodes() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        graph.add_new("test/sink").unwrap();
        assert_eq!(graph.executable_nodes(), &[a]);
        assert_eq!(graph.nodes_in_order().len(), 2);
    }

    #[test]
    fn test_levels_and_arrange() {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let lone = graph.add_new("test/const").unwrap();
        graph.connect(&a, 0, &b, 0).unwrap();

        let (_, levels) = graph.compute_execution_order(false, true);
        assert_eq!(levels[&a], 1);
        assert_eq!(levels[&b], 2);
        assert_eq!(levels[&lone], 1);

        graph.arrange(100.0);
        let pos_a = graph.get_node(&a).unwrap().pos;
        let pos_b = graph.get_node(&b).unwrap().pos;
        let pos_lone = graph.get_node(&lone).unwrap().pos;
        assert_eq!(pos_a, [100.0, 130.0]);
        assert!(pos_b[0] > pos_a[0]);
        assert_eq!(pos_lone[0], pos_a[0]);
        assert!(pos_lone[1] > pos_a[1]);
    }
}
