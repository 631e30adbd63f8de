//! Graph integrity validation
//!
//! Checks that the link table and the link views kept on the slots agree,
//! that every link end exists, and that every node type is registered.
//! Cycles are legal and not reported.

use crate::graph::Graph;
use crate::types::{is_valid_connection, LinkId, NodeId, SlotDirection};

/// A broken invariant with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A link end refers to a node that is not in the graph
    UnknownNode { link_id: LinkId, node_id: NodeId },
    /// A link end refers to a slot index the node does not have
    SlotOutOfRange {
        link_id: LinkId,
        node_id: NodeId,
        direction: SlotDirection,
        slot: usize,
    },
    /// The slot at a link end does not list the link
    LinkNotOnSlot {
        link_id: LinkId,
        node_id: NodeId,
        direction: SlotDirection,
        slot: usize,
    },
    /// A slot lists a link that is missing from the link table, or that
    /// ends somewhere else
    StaleSlotLink {
        node_id: NodeId,
        direction: SlotDirection,
        slot: usize,
        link_id: LinkId,
    },
    /// The slot types at both ends of a link do not connect
    IncompatibleTypes {
        link_id: LinkId,
        output: String,
        input: String,
    },
    /// A node whose type is not registered
    UnknownNodeType { node_id: NodeId, node_type: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode { link_id, node_id } => {
                write!(f, "Link {} references unknown node {}", link_id, node_id)
            }
            Self::SlotOutOfRange {
                link_id,
                node_id,
                direction,
                slot,
            } => write!(
                f,
                "Link {} references {:?} slot {} of node {}, which does not exist",
                link_id, direction, slot, node_id
            ),
            Self::LinkNotOnSlot {
                link_id,
                node_id,
                direction,
                slot,
            } => write!(
                f,
                "{:?} slot {} of node {} does not list link {}",
                direction, slot, node_id, link_id
            ),
            Self::StaleSlotLink {
                node_id,
                direction,
                slot,
                link_id,
            } => write!(
                f,
                "{:?} slot {} of node {} lists link {}, which does not end there",
                direction, slot, node_id, link_id
            ),
            Self::IncompatibleTypes {
                link_id,
                output,
                input,
            } => write!(f, "Link {} connects incompatible types: {} -> {}", link_id, output, input),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node {}", node_type, node_id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a graph
///
/// Returns all validation errors found (not just the first).
pub fn validate_graph(graph: &Graph) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_links(graph, &mut errors);
    validate_slot_views(graph, &mut errors);
    validate_node_types(graph, &mut errors);
    errors
}

/// Check both ends of every link in the link table
fn validate_links(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for link in graph.links() {
        let origin = graph.get_node(&link.origin_id);
        let target = graph.get_node(&link.target_id);
        for (end, node) in [(&link.origin_id, origin), (&link.target_id, target)] {
            if node.is_none() {
                errors.push(ValidationError::UnknownNode {
                    link_id: link.id.clone(),
                    node_id: end.clone(),
                });
            }
        }

        let output = origin.map(|n| (n, n.output(link.origin_slot)));
        match output {
            Some((node, None)) => errors.push(ValidationError::SlotOutOfRange {
                link_id: link.id.clone(),
                node_id: node.id().clone(),
                direction: SlotDirection::Output,
                slot: link.origin_slot,
            }),
            Some((node, Some(slot))) if !slot.links.contains(&link.id) => {
                errors.push(ValidationError::LinkNotOnSlot {
                    link_id: link.id.clone(),
                    node_id: node.id().clone(),
                    direction: SlotDirection::Output,
                    slot: link.origin_slot,
                })
            }
            _ => {}
        }

        let input = target.map(|n| (n, n.input(link.target_slot)));
        match input {
            Some((node, None)) => errors.push(ValidationError::SlotOutOfRange {
                link_id: link.id.clone(),
                node_id: node.id().clone(),
                direction: SlotDirection::Input,
                slot: link.target_slot,
            }),
            Some((node, Some(slot))) if slot.link.as_ref() != Some(&link.id) => {
                errors.push(ValidationError::LinkNotOnSlot {
                    link_id: link.id.clone(),
                    node_id: node.id().clone(),
                    direction: SlotDirection::Input,
                    slot: link.target_slot,
                })
            }
            _ => {}
        }

        let output_type = origin.and_then(|n| n.output(link.origin_slot)).map(|s| &s.slot_type);
        let input_type = target.and_then(|n| n.input(link.target_slot)).map(|s| &s.slot_type);
        if let (Some(output), Some(input)) = (output_type, input_type) {
            if !is_valid_connection(output, input) {
                errors.push(ValidationError::IncompatibleTypes {
                    link_id: link.id.clone(),
                    output: output.to_string(),
                    input: input.to_string(),
                });
            }
        }
    }
}

/// Check that every link listed on a slot ends at that slot
fn validate_slot_views(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.nodes() {
        for (slot, input) in node.inputs().iter().enumerate() {
            let Some(link_id) = &input.link else { continue };
            let ok = graph
                .get_link(link_id)
                .is_some_and(|l| &l.target_id == node.id() && l.target_slot == slot);
            if !ok {
                errors.push(ValidationError::StaleSlotLink {
                    node_id: node.id().clone(),
                    direction: SlotDirection::Input,
                    slot,
                    link_id: link_id.clone(),
                });
            }
        }
        for (slot, output) in node.outputs().iter().enumerate() {
            for link_id in &output.links {
                let ok = graph
                    .get_link(link_id)
                    .is_some_and(|l| &l.origin_id == node.id() && l.origin_slot == slot);
                if !ok {
                    errors.push(ValidationError::StaleSlotLink {
                        node_id: node.id().clone(),
                        direction: SlotDirection::Output,
                        slot,
                        link_id: link_id.clone(),
                    });
                }
            }
        }
    }
}

/// Check that all nodes have registered types
fn validate_node_types(graph: &Graph, errors: &mut Vec<ValidationError>) {
    let registry = graph.runtime().registry();
    for node in graph.nodes() {
        if node.is_placeholder() || !registry.has_node_type(node.node_type()) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id().clone(),
                node_type: node.node_type().to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::graph::test_support::*;
    use crate::types::Id;

    fn connected_graph() -> (Graph, NodeId, NodeId, LinkId) {
        let mut graph = test_graph();
        let a = graph.add_new("test/const").unwrap();
        let b = graph.add_new("test/sum").unwrap();
        let link = graph.connect(&a, 0, &b, 0).unwrap();
        (graph, a, b, link)
    }

    #[test]
    fn test_valid_graph() {
        let (graph, ..) = connected_graph();
        assert!(validate_graph(&graph).is_empty());
    }

    #[test]
    fn test_link_to_removed_slot() {
        let (mut graph, _, b, link) = connected_graph();
        graph.links.get_mut(&link).unwrap().target_slot = 9;
        let errors = validate_graph(&graph);
        assert!(errors.contains(&ValidationError::SlotOutOfRange {
            link_id: link.clone(),
            node_id: b.clone(),
            direction: SlotDirection::Input,
            slot: 9,
        }));
        // the input still claims the link
        assert!(errors.contains(&ValidationError::StaleSlotLink {
            node_id: b,
            direction: SlotDirection::Input,
            slot: 0,
            link_id: link,
        }));
    }

    #[test]
    fn test_link_missing_from_table() {
        let (mut graph, a, _, link) = connected_graph();
        graph.links.remove(&link);
        let errors = validate_graph(&graph);
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::StaleSlotLink {
            node_id: a,
            direction: SlotDirection::Output,
            slot: 0,
            link_id: link,
        }));
    }

    #[test]
    fn test_link_to_unknown_node() {
        let (mut graph, _, _, link) = connected_graph();
        graph.links.get_mut(&link).unwrap().target_id = Id::Num(42);
        let errors = validate_graph(&graph);
        assert!(errors.contains(&ValidationError::UnknownNode {
            link_id: link,
            node_id: Id::Num(42),
        }));
    }

    #[test]
    fn test_placeholder_reported() {
        let mut graph = test_graph();
        let data = json!({"nodes": [{"id": 1, "type": "vendor/gone"}], "links": []});
        graph.configure(&data, false).unwrap();
        let errors = validate_graph(&graph);
        assert_eq!(
            errors,
            vec![ValidationError::UnknownNodeType {
                node_id: Id::Num(1),
                node_type: "vendor/gone".into(),
            }]
        );
        assert!(errors[0].to_string().contains("vendor/gone"));
    }

    #[test]
    fn test_incompatible_link_types() {
        let (mut graph, _, b, link) = connected_graph();
        graph.get_node_mut(&b).unwrap().inputs[0].slot_type = "string".into();
        let errors = validate_graph(&graph);
        assert_eq!(
            errors,
            vec![ValidationError::IncompatibleTypes {
                link_id: link,
                output: "number".into(),
                input: "string".into(),
            }]
        );
    }
}
