//! Graph Engine - dataflow graphs of typed nodes
//!
//! This crate provides a node graph execution engine. A graph holds nodes
//! with typed input and output slots, joined by links. It supports:
//!
//! - Per-step execution in dependency order, cycles included
//! - Data links and EVENT/ACTION links, with deferred or immediate actions
//! - Lazy ancestor refresh for on-request nodes
//! - JSON persistence that survives drift in the registered node types
//! - Nested graphs whose named inputs/outputs mirror onto the owning node
//! - Compressed snapshot history of graph changes
//!
//! # Architecture
//!
//! - `Runtime`: configuration, node type registry and global hooks, shared by graphs
//! - `Graph`: owns nodes, links and groups; every multi-node operation lives here
//! - `NodeBehavior`: per-type hooks, called with a `NodeContext` into the graph
//! - `EventSink`: generic event streaming of what a graph did
//!
//! # Example
//!
//! ```ignore
//! use graph_engine::{Graph, Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::default());
//! runtime.register_type::<SumNode>()?;
//!
//! let mut graph = Graph::new(runtime);
//! let a = graph.add_new("math/const")?;
//! let b = graph.add_new("math/sum")?;
//! graph.connect(&a, 0, &b, 0)?;
//! graph.run_step(1, None)?;
//! ```

pub mod callback;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod graph;
pub mod group;
pub mod history;
pub mod link;
pub mod node;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod slot;
pub mod subgraph;
pub mod types;
pub mod validation;

// Re-export key types
pub use callback::{CallbackHandler, HandlerId, HookInfo, HookOutcome, HookResult};
pub use config::{GraphConfig, RuntimeConfig};
pub use descriptor::{NodeDescriptor, NodeTypeFn, NodeTypeMetadata, PropertySpec, SlotSpec};
pub use error::{GraphError, Result};
pub use events::{EventLog, EventSink, GraphEvent};
pub use graph::{AncestorFilter, ConnectByTypeOptions, Graph, GraphIo, NodeContext};
pub use group::Group;
pub use history::ActionHistory;
pub use link::Link;
pub use node::{ConnectionChange, ExecOptions, Node, NodeBehavior, PendingAction};
pub use registry::{NodeFactory, NodeFunction, NodeRegistry, Registration};
pub use runtime::Runtime;
pub use slot::{InputSlot, OutputSlot};
pub use subgraph::{GraphInput, GraphOutput, Subgraph, GRAPH_INPUT_TYPE, GRAPH_OUTPUT_TYPE, SUBGRAPH_TYPE};
pub use types::{is_valid_connection, Id, LinkId, NodeId, NodeMode, SlotDirection, SlotRef, SlotType};
pub use validation::{validate_graph, ValidationError};
