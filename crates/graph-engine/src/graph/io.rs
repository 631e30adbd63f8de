//! Global inputs and outputs of a graph
//!
//! These are the named values a containing subgraph node exchanges with the
//! graph. In a nested graph every change is also queued as an [`IoChange`],
//! which the owning node mirrors onto its own slots.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::hooks;
use crate::error::Result;
use crate::graph::{Graph, IoChange};
use crate::node::ExecOptions;
use crate::subgraph::GRAPH_INPUT_TYPE;
use crate::types::SlotType;

/// A named global input or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphIo {
    pub name: String,
    #[serde(rename = "type")]
    pub io_type: SlotType,
    pub value: Value,
}

impl Graph {
    fn io_changed(&mut self, hook: &str, args: &[Value], change: IoChange) {
        self.fire(hook, args);
        self.fire(hooks::ON_INPUTS_OUTPUTS_CHANGE, &[]);
        if self.is_subgraph() {
            self.io_changes.push(change);
        }
    }

    pub fn global_inputs(&self) -> impl Iterator<Item = &GraphIo> {
        self.inputs.values()
    }

    pub fn global_outputs(&self) -> impl Iterator<Item = &GraphIo> {
        self.outputs.values()
    }

    /// Add a global input; returns false when the name is taken
    pub fn add_global_input(&mut self, name: &str, io_type: SlotType, value: Value) -> bool {
        if self.inputs.contains_key(name) {
            return false;
        }
        let args = [json!(name), Value::from(io_type.clone())];
        self.inputs.insert(
            name.to_string(),
            GraphIo {
                name: name.to_string(),
                io_type: io_type.clone(),
                value,
            },
        );
        self.io_changed(
            hooks::ON_GRAPH_INPUT_ADDED,
            &args,
            IoChange::InputAdded {
                name: name.to_string(),
                slot_type: io_type,
            },
        );
        true
    }

    pub fn set_global_input_data(&mut self, name: &str, value: Value) -> bool {
        match self.inputs.get_mut(name) {
            Some(input) => {
                input.value = value;
                true
            }
            None => false,
        }
    }

    pub fn get_global_input_data(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).map(|i| &i.value)
    }

    /// Rename a global input, keeping its value
    pub fn rename_global_input(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.inputs.contains_key(old);
        }
        if self.inputs.contains_key(new) {
            log::debug!("Graph already has an input named '{}'", new);
            return false;
        }
        let Some(mut input) = self.inputs.remove(old) else {
            return false;
        };
        input.name = new.to_string();
        self.inputs.insert(new.to_string(), input);
        self.io_changed(
            hooks::ON_GRAPH_INPUT_RENAMED,
            &[json!(old), json!(new)],
            IoChange::InputRenamed {
                old: old.to_string(),
                new: new.to_string(),
            },
        );
        true
    }

    pub fn change_global_input_type(&mut self, name: &str, io_type: SlotType) -> bool {
        let Some(input) = self.inputs.get_mut(name) else {
            return false;
        };
        if input.io_type == io_type {
            return true;
        }
        input.io_type = io_type.clone();
        self.io_changed(
            hooks::ON_GRAPH_INPUT_TYPE_CHANGED,
            &[json!(name), Value::from(io_type.clone())],
            IoChange::InputTypeChanged {
                name: name.to_string(),
                slot_type: io_type,
            },
        );
        true
    }

    pub fn remove_global_input(&mut self, name: &str) -> bool {
        if self.inputs.remove(name).is_none() {
            return false;
        }
        self.io_changed(
            hooks::ON_GRAPH_INPUT_REMOVED,
            &[json!(name)],
            IoChange::InputRemoved { name: name.to_string() },
        );
        true
    }

    /// Add a global output; returns false when the name is taken
    pub fn add_global_output(&mut self, name: &str, io_type: SlotType, value: Value) -> bool {
        if self.outputs.contains_key(name) {
            return false;
        }
        let args = [json!(name), Value::from(io_type.clone())];
        self.outputs.insert(
            name.to_string(),
            GraphIo {
                name: name.to_string(),
                io_type: io_type.clone(),
                value,
            },
        );
        self.io_changed(
            hooks::ON_GRAPH_OUTPUT_ADDED,
            &args,
            IoChange::OutputAdded {
                name: name.to_string(),
                slot_type: io_type,
            },
        );
        true
    }

    pub fn set_global_output_data(&mut self, name: &str, value: Value) -> bool {
        match self.outputs.get_mut(name) {
            Some(output) => {
                output.value = value;
                true
            }
            None => false,
        }
    }

    pub fn get_global_output_data(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).map(|o| &o.value)
    }

    pub fn rename_global_output(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.outputs.contains_key(old);
        }
        if self.outputs.contains_key(new) {
            log::debug!("Graph already has an output named '{}'", new);
            return false;
        }
        let Some(mut output) = self.outputs.remove(old) else {
            return false;
        };
        output.name = new.to_string();
        self.outputs.insert(new.to_string(), output);
        self.io_changed(
            hooks::ON_GRAPH_OUTPUT_RENAMED,
            &[json!(old), json!(new)],
            IoChange::OutputRenamed {
                old: old.to_string(),
                new: new.to_string(),
            },
        );
        true
    }

    pub fn change_global_output_type(&mut self, name: &str, io_type: SlotType) -> bool {
        let Some(output) = self.outputs.get_mut(name) else {
            return false;
        };
        if output.io_type == io_type {
            return true;
        }
        output.io_type = io_type.clone();
        self.io_changed(
            hooks::ON_GRAPH_OUTPUT_TYPE_CHANGED,
            &[json!(name), Value::from(io_type.clone())],
            IoChange::OutputTypeChanged {
                name: name.to_string(),
                slot_type: io_type,
            },
        );
        true
    }

    pub fn remove_global_output(&mut self, name: &str) -> bool {
        if self.outputs.remove(name).is_none() {
            return false;
        }
        self.io_changed(
            hooks::ON_GRAPH_OUTPUT_REMOVED,
            &[json!(name)],
            IoChange::OutputRemoved { name: name.to_string() },
        );
        true
    }

    /// Deliver an action to the graph input node named `action`
    ///
    /// Returns false when no graph input node carries that name.
    pub fn on_action(&mut self, action: &str, param: Value, options: ExecOptions) -> Result<bool> {
        let target = self.nodes().find(|n| {
            n.node_type() == GRAPH_INPUT_TYPE && n.property("name").and_then(Value::as_str) == Some(action)
        });
        let Some(id) = target.map(|n| n.id().clone()) else {
            log::debug!("No graph input named '{}' to receive the action", action);
            return Ok(false);
        };
        self.action_do(&id, action, param, options, None)?;
        Ok(true)
    }

    /// Fire a graph-level event, forwarded to the owning subgraph node's output of the same name
    pub fn trigger_event(&mut self, name: &str, param: Value) {
        self.fire(hooks::ON_TRIGGER, &[json!(name), param.clone()]);
        if self.is_subgraph() {
            self.io_changes.push(IoChange::Trigger {
                name: name.to_string(),
                param,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_global_input_lifecycle() {
        let mut graph = test_graph();
        assert!(graph.add_global_input("x", "number".into(), json!(1)));
        assert!(!graph.add_global_input("x", "string".into(), json!("no")));
        assert!(graph.set_global_input_data("x", json!(5)));
        assert!(!graph.set_global_input_data("missing", json!(5)));
        assert_eq!(graph.get_global_input_data("x"), Some(&json!(5)));

        assert!(graph.rename_global_input("x", "y"));
        assert_eq!(graph.get_global_input_data("x"), None);
        assert_eq!(graph.get_global_input_data("y"), Some(&json!(5)));
        assert!(graph.change_global_input_type("y", "string".into()));
        assert_eq!(graph.global_inputs().next().unwrap().io_type, SlotType::from("string"));
        assert!(graph.remove_global_input("y"));
        assert!(!graph.remove_global_input("y"));
        assert_eq!(graph.global_inputs().count(), 0);
    }

    #[test]
    fn test_rename_refuses_taken_name() {
        let mut graph = test_graph();
        graph.add_global_output("a", "number".into(), Value::Null);
        graph.add_global_output("b", "number".into(), Value::Null);
        assert!(!graph.rename_global_output("a", "b"));
        assert!(!graph.rename_global_output("zz", "c"));
        assert!(graph.rename_global_output("a", "a"));
        assert!(graph.set_global_output_data("b", json!(true)));
        assert_eq!(graph.get_global_output_data("b"), Some(&json!(true)));
    }

    #[test]
    fn test_io_hooks_fire() {
        let mut graph = test_graph();
        let log = hook_log(
            &mut graph.callbacks,
            &[
                hooks::ON_GRAPH_INPUT_ADDED,
                hooks::ON_GRAPH_OUTPUT_RENAMED,
                hooks::ON_INPUTS_OUTPUTS_CHANGE,
            ],
        );
        graph.add_global_input("x", "number".into(), Value::Null);
        graph.add_global_output("y", "number".into(), Value::Null);
        graph.rename_global_output("y", "z");
        assert_eq!(
            *log.lock(),
            vec![
                "onInputAdded",
                "onInputsOutputsChange",
                "onInputsOutputsChange",
                "onOutputRenamed",
                "onInputsOutputsChange",
            ]
        );
    }

    #[test]
    fn test_changes_queued_only_when_nested() {
        let mut top = test_graph();
        top.add_global_input("x", "number".into(), Value::Null);
        top.trigger_event("done", Value::Null);
        assert!(top.io_changes.is_empty());

        let mut nested = Graph::nested(test_runtime());
        nested.add_global_input("x", "number".into(), Value::Null);
        nested.change_global_input_type("x", "string".into());
        nested.trigger_event("done", json!(1));
        assert_eq!(
            nested.io_changes,
            vec![
                IoChange::InputAdded {
                    name: "x".into(),
                    slot_type: "number".into()
                },
                IoChange::InputTypeChanged {
                    name: "x".into(),
                    slot_type: "string".into()
                },
                IoChange::Trigger {
                    name: "done".into(),
                    param: json!(1)
                },
            ]
        );
    }

    #[test]
    fn test_on_action_routes_to_named_graph_input() {
        let mut graph = test_graph();
        let input = graph.add_new(GRAPH_INPUT_TYPE).unwrap();
        graph.set_property(&input, "name", json!("go")).unwrap();
        graph.set_property(&input, "type", json!("event")).unwrap();
        let sink = graph.add_new("test/sink").unwrap();
        graph.connect(&input, 0, &sink, "a").unwrap();

        assert!(graph.on_action("go", json!(3), ExecOptions::default()).unwrap());
        assert!(!graph.on_action("stop", Value::Null, ExecOptions::default()).unwrap());
        let received = &graph.get_node(&sink).unwrap().behavior::<SinkNode>().unwrap().received;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "a");
    }
}
