//! Graph nodes
//!
//! A [`Node`] carries its slots, properties, layout fields and runtime
//! bookkeeping. Everything here works on a detached node; operations that
//! touch links or other nodes live on [`crate::Graph`] and take a node id.

mod behavior;

use std::fmt;

use serde_json::{Map, Value};

pub use behavior::{ConnectionChange, ExecOptions, NodeBehavior, PendingAction};

use crate::callback::CallbackHandler;
use crate::constants::{hooks, layout};
use crate::descriptor::{NodeTypeMetadata, PropertySpec};
use crate::slot::{InputSlot, OutputSlot};
use crate::types::{is_valid_connection, Id, NodeId, NodeMode, SlotDirection, SlotRef, SlotType};

/// A node instance
pub struct Node {
    pub(crate) id: NodeId,
    node_type: String,
    default_title: String,
    pub title: String,
    pub pos: [f64; 2],
    pub size: [f64; 2],
    pub flags: Map<String, Value>,
    /// Position in the last computed execution order
    pub order: usize,
    pub mode: NodeMode,
    pub priority: i32,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub properties: Map<String, Value>,
    pub properties_info: Vec<PropertySpec>,
    pub widgets_values: Option<Vec<Value>>,
    pub color: Option<String>,
    pub bgcolor: Option<String>,
    /// Persisted fields this node type does not interpret
    pub extra: Map<String, Value>,
    /// Set on placeholders of unregistered types
    pub has_errors: bool,
    /// Hook handlers attached to this instance
    pub callbacks: CallbackHandler,
    pub(crate) last_serialization: Option<Value>,
    pub(crate) exec_version: Option<u64>,
    pub(crate) action_call: Option<String>,
    pub(crate) waiting_actions: Vec<PendingAction>,
    pub(crate) behavior: Option<Box<dyn NodeBehavior>>,
    pub(crate) executes: bool,
    pub(crate) handles_actions: bool,
    pub(crate) type_revision: u64,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &self.node_type)
            .field("title", &self.title)
            .field("mode", &self.mode)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a bare node without behaviour
    pub fn new(node_type: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: Id::UNSET,
            node_type: node_type.into(),
            default_title: title.clone(),
            title,
            pos: layout::DEFAULT_POSITION,
            size: [layout::NODE_WIDTH, layout::NODE_MIN_HEIGHT],
            flags: Map::new(),
            order: 0,
            mode: NodeMode::Always,
            priority: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Map::new(),
            properties_info: Vec::new(),
            widgets_values: None,
            color: None,
            bgcolor: None,
            extra: Map::new(),
            has_errors: false,
            callbacks: CallbackHandler::new(),
            last_serialization: None,
            exec_version: None,
            action_call: None,
            waiting_actions: Vec::new(),
            behavior: None,
            executes: false,
            handles_actions: false,
            type_revision: 0,
        }
    }

    /// Build a node from its type metadata and behaviour
    pub(crate) fn from_metadata(meta: &NodeTypeMetadata, mut behavior: Box<dyn NodeBehavior>) -> Self {
        let mut node = Node::new(meta.node_type.clone(), meta.title.clone());
        node.priority = meta.priority;
        for spec in &meta.inputs {
            node.add_input_with(spec.name.clone(), spec.slot_type.clone(), spec.extra.clone());
        }
        for spec in &meta.outputs {
            node.add_output_with(spec.name.clone(), spec.slot_type.clone(), spec.extra.clone());
        }
        for spec in &meta.properties {
            node.add_property(spec.clone());
        }
        behavior.init(&mut node);
        node.executes = behavior.executes();
        node.handles_actions = behavior.handles_actions();
        node.behavior = Some(behavior);
        node.size = node.compute_size();
        node
    }

    /// Inert stand-in for a node whose type is not registered
    ///
    /// It keeps its persisted data and serializes it back unchanged.
    pub fn placeholder(data: &Value) -> Self {
        let node_type = data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let title = data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(&node_type)
            .to_string();
        let mut node = Node::new(node_type, title);
        node.has_errors = true;
        node.last_serialization = Some(data.clone());
        node
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Title declared by the node type
    pub fn type_title(&self) -> &str {
        &self.default_title
    }

    pub fn is_placeholder(&self) -> bool {
        self.last_serialization.is_some()
    }

    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn input(&self, slot: usize) -> Option<&InputSlot> {
        self.inputs.get(slot)
    }

    pub fn output(&self, slot: usize) -> Option<&OutputSlot> {
        self.outputs.get(slot)
    }

    pub(crate) fn input_mut(&mut self, slot: usize) -> Option<&mut InputSlot> {
        self.inputs.get_mut(slot)
    }

    pub(crate) fn output_mut(&mut self, slot: usize) -> Option<&mut OutputSlot> {
        self.outputs.get_mut(slot)
    }

    /// Whether the node has an execute path
    pub fn executes(&self) -> bool {
        self.executes || self.callbacks.has_handlers(hooks::ON_EXECUTE)
    }

    /// Whether the node has an action path
    pub fn handles_actions(&self) -> bool {
        self.handles_actions || self.callbacks.has_handlers(hooks::ON_ACTION)
    }

    /// Iteration of the last execution
    pub fn exec_version(&self) -> Option<u64> {
        self.exec_version
    }

    /// `action_call` of the last execution or action
    pub fn action_call(&self) -> Option<&str> {
        self.action_call.as_deref()
    }

    pub fn pending_actions(&self) -> &[PendingAction] {
        &self.waiting_actions
    }

    /// Downcast the behaviour to a concrete type
    pub fn behavior<T: NodeBehavior>(&self) -> Option<&T> {
        self.behavior.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn behavior_mut<T: NodeBehavior>(&mut self) -> Option<&mut T> {
        self.behavior.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    pub fn add_input(&mut self, name: impl Into<String>, slot_type: impl Into<SlotType>) -> usize {
        self.add_input_with(name, slot_type, Map::new())
    }

    /// Append an input with extra descriptor fields, returning its index
    pub fn add_input_with(
        &mut self,
        name: impl Into<String>,
        slot_type: impl Into<SlotType>,
        extra: Map<String, Value>,
    ) -> usize {
        let slot = InputSlot::new(name, slot_type).with_extra(extra);
        let args = [serde_json::to_value(&slot).unwrap_or(Value::Null)];
        self.inputs.push(slot);
        self.grow_to_fit();
        self.callbacks.process(hooks::ON_INPUT_ADDED, &args, || None);
        self.inputs.len() - 1
    }

    pub fn add_output(&mut self, name: impl Into<String>, slot_type: impl Into<SlotType>) -> usize {
        self.add_output_with(name, slot_type, Map::new())
    }

    /// Append an output with extra descriptor fields, returning its index
    pub fn add_output_with(
        &mut self,
        name: impl Into<String>,
        slot_type: impl Into<SlotType>,
        extra: Map<String, Value>,
    ) -> usize {
        let slot = OutputSlot::new(name, slot_type).with_extra(extra);
        let args = [serde_json::to_value(&slot).unwrap_or(Value::Null)];
        self.outputs.push(slot);
        self.grow_to_fit();
        self.callbacks.process(hooks::ON_OUTPUT_ADDED, &args, || None);
        self.outputs.len() - 1
    }

    /// Declare a property and set its default value
    pub fn add_property(&mut self, spec: PropertySpec) {
        self.properties.insert(spec.name.clone(), spec.default.clone());
        self.properties_info.push(spec);
    }

    pub fn find_input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn find_output_slot(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    pub fn resolve_input(&self, slot: &SlotRef) -> Option<usize> {
        match slot {
            SlotRef::Index(i) => (*i < self.inputs.len()).then_some(*i),
            SlotRef::Name(name) => self.find_input_slot(name),
        }
    }

    pub fn resolve_output(&self, slot: &SlotRef) -> Option<usize> {
        match slot {
            SlotRef::Index(i) => (*i < self.outputs.len()).then_some(*i),
            SlotRef::Name(name) => self.find_output_slot(name),
        }
    }

    /// First unconnected input whose type is not in `not_accepted`
    pub fn find_input_slot_free(&self, not_accepted: &[SlotType]) -> Option<usize> {
        self.inputs.iter().position(|s| {
            s.link.is_none() && !type_listed(&s.slot_type, not_accepted)
        })
    }

    /// First unconnected output whose type is not in `not_accepted`
    pub fn find_output_slot_free(&self, not_accepted: &[SlotType]) -> Option<usize> {
        self.outputs.iter().position(|s| {
            s.links.is_empty() && !type_listed(&s.slot_type, not_accepted)
        })
    }

    /// Find a slot compatible with `wanted`
    ///
    /// With `prefer_free`, occupied matches are only used when no free one
    /// exists, and never when `do_not_use_occupied` is set.
    pub fn find_slot_by_type(
        &self,
        direction: SlotDirection,
        wanted: &SlotType,
        prefer_free: bool,
        do_not_use_occupied: bool,
    ) -> Option<usize> {
        let slots: Vec<(&SlotType, bool)> = match direction {
            SlotDirection::Input => self
                .inputs
                .iter()
                .map(|s| (&s.slot_type, s.link.is_some()))
                .collect(),
            SlotDirection::Output => self
                .outputs
                .iter()
                .map(|s| (&s.slot_type, !s.links.is_empty()))
                .collect(),
        };
        let wanted_tokens = wanted.tokens();
        let mut occupied_match = None;
        for (index, (slot_type, occupied)) in slots.into_iter().enumerate() {
            let slot_tokens = slot_type.tokens();
            let compatible = wanted_tokens.iter().any(|w| {
                slot_tokens
                    .iter()
                    .any(|s| is_valid_connection(&SlotType::parse(w), &SlotType::parse(s)))
            });
            if !compatible {
                continue;
            }
            if prefer_free && occupied {
                occupied_match.get_or_insert(index);
                continue;
            }
            return Some(index);
        }
        if do_not_use_occupied {
            None
        } else {
            occupied_match
        }
    }

    pub fn find_input_slot_by_type(&self, wanted: &SlotType, prefer_free: bool) -> Option<usize> {
        self.find_slot_by_type(SlotDirection::Input, wanted, prefer_free, false)
    }

    pub fn find_output_slot_by_type(&self, wanted: &SlotType, prefer_free: bool) -> Option<usize> {
        self.find_slot_by_type(SlotDirection::Output, wanted, prefer_free, false)
    }

    pub fn is_input_connected(&self, slot: usize) -> bool {
        self.inputs.get(slot).is_some_and(InputSlot::is_connected)
    }

    pub fn is_output_connected(&self, slot: usize) -> bool {
        self.outputs.get(slot).is_some_and(OutputSlot::is_connected)
    }

    pub fn is_any_output_connected(&self) -> bool {
        self.outputs.iter().any(OutputSlot::is_connected)
    }

    /// Last value written to an output
    pub fn get_output_data(&self, slot: usize) -> Option<&Value> {
        self.outputs.get(slot)?.data.as_ref()
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Minimum size that fits the title and slot labels
    pub fn compute_size(&self) -> [f64; 2] {
        if let Some(size) = self.behavior.as_ref().and_then(|b| b.compute_size(self)) {
            return size;
        }
        let title_width = 40.0 + text_width(&self.title);
        let input_width = self
            .inputs
            .iter()
            .map(|s| text_width(s.label()))
            .fold(0.0, f64::max);
        let output_width = self
            .outputs
            .iter()
            .map(|s| text_width(s.label()))
            .fold(0.0, f64::max);
        let width = (input_width + output_width + 50.0)
            .max(title_width)
            .max(layout::NODE_MIN_WIDTH);
        let rows = self.inputs.len().max(self.outputs.len()).max(1) as f64;
        let height = (rows * layout::NODE_SLOT_HEIGHT + 10.0).max(layout::NODE_MIN_HEIGHT);
        [width, height]
    }

    fn grow_to_fit(&mut self) {
        let size = self.compute_size();
        self.size[0] = self.size[0].max(size[0]);
        self.size[1] = self.size[1].max(size[1]);
    }

    /// `[x, y, width, height]`, title bar included
    pub fn bounding(&self) -> [f64; 4] {
        [
            self.pos[0],
            self.pos[1] - layout::NODE_TITLE_HEIGHT,
            self.size[0],
            self.size[1] + layout::NODE_TITLE_HEIGHT,
        ]
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Plain JSON form of the node
    pub fn serialize(&self) -> Value {
        if let Some(data) = &self.last_serialization {
            return self.overlay_live_fields(data);
        }
        let mut data = self.extra.clone();
        data.insert("id".into(), serde_json::to_value(&self.id).unwrap_or(Value::Null));
        data.insert("type".into(), Value::String(self.node_type.clone()));
        data.insert("pos".into(), serde_json::json!(self.pos));
        data.insert("size".into(), serde_json::json!(self.size));
        data.insert("flags".into(), Value::Object(self.flags.clone()));
        data.insert("order".into(), Value::from(self.order));
        data.insert("mode".into(), Value::from(self.mode.code()));
        if !self.inputs.is_empty() {
            data.insert(
                "inputs".into(),
                serde_json::to_value(&self.inputs).unwrap_or(Value::Null),
            );
        }
        if !self.outputs.is_empty() {
            data.insert(
                "outputs".into(),
                serde_json::to_value(&self.outputs).unwrap_or(Value::Null),
            );
        }
        if self.title != self.default_title {
            data.insert("title".into(), Value::String(self.title.clone()));
        }
        data.insert("properties".into(), Value::Object(self.properties.clone()));
        if let Some(values) = &self.widgets_values {
            data.insert("widgets_values".into(), Value::Array(values.clone()));
        }
        if let Some(color) = &self.color {
            data.insert("color".into(), Value::String(color.clone()));
        }
        if let Some(bgcolor) = &self.bgcolor {
            data.insert("bgcolor".into(), Value::String(bgcolor.clone()));
        }
        if let Some(behavior) = &self.behavior {
            behavior.on_serialize(self, &mut data);
        }
        let data = Value::Object(data);
        self.callbacks
            .process(hooks::ON_SERIALIZE, std::slice::from_ref(&data), || None);
        data
    }

    /// Stored data of a placeholder with the fields the graph may have
    /// changed since loading: id, mode, flags and slot links
    fn overlay_live_fields(&self, stored: &Value) -> Value {
        let Value::Object(mut data) = stored.clone() else {
            return stored.clone();
        };
        if !self.id.is_unset() {
            data.insert("id".into(), serde_json::to_value(&self.id).unwrap_or(Value::Null));
        }
        if data.contains_key("mode") || self.mode != NodeMode::Always {
            data.insert("mode".into(), Value::from(self.mode.code()));
        }
        if data.contains_key("flags") || !self.flags.is_empty() {
            data.insert("flags".into(), Value::Object(self.flags.clone()));
        }
        if let Some(Value::Array(inputs)) = data.get_mut("inputs") {
            inputs.truncate(self.inputs.len());
            for (i, slot) in self.inputs.iter().enumerate() {
                let link = slot
                    .link
                    .as_ref()
                    .and_then(|l| serde_json::to_value(l).ok())
                    .unwrap_or(Value::Null);
                match inputs.get_mut(i).and_then(Value::as_object_mut) {
                    Some(input) => {
                        input.insert("link".into(), link);
                    }
                    None => inputs.push(serde_json::to_value(slot).unwrap_or(Value::Null)),
                }
            }
        }
        if let Some(Value::Array(outputs)) = data.get_mut("outputs") {
            outputs.truncate(self.outputs.len());
            for (i, slot) in self.outputs.iter().enumerate() {
                let links = serde_json::to_value(&slot.links).unwrap_or(Value::Null);
                match outputs.get_mut(i).and_then(Value::as_object_mut) {
                    Some(output) => {
                        output.insert("links".into(), links);
                    }
                    None => outputs.push(serde_json::to_value(slot).unwrap_or(Value::Null)),
                }
            }
        }
        Value::Object(data)
    }

    /// Apply the plain fields of a serialized node
    ///
    /// Slots, properties and hooks are handled by the graph, which also
    /// fixes up links; see [`crate::Graph::configure_node`].
    pub(crate) fn apply_fields(&mut self, key: &str, value: &Value) {
        match key {
            "id" | "type" | "inputs" | "outputs" | "properties" => {}
            "title" => {
                if let Some(title) = value.as_str() {
                    self.title = title.to_string();
                }
            }
            "pos" => match serde_json::from_value(value.clone()) {
                Ok(pos) => self.pos = pos,
                Err(e) => log::warn!("Node {}: ignoring invalid pos: {}", self.id, e),
            },
            "size" => match serde_json::from_value(value.clone()) {
                Ok(size) => self.size = size,
                Err(e) => log::warn!("Node {}: ignoring invalid size: {}", self.id, e),
            },
            "flags" => {
                if let Some(flags) = value.as_object() {
                    self.flags = flags.clone();
                }
            }
            "order" => {
                if let Some(order) = value.as_u64() {
                    self.order = order as usize;
                }
            }
            "mode" => match serde_json::from_value(value.clone()) {
                Ok(mode) => self.mode = mode,
                Err(e) => log::warn!("Node {}: ignoring invalid mode: {}", self.id, e),
            },
            "widgets_values" => {
                self.widgets_values = value.as_array().cloned();
            }
            "color" => self.color = value.as_str().map(str::to_string),
            "bgcolor" => self.bgcolor = value.as_str().map(str::to_string),
            _ => {
                self.extra.insert(key.to_string(), value.clone());
            }
        }
    }
}

fn type_listed(slot_type: &SlotType, list: &[SlotType]) -> bool {
    let tokens = slot_type.tokens();
    list.iter()
        .any(|t| t.tokens().iter().any(|x| tokens.contains(x)))
}

fn text_width(text: &str) -> f64 {
    layout::NODE_TEXT_SIZE * text.chars().count() as f64 * 0.423
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Node {
        let mut node = Node::new("test/sample", "Sample");
        node.add_input("a", "number");
        node.add_input("b", "string");
        node.add_input("go", SlotType::Event);
        node.add_output("out", "number");
        node
    }

    #[test]
    fn test_find_slots_by_name() {
        let node = sample();
        assert_eq!(node.find_input_slot("b"), Some(1));
        assert_eq!(node.find_input_slot("zz"), None);
        assert_eq!(node.resolve_output(&SlotRef::from("out")), Some(0));
        assert_eq!(node.resolve_input(&SlotRef::Index(7)), None);
    }

    #[test]
    fn test_find_slot_by_type_prefers_free() {
        let mut node = Node::new("t", "T");
        node.add_input("first", "number");
        node.add_input("second", "number");
        node.inputs[0].link = Some(Id::Num(1));
        assert_eq!(node.find_input_slot_by_type(&"number".into(), true), Some(1));
        node.inputs[1].link = Some(Id::Num(2));
        assert_eq!(node.find_input_slot_by_type(&"number".into(), true), Some(0));
        assert_eq!(
            node.find_slot_by_type(SlotDirection::Input, &"number".into(), true, true),
            None
        );
    }

    #[test]
    fn test_find_slot_by_type_event_and_alternatives() {
        let node = sample();
        assert_eq!(node.find_input_slot_by_type(&SlotType::Event, false), Some(2));
        assert_eq!(node.find_input_slot_by_type(&"boolean|string".into(), false), Some(1));
        assert_eq!(node.find_input_slot_by_type(&"image".into(), false), None);
    }

    #[test]
    fn test_find_free_slot_skips_types() {
        let node = sample();
        assert_eq!(node.find_input_slot_free(&["number".into()]), Some(1));
        assert_eq!(node.find_input_slot_free(&[]), Some(0));
    }

    #[test]
    fn test_compute_size_grows_with_slots() {
        let mut node = Node::new("t", "T");
        let empty = node.compute_size();
        assert_eq!(empty[1], layout::NODE_SLOT_HEIGHT + 10.0);
        node.add_input("a", "number");
        node.add_input("b", "number");
        node.add_input("c", "number");
        assert_eq!(node.compute_size()[1], 3.0 * layout::NODE_SLOT_HEIGHT + 10.0);
        assert!(node.size[1] >= node.compute_size()[1]);
    }

    #[test]
    fn test_serialize_fields() {
        let mut node = sample();
        node.id = Id::Num(4);
        node.properties.insert("value".into(), json!(2));
        let data = node.serialize();
        assert_eq!(data["id"], 4);
        assert_eq!(data["type"], "test/sample");
        assert_eq!(data["mode"], 0);
        assert_eq!(data["inputs"][2]["type"], -1);
        assert_eq!(data["outputs"][0]["links"], json!([]));
        assert_eq!(data["properties"]["value"], 2);
        assert!(data.get("title").is_none());

        node.title = "Renamed".into();
        assert_eq!(node.serialize()["title"], "Renamed");
    }

    #[test]
    fn test_placeholder_serializes_verbatim() {
        let raw = json!({"id": 9, "type": "missing/type", "custom": [1, 2]});
        let node = Node::placeholder(&raw);
        assert!(node.has_errors);
        assert!(node.is_placeholder());
        assert_eq!(node.serialize(), raw);
    }

    #[test]
    fn test_placeholder_serializes_live_id_mode_and_links() {
        let raw = json!({
            "id": 9, "type": "missing/type", "mode": 0, "custom": true,
            "inputs": [{"name": "in", "type": "number", "link": 3, "label": "In"}],
            "outputs": [{"name": "out", "type": "number", "links": [4, 5]}]
        });
        let mut node = Node::placeholder(&raw);
        node.inputs = serde_json::from_value(raw["inputs"].clone()).unwrap();
        node.outputs = serde_json::from_value(raw["outputs"].clone()).unwrap();

        node.id = Id::Num(12);
        node.mode = NodeMode::Never;
        node.inputs[0].link = None;
        node.outputs[0].links.retain(|l| l != &Id::Num(4));

        let data = node.serialize();
        assert_eq!(data["id"], 12);
        assert_eq!(data["mode"], NodeMode::Never.code());
        assert_eq!(data["inputs"][0]["link"], Value::Null);
        assert_eq!(data["inputs"][0]["label"], "In");
        assert_eq!(data["outputs"][0]["links"], json!([5]));
        assert_eq!(data["custom"], true);
        assert!(data.get("flags").is_none());
    }

    #[test]
    fn test_slot_added_hook() {
        use crate::callback::HookResult;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let seen = Arc::new(AtomicUsize::new(0));
        let mut node = Node::new("t", "T");
        let counter = seen.clone();
        node.callbacks.register(hooks::ON_INPUT_ADDED, 0, move |_, args| {
            assert_eq!(args[0]["name"], "x");
            counter.fetch_add(1, Ordering::SeqCst);
            Some(HookResult::default())
        });
        node.add_input("x", "number");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_fields_kept_in_extra() {
        let mut node = Node::new("t", "T");
        node.apply_fields("shape", &json!(2));
        node.apply_fields("mode", &json!(3));
        assert_eq!(node.mode, NodeMode::OnTrigger);
        assert_eq!(node.serialize()["shape"], 2);
    }
}
