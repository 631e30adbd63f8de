//! Core value types shared by nodes, links and graphs
//!
//! These types define identities, slot typing and node modes, together
//! with the connection compatibility rule used everywhere a link is made.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::codes;

/// Identity of a node or link: a per-graph counter or a UUID string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Uuid(String),
}

/// Unique identifier for a node
pub type NodeId = Id;

/// Unique identifier for a link
pub type LinkId = Id;

impl Id {
    /// Marker for a node that was never added to a graph
    pub const UNSET: Id = Id::Num(-1);

    /// Generate a fresh random UUID id
    pub fn new_uuid() -> Self {
        Id::Uuid(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Id::Num(n) if *n < 0)
    }

    /// Numeric value when this is a counter id
    pub fn as_num(&self) -> Option<i64> {
        match self {
            Id::Num(n) => Some(*n),
            Id::Uuid(_) => None,
        }
    }

    /// Parse an id from a JSON value (number or string)
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Id::Num),
            Value::String(s) => Some(Id::Uuid(s.clone())),
            _ => None,
        }
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::UNSET
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{}", n),
            Id::Uuid(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Uuid(s.to_string())
    }
}

/// Execution mode of a node
///
/// Serialized as its integer code (ALWAYS=0 .. ON_REQUEST=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum NodeMode {
    /// Runs on every step
    #[default]
    Always,
    /// Runs only when an event reaches one of its action inputs
    OnEvent,
    /// Never runs
    Never,
    /// Runs its execute path when triggered
    OnTrigger,
    /// Runs lazily when a descendant asks for fresh data
    OnRequest,
}

impl NodeMode {
    pub fn code(self) -> i64 {
        match self {
            NodeMode::Always => 0,
            NodeMode::OnEvent => 1,
            NodeMode::Never => 2,
            NodeMode::OnTrigger => 3,
            NodeMode::OnRequest => 4,
        }
    }
}

impl From<NodeMode> for i64 {
    fn from(mode: NodeMode) -> Self {
        mode.code()
    }
}

impl TryFrom<i64> for NodeMode {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(NodeMode::Always),
            1 => Ok(NodeMode::OnEvent),
            2 => Ok(NodeMode::Never),
            3 => Ok(NodeMode::OnTrigger),
            4 => Ok(NodeMode::OnRequest),
            other => Err(format!("invalid node mode {}", other)),
        }
    }
}

/// The value type carried by a slot
///
/// `Any` covers the wildcard spellings (`0`, `""`, `"*"`), `Event` covers
/// both EVENT and ACTION slots (`-1`). Named types may list several
/// alternatives separated by commas (`"number,string"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum SlotType {
    #[default]
    Any,
    Event,
    Named(String),
}

impl SlotType {
    pub fn named(name: impl Into<String>) -> Self {
        SlotType::parse(&name.into())
    }

    /// Parse a textual type, recognizing wildcard and event spellings
    pub fn parse(text: &str) -> Self {
        if is_wildcard(text) {
            SlotType::Any
        } else if text == codes::EVENT_TOKEN || text == "-1" {
            SlotType::Event
        } else {
            SlotType::Named(text.to_string())
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, SlotType::Event)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, SlotType::Any)
    }

    /// Lowercased alternative tokens, as used by type searches and registries
    ///
    /// `Any` yields `"*"`, `Event` yields `"_event_"`.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            SlotType::Any => vec!["*".to_string()],
            SlotType::Event => vec![codes::EVENT_TOKEN.to_string()],
            SlotType::Named(name) => name
                .split([',', '|'])
                .map(|t| {
                    let t = t.trim().to_lowercase();
                    if is_wildcard(&t) {
                        "*".to_string()
                    } else {
                        t
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Any => write!(f, "*"),
            SlotType::Event => write!(f, "{}", codes::EVENT_TOKEN),
            SlotType::Named(name) => write!(f, "{}", name),
        }
    }
}

impl From<Value> for SlotType {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => SlotType::parse(&s),
            Value::Number(n) => match n.as_i64() {
                Some(0) => SlotType::Any,
                Some(codes::EVENT) => SlotType::Event,
                _ => SlotType::Named(n.to_string()),
            },
            _ => SlotType::Any,
        }
    }
}

impl From<SlotType> for Value {
    fn from(slot_type: SlotType) -> Self {
        match slot_type {
            SlotType::Any => Value::from(0),
            SlotType::Event => Value::from(codes::EVENT),
            SlotType::Named(name) => Value::String(name),
        }
    }
}

impl From<&str> for SlotType {
    fn from(text: &str) -> Self {
        SlotType::parse(text)
    }
}

fn is_wildcard(text: &str) -> bool {
    matches!(text, "" | "*" | "0")
}

/// Whether an output of type `a` may be linked to an input of type `b`
///
/// Wildcards match everything, EVENT matches ACTION, and comma-separated
/// types match when any pair of alternatives matches (case-insensitive).
pub fn is_valid_connection(a: &SlotType, b: &SlotType) -> bool {
    match (a, b) {
        (SlotType::Any, _) | (_, SlotType::Any) => true,
        (SlotType::Event, SlotType::Event) => true,
        (SlotType::Event, SlotType::Named(_)) | (SlotType::Named(_), SlotType::Event) => {
            let named = if a.is_event() { b } else { a };
            named.tokens().iter().any(|t| t == codes::EVENT_TOKEN || t == "*")
        }
        (SlotType::Named(x), SlotType::Named(y)) => {
            if x == y {
                return true;
            }
            let xs = a.tokens();
            let ys = b.tokens();
            xs.iter()
                .any(|tx| ys.iter().any(|ty| tx == "*" || ty == "*" || tx == ty))
        }
    }
}

/// Reference to a slot by position or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRef {
    Index(usize),
    Name(String),
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Index(i) => write!(f, "{}", i),
            SlotRef::Name(n) => write!(f, "{}", n),
        }
    }
}

impl From<usize> for SlotRef {
    fn from(index: usize) -> Self {
        SlotRef::Index(index)
    }
}

impl From<&str> for SlotRef {
    fn from(name: &str) -> Self {
        SlotRef::Name(name.to_string())
    }
}

impl From<String> for SlotRef {
    fn from(name: String) -> Self {
        SlotRef::Name(name)
    }
}

/// Which side of a node a slot lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotDirection {
    Input,
    Output,
}

impl SlotDirection {
    /// Wire code passed to connection hooks
    pub fn code(self) -> i64 {
        match self {
            SlotDirection::Input => codes::INPUT,
            SlotDirection::Output => codes::OUTPUT,
        }
    }
}
