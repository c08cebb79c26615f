//! Caller records and stored rows
//!
//! Callers hand the store free-form JSON objects. This module pulls out the
//! handful of fields the schema cares about and defines the row types that
//! lookups return.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::{Error, Result};

/// Borrow a record as a JSON object, rejecting anything else.
pub fn as_object<'a>(record: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    record
        .as_object()
        .ok_or_else(|| Error::invalid(format!("{} must be a JSON object", what)))
}

/// Read a scalar field as trimmed text.
///
/// Strings are trimmed; numbers and booleans use their JSON text. Null,
/// arrays, objects and blank strings count as absent.
pub fn text_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record.get(key).and_then(scalar_text)
}

/// Like [`text_field`], trying each key in order.
pub fn first_text_field(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text_field(record, key))
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Fields of a node record the schema stores in dedicated columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFields {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
}

impl NodeFields {
    pub fn extract(record: &Value) -> Result<Self> {
        let map = as_object(record, "node record")?;
        let external_id = text_field(map, "id")
            .ok_or_else(|| Error::invalid("node record requires a non-blank `id`"))?;
        let name = text_field(map, "name").unwrap_or_else(|| external_id.clone());
        let description = text_field(map, "description");

        // Non-list `aliases` is ignored rather than rejected.
        let aliases = match map.get("aliases") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        };

        Ok(Self { external_id, name, description, aliases })
    }
}

/// Fields of an edge record the schema stores in dedicated columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFields {
    pub subject: String,
    pub object: String,
    pub predicate: String,
    pub description: Option<String>,
    pub evidence: Option<String>,
}

const STANDARD_EDGE_KEYS: [&str; 3] = ["subject", "object", "predicate"];
const VIEWER_EDGE_KEYS: [&str; 3] = ["source", "target", "relationship_type"];

impl EdgeFields {
    /// Accepts `subject`/`object`/`predicate`, or the viewer's
    /// `source`/`target`/`relationship_type` spelling. The two are never
    /// mixed: once any of `subject`, `object` or `predicate` is present the
    /// viewer keys are ignored, so a provenance `source` cannot stand in for
    /// a missing subject.
    pub fn extract(record: &Value) -> Result<Self> {
        let map = as_object(record, "edge record")?;
        let keys = if STANDARD_EDGE_KEYS.iter().any(|key| map.contains_key(*key)) {
            STANDARD_EDGE_KEYS
        } else {
            VIEWER_EDGE_KEYS
        };
        let subject = text_field(map, keys[0]);
        let object = text_field(map, keys[1]);
        let predicate = text_field(map, keys[2]);

        let (Some(subject), Some(object), Some(predicate)) = (subject, object, predicate) else {
            return Err(Error::invalid("edge record requires subject, object, predicate"));
        };

        let evidence = match map.get("evidence") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(other) => Some(crate::canonical::to_canonical_json(other)?),
        };

        Ok(Self {
            subject,
            object,
            predicate,
            description: text_field(map, "description"),
            evidence,
        })
    }
}

/// A node row joined with its category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    /// Canonical JSON of the first record written for this node
    pub raw_json: String,
}

/// An edge row with endpoints and predicate resolved to their names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub id: i64,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub description: Option<String>,
    pub evidence: Option<String>,
    pub edge_json: String,
}

/// Edges touching one node, split by direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEdges {
    pub inbound: Vec<StoredEdge>,
    pub outbound: Vec<StoredEdge>,
}

/// The stored full-graph snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl GraphSnapshot {
    /// Parse the canonical payload back into JSON.
    pub fn payload_value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
