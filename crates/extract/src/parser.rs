//! Best-effort decoding of free-form model output into entities and relationships.
//!
//! The matched text is only ever structurally decoded as JSON.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::{ExtractionError, RecordKind};
use crate::schema::{Entity, ExtractionResult, Relationship};

/// Greedy: first `{` to last `}`, across newlines
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

#[derive(Deserialize)]
struct RawEntity {
    entity_name: String,
    entity_type: String,
    entity_description: String,
}

#[derive(Deserialize)]
struct RawRelationship {
    source_entity: String,
    target_entity: String,
    relation: String,
    relationship_description: String,
}

/// Outcome of parsing one response: the records that decoded, plus the ones rejected
#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub result: ExtractionResult,
    pub rejected: Vec<ExtractionError>,
}

/// Parse a raw model response.
///
/// Returns `Err(ExtractionError::Parse)` only when the object span cannot be
/// decoded at all. A response with no braces is an empty result.
pub fn parse_response(raw: &str) -> Result<ParsedResponse, ExtractionError> {
    let Some(found) = JSON_OBJECT.find(raw) else {
        return Ok(ParsedResponse::default());
    };

    let data: Value = serde_json::from_str(found.as_str())
        .map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let mut parsed = ParsedResponse::default();

    for (position, record) in records(&data, "entities").into_iter().enumerate() {
        match serde_json::from_value::<RawEntity>(record.clone()) {
            Ok(raw) => parsed.result.entities.push(Entity::new(
                raw.entity_name,
                raw.entity_type,
                raw.entity_description,
            )),
            Err(e) => parsed.rejected.push(ExtractionError::Field {
                kind: RecordKind::Entity,
                position,
                message: e.to_string(),
            }),
        }
    }

    for (position, record) in records(&data, "relationships").into_iter().enumerate() {
        match serde_json::from_value::<RawRelationship>(record.clone()) {
            Ok(raw) => parsed.result.relationships.push(Relationship::new(
                raw.source_entity,
                raw.target_entity,
                raw.relation,
                raw.relationship_description,
            )),
            Err(e) => parsed.rejected.push(ExtractionError::Field {
                kind: RecordKind::Relationship,
                position,
                message: e.to_string(),
            }),
        }
    }

    Ok(parsed)
}

fn records<'a>(data: &'a Value, field: &str) -> Vec<&'a Value> {
    match data.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!(field, found = %type_name(other), "Expected an array, ignoring field");
            Vec::new()
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Never fails: malformed output yields `(empty, empty)` and every problem is logged.
pub fn parse_fn(raw: &str) -> (Vec<Entity>, Vec<Relationship>) {
    match parse_response(raw) {
        Ok(parsed) => {
            for error in &parsed.rejected {
                warn!(error = %error, "Skipping malformed record");
            }
            (parsed.result.entities, parsed.result.relationships)
        }
        Err(error) => {
            warn!(error = %error, "Error parsing extraction output");
            (Vec::new(), Vec::new())
        }
    }
}
