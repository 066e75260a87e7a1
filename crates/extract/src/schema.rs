use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder type for entities that only appear as relationship endpoints
pub const UNKNOWN_ENTITY_TYPE: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: description.into(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.name, &self.entity_type)
    }
}

/// Natural key of a graph node: name plus type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl EntityKey {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.entity_type == UNKNOWN_ENTITY_TYPE
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.entity_type)
    }
}

/// A directed, labelled triple between two entities, referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub description: String,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub extraction: ExtractionResult,
    /// The model call failed, so the chunk may yield triples on a later attempt
    #[serde(default)]
    pub failed: bool,
}
