use regex::Regex;
use std::sync::LazyLock;

use crate::schema::{Entity, ExtractionResult, Relationship, UNKNOWN_ENTITY_TYPE};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Cleans model-produced names so that trivially different spellings share a key.
///
/// Case is preserved: `Paris` and `paris` are different names.
pub struct EntityNormalizer;

impl EntityNormalizer {
    /// Trim, collapse inner whitespace, strip wrapping quotes and trailing punctuation
    pub fn normalize_name(name: &str) -> String {
        let collapsed = WHITESPACE.replace_all(name.trim(), " ");
        collapsed
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'))
            .trim()
            .to_string()
    }

    /// Uppercase with underscores; empty becomes `UNKNOWN`
    pub fn normalize_type(entity_type: &str) -> String {
        let cleaned = WHITESPACE
            .replace_all(entity_type.trim(), "_")
            .to_uppercase();
        if cleaned.is_empty() {
            UNKNOWN_ENTITY_TYPE.to_string()
        } else {
            cleaned
        }
    }

    pub fn normalize_relation(relation: &str) -> String {
        WHITESPACE.replace_all(relation.trim(), " ").to_string()
    }

    pub fn normalize_entity(entity: Entity) -> Entity {
        Entity {
            name: Self::normalize_name(&entity.name),
            entity_type: Self::normalize_type(&entity.entity_type),
            description: entity.description.trim().to_string(),
        }
    }

    pub fn normalize_relationship(relationship: Relationship) -> Relationship {
        Relationship {
            source: Self::normalize_name(&relationship.source),
            target: Self::normalize_name(&relationship.target),
            relation: Self::normalize_relation(&relationship.relation),
            description: relationship.description.trim().to_string(),
        }
    }

    /// Normalize every record, dropping ones whose name or label is empty after cleanup
    pub fn normalize(result: ExtractionResult) -> ExtractionResult {
        let entities = result
            .entities
            .into_iter()
            .map(Self::normalize_entity)
            .filter(|e| !e.name.is_empty())
            .collect();

        let relationships = result
            .relationships
            .into_iter()
            .map(Self::normalize_relationship)
            .filter(|r| !r.source.is_empty() && !r.target.is_empty() && !r.relation.is_empty())
            .collect();

        ExtractionResult {
            entities,
            relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(EntityNormalizer::normalize_name("GraphRAG"), "GraphRAG");
        assert_eq!(EntityNormalizer::normalize_name("GraphRAG!"), "GraphRAG");
        assert_eq!(EntityNormalizer::normalize_name("  Marie   Curie  "), "Marie Curie");
        assert_eq!(EntityNormalizer::normalize_name("\"Paris\""), "Paris");
    }

    #[test]
    fn types_are_uppercased() {
        assert_eq!(EntityNormalizer::normalize_type("location"), "LOCATION");
        assert_eq!(EntityNormalizer::normalize_type(" chemical element "), "CHEMICAL_ELEMENT");
        assert_eq!(EntityNormalizer::normalize_type("  "), UNKNOWN_ENTITY_TYPE);
    }

    #[test]
    fn drops_records_that_normalize_to_nothing() {
        let result = EntityNormalizer::normalize(ExtractionResult {
            entities: vec![Entity::new(" ... ", "PERSON", ""), Entity::new("radium", "substance", " element ")],
            relationships: vec![
                Relationship::new("Marie Curie", "radium", "discovered", ""),
                Relationship::new("Marie Curie", "", "knew", ""),
            ],
        });

        assert_eq!(result.entities, vec![Entity::new("radium", "SUBSTANCE", "element")]);
        assert_eq!(result.relationships.len(), 1);
    }
}
