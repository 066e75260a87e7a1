/// First line of every extraction prompt
pub const EXTRACTION_HEADER: &str = "Extract entities and relationships from the following text.";

pub fn build_extraction_prompt(chunk_text: &str, max_paths_per_chunk: usize) -> String {
    format!(
        r#"{header}

INSTRUCTIONS:
1. Identify the entities in the text. For each entity give its name (as written in the text), its type, and a short description
2. Among the identified entities, find the pairs that are clearly related and describe how
3. Return at most {max_paths} relationships
4. Output a single JSON object using the schema below

SCHEMA:
{{
  "entities": [
    {{"entity_name": "EntityName", "entity_type": "PERSON|ORGANIZATION|LOCATION|EVENT|CONCEPT|TECHNOLOGY|SUBSTANCE|WORK", "entity_description": "brief description"}}
  ],
  "relationships": [
    {{"source_entity": "EntityName", "target_entity": "OtherEntity", "relation": "relationship_verb", "relationship_description": "why the two are related"}}
  ]
}}

RULES:
- source_entity and target_entity must be names listed under entities
- Relations should be short verbs: "discovered", "founded", "located_in", "uses", etc.
- Do not invent facts that are not in the text

TEXT:
{text}

JSON OUTPUT:"#,
        header = EXTRACTION_HEADER,
        max_paths = max_paths_per_chunk,
        text = chunk_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_text_and_path_bound() {
        let prompt = build_extraction_prompt("Marie Curie discovered radium.", 2);

        assert!(prompt.starts_with(EXTRACTION_HEADER));
        assert!(prompt.contains("Return at most 2 relationships"));
        assert!(prompt.contains("TEXT:\nMarie Curie discovered radium.\n"));
        assert!(prompt.contains("\"entity_name\""));
    }
}
