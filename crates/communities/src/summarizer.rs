use extract::{LanguageModel, LlmError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::graph_export::{EntityInfo, RelationInfo};

/// First line of every community summary prompt
pub const SUMMARY_HEADER: &str = "You are analyzing a community of related entities from a knowledge graph.";

const MAX_PROMPT_ENTITIES: usize = 10;
const MAX_PROMPT_RELATIONS: usize = 10;
const MAX_KEY_ENTITIES: usize = 5;

#[derive(Clone)]
pub struct CommunitySummarizer {
    llm: Arc<dyn LanguageModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub community_id: usize,
    pub entity_count: usize,
    pub summary: String,
    pub key_entities: Vec<String>,
}

impl CommunitySummarizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Generate summary for a community.
    ///
    /// A lone entity with no relationships is described from its own
    /// description without calling the model.
    pub async fn summarize_community(
        &self,
        community_id: usize,
        entities: &[EntityInfo],
        relations: &[RelationInfo],
    ) -> Result<CommunitySummary, LlmError> {
        let summary_text = match (entities, relations.is_empty()) {
            ([entity], true) => Self::describe_single(entity),
            _ => {
                let prompt = self.build_summary_prompt(entities, relations);
                self.llm.complete(&prompt).await?.trim().to_string()
            }
        };

        let key_entities: Vec<String> = entities.iter()
            .take(MAX_KEY_ENTITIES)
            .map(|e| e.name.clone())
            .collect();

        Ok(CommunitySummary {
            community_id,
            entity_count: entities.len(),
            summary: summary_text,
            key_entities,
        })
    }

    fn describe_single(entity: &EntityInfo) -> String {
        if entity.description.trim().is_empty() {
            format!("{} ({}).", entity.name, entity.entity_type)
        } else {
            format!("{} ({}): {}", entity.name, entity.entity_type, entity.description.trim())
        }
    }

    fn build_summary_prompt(
        &self,
        entities: &[EntityInfo],
        relations: &[RelationInfo],
    ) -> String {
        let mut prompt = format!("{}\n\n", SUMMARY_HEADER);

        prompt.push_str("ENTITIES IN THIS COMMUNITY:\n");
        for entity in entities.iter().take(MAX_PROMPT_ENTITIES) {
            prompt.push_str(&format!(
                "- {} ({}): {}\n",
                entity.name,
                entity.entity_type,
                entity.description
            ));
        }

        if !relations.is_empty() {
            prompt.push_str("\nKEY RELATIONSHIPS:\n");
            for relation in relations.iter().take(MAX_PROMPT_RELATIONS) {
                prompt.push_str(&format!(
                    "- {} {} {}: {}\n",
                    relation.source,
                    relation.relation,
                    relation.target,
                    relation.description
                ));
            }
        }

        prompt.push_str(
            "\nTASK: Write a short summary (one or two paragraphs) describing:\n\
            1. The main theme or topic of this community\n\
            2. Key entities and their roles\n\
            3. Important relationships and patterns\n\n\
            Mention every key entity by name. Keep it concise and factual. Do NOT use markdown formatting.\n\n\
            SUMMARY:"
        );

        prompt
    }
}
