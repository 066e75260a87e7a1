use extract::LanguageModel;
use index::{GraphStore, Index};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::QueryConfig;
use crate::relevance::{self, NAMED_ENTITY_BONUS};

/// Answer when nothing has been ingested yet
pub const EMPTY_GRAPH_ANSWER: &str =
    "The knowledge graph is empty. Ingest some documents before asking questions.";

/// Answer when the graph has nothing to say about the question
pub const NO_RELEVANT_CONTENT_ANSWER: &str =
    "I could not find any information in the knowledge graph relevant to this question.";

/// Answer when the model could not produce one
pub const SYNTHESIS_FAILED_ANSWER: &str =
    "Sorry, I was unable to generate an answer right now. Please try again later.";

/// First line of every synthesis prompt
pub const SYNTHESIS_HEADER: &str =
    "You are a helpful assistant answering questions from a knowledge graph.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub communities: Vec<CommunityReference>,
    pub trace: QueryTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReference {
    pub community_id: usize,
    pub summary: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTrace {
    pub communities_searched: usize,
    pub communities_used: usize,
    pub entities_matched: usize,
    /// No community cleared the relevance threshold, so all were considered
    pub used_all_summaries: bool,
    pub model_called: bool,
}

/// What to do with a query, decided from a consistent view of the store
#[derive(Debug, Clone)]
pub enum QueryPlan {
    Fallback {
        answer: &'static str,
        trace: QueryTrace,
    },
    Synthesize {
        context: String,
        communities: Vec<CommunityReference>,
        trace: QueryTrace,
    },
}

pub struct QueryEngine {
    llm: Arc<dyn LanguageModel>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(llm: Arc<dyn LanguageModel>, config: QueryConfig) -> Self {
        Self { llm, config }
    }

    /// Answer against a live index, refreshing stale communities first when it is configured to
    pub async fn answer(&self, index: &Index, query: &str) -> QueryResult {
        if let Err(error) = index.refresh_if_stale().await {
            warn!(error = %error, "Community refresh before query failed");
        }

        let plan = {
            let store = index.read().await;
            self.plan(&store, query)
        };
        self.execute(query, plan).await
    }

    pub async fn search(&self, store: &GraphStore, query: &str) -> QueryResult {
        let plan = self.plan(store, query);
        self.execute(query, plan).await
    }

    /// Select communities and entity details for `query`. Never calls the model.
    pub fn plan(&self, store: &GraphStore, query: &str) -> QueryPlan {
        let mut trace = QueryTrace::default();

        if store.graph().is_empty() {
            return QueryPlan::Fallback {
                answer: EMPTY_GRAPH_ANSWER,
                trace,
            };
        }

        let query_terms = relevance::terms(query);

        let mut scored: Vec<CommunityReference> = store
            .communities()
            .iter()
            .filter_map(|community| {
                let summary = community.summary.as_ref()?;
                let named = community
                    .members
                    .iter()
                    .filter(|key| relevance::mentions(query, &key.name))
                    .count();
                let score = relevance::lexical_overlap(&query_terms, &summary.summary)
                    + NAMED_ENTITY_BONUS * named as f64;
                Some(CommunityReference {
                    community_id: community.id,
                    summary: summary.summary.clone(),
                    relevance_score: score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then(a.community_id.cmp(&b.community_id))
        });
        trace.communities_searched = scored.len();

        let relevant = scored
            .iter()
            .filter(|c| c.relevance_score >= self.config.min_relevance)
            .count();

        let candidates: Vec<CommunityReference> = if relevant > 0 {
            scored.into_iter().take(relevant.min(self.config.top_k)).collect()
        } else {
            trace.used_all_summaries = true;
            scored
        };

        let mut context = String::new();
        let mut used = Vec::new();
        for community in candidates {
            let block = format!(
                "Community {} (relevance: {:.2}):\n{}\n\n",
                community.community_id, community.relevance_score, community.summary
            );
            if !context.is_empty() && context.len() + block.len() > self.config.max_context_chars {
                break;
            }
            context.push_str(&block);
            used.push(community);
        }
        trace.communities_used = used.len();

        let entity_details = self.entity_details(store, query);
        trace.entities_matched = entity_details.len();

        if !context.is_empty() {
            context.insert_str(0, "THEMATIC COMMUNITIES:\n\n");
        }
        if !entity_details.is_empty() {
            context.push_str("ENTITY DETAILS:\n");
            for line in entity_details {
                context.push_str(&line);
                context.push('\n');
            }
        }

        if context.is_empty() {
            return QueryPlan::Fallback {
                answer: NO_RELEVANT_CONTENT_ANSWER,
                trace,
            };
        }

        debug!(
            communities_searched = trace.communities_searched,
            communities_used = trace.communities_used,
            entities_matched = trace.entities_matched,
            used_all_summaries = trace.used_all_summaries,
            "Planned query"
        );

        QueryPlan::Synthesize {
            context,
            communities: used,
            trace,
        }
    }

    /// One line per entity the query names directly
    fn entity_details(&self, store: &GraphStore, query: &str) -> Vec<String> {
        store
            .graph()
            .entities()
            .into_iter()
            .filter(|entity| relevance::mentions(query, &entity.name))
            .map(|entity| {
                format!(
                    "- {} ({}): {}",
                    entity.name,
                    entity.entity_type,
                    entity.description.replace('\n', " ")
                )
            })
            .collect()
    }

    pub async fn execute(&self, query: &str, plan: QueryPlan) -> QueryResult {
        let (context, communities, mut trace) = match plan {
            QueryPlan::Fallback { answer, trace } => {
                info!(answer, "Answering with fallback");
                return QueryResult {
                    answer: answer.to_string(),
                    communities: Vec::new(),
                    trace,
                };
            }
            QueryPlan::Synthesize {
                context,
                communities,
                trace,
            } => (context, communities, trace),
        };

        trace.model_called = true;
        let answer = match self.generate_synthesis(query, &context).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(error = %error, "Answer synthesis failed");
                SYNTHESIS_FAILED_ANSWER.to_string()
            }
        };

        QueryResult {
            answer,
            communities,
            trace,
        }
    }

    async fn generate_synthesis(&self, query: &str, context: &str) -> Result<String, extract::LlmError> {
        let prompt = format!(
            r#"{}

CONTEXT:
{}
USER QUESTION: {}

INSTRUCTIONS:
- Answer using only the context above
- Combine information from several communities where it helps
- If the context does not contain the answer, say so plainly

ANSWER:"#,
            SYNTHESIS_HEADER, context, query
        );

        let answer = self.llm.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}
