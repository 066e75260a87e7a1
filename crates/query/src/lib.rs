pub mod engine;
pub mod relevance;

pub use engine::{
    CommunityReference, EMPTY_GRAPH_ANSWER, NO_RELEVANT_CONTENT_ANSWER, QueryEngine, QueryPlan,
    QueryResult, QueryTrace, SYNTHESIS_FAILED_ANSWER,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Most communities used as context
    pub top_k: usize,
    /// Communities scoring below this are ignored unless none clear it
    pub min_relevance: f64,
    pub max_context_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance: 0.1,
            max_context_chars: 12_000,
        }
    }
}
