pub mod error;
pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod schema;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ExtractionError, LlmError, RecordKind};
pub use llm::{LanguageModel, OllamaClient, OllamaConfig};
pub use normalizer::EntityNormalizer;
pub use parser::{ParsedResponse, parse_fn, parse_response};
pub use retry::{RetryConfig, RetryPolicy, RetryingModel};
pub use schema::{
    Entity, EntityKey, ExtractedChunk, ExtractionResult, Relationship, UNKNOWN_ENTITY_TYPE,
};

use futures::stream::{self, StreamExt};
use ingest::Chunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// How many relationships the model is asked for per chunk
    pub max_paths_per_chunk: usize,
    pub max_concurrent_extractions: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_paths_per_chunk: 2,
            max_concurrent_extractions: 5,
        }
    }
}

pub struct TripleExtractor {
    llm: Arc<dyn LanguageModel>,
    config: ExtractorConfig,
}

impl TripleExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: ExtractorConfig) -> Self {
        Self { llm, config }
    }

    /// Extract entities and relations from a chunk of text, surfacing every failure
    pub async fn try_extract(&self, text: &str) -> Result<ParsedResponse, ExtractionError> {
        let prompt = prompt::build_extraction_prompt(text, self.config.max_paths_per_chunk);
        let response = self.llm.complete(&prompt).await?;

        let mut parsed = parse_response(&response)?;
        parsed.result = EntityNormalizer::normalize(parsed.result);
        Ok(parsed)
    }

    /// Extract from one chunk. A failed model call or unparseable output yields
    /// an empty extraction for this chunk only. Only a failed model call marks
    /// the chunk as `failed`; unparseable output is final.
    pub async fn extract(&self, chunk: &Chunk) -> ExtractedChunk {
        let mut failed = false;
        let extraction = match self.try_extract(&chunk.text).await {
            Ok(parsed) => {
                for error in &parsed.rejected {
                    warn!(chunk_id = %chunk.chunk_id, error = %error, "Skipping malformed record");
                }
                parsed.result
            }
            Err(error) => {
                failed = matches!(error, ExtractionError::Model(_));
                warn!(chunk_id = %chunk.chunk_id, error = %error, "Skipping chunk");
                ExtractionResult::default()
            }
        };

        debug!(
            chunk_id = %chunk.chunk_id,
            entities = extraction.entities.len(),
            relationships = extraction.relationships.len(),
            "Extracted chunk"
        );

        ExtractedChunk {
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
            extraction,
            failed,
        }
    }

    /// Extract every chunk concurrently; results come back in chunk order
    pub async fn extract_all(&self, chunks: &[Chunk]) -> Vec<ExtractedChunk> {
        stream::iter(chunks.iter().cloned())
            .map(|chunk| async move { self.extract(&chunk).await })
            .buffered(self.config.max_concurrent_extractions.max(1))
            .collect()
            .await
    }
}
