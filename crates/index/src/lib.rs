pub mod documents;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod snapshot;
pub mod store;

pub use documents::{DocumentRecord, DocumentStore};
pub use error::PersistenceError;
pub use graph::{GraphEdge, KnowledgeGraph, PLACEHOLDER_DESCRIPTION, UpsertSummary};
pub use lifecycle::{Index, IndexStats, IngestReport, RefreshReport};
pub use snapshot::{SnapshotFiles, SnapshotStore};
pub use store::{Community, CommunityState, GraphStore, SummaryJob};

use communities::CommunityConfig;
use extract::ExtractorConfig;
use ingest::ChunkerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding `CURRENT` and the snapshot generations
    pub storage_dir: PathBuf,
    /// Detect and summarize communities after every ingestion
    pub detect_on_ingest: bool,
    /// Bring stale communities up to date before answering a query
    pub refresh_on_query: bool,
    pub chunker: ChunkerConfig,
    pub extractor: ExtractorConfig,
    pub communities: CommunityConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./graphrag_storage"),
            detect_on_ingest: false,
            refresh_on_query: true,
            chunker: ChunkerConfig::default(),
            extractor: ExtractorConfig::default(),
            communities: CommunityConfig::default(),
        }
    }
}
