pub mod graph_export;
pub mod louvain;
pub mod summarizer;

pub use graph_export::{EntityInfo, GraphData, RelationInfo};
pub use louvain::LouvainDetector;
pub use summarizer::{CommunitySummarizer, CommunitySummary};

use extract::EntityKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Seed for the node visiting order
    pub seed: u64,
    pub max_iterations: usize,
    /// Higher values produce more, smaller communities
    pub resolution: f64,
    pub max_concurrent_summaries: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iterations: 10,
            resolution: 1.0,
            max_concurrent_summaries: 3,
        }
    }
}

/// Stable fingerprint of a community's membership, independent of member order
pub fn membership_digest(members: &[EntityKey]) -> String {
    let mut sorted: Vec<&EntityKey> = members.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for key in sorted {
        hasher.update(key.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.entity_type.as_bytes());
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}
