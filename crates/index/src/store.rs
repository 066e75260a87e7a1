use communities::{
    CommunityConfig, CommunitySummarizer, CommunitySummary, EntityInfo, LouvainDetector,
    RelationInfo, membership_digest,
};
use extract::{Entity, EntityKey, LlmError, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::documents::DocumentStore;
use crate::error::PersistenceError;
use crate::graph::{KnowledgeGraph, UpsertSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: usize,
    pub members: Vec<EntityKey>,
    /// Fingerprint of `members`; summaries are reused while it is unchanged
    pub digest: String,
    pub summary: Option<CommunitySummary>,
}

/// Result of the last detection run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityState {
    /// Graph revision the partition was computed from
    pub detected_revision: Option<u64>,
    pub communities: Vec<Community>,
}

/// Everything a community summary needs, detached from the store
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub community_id: usize,
    pub digest: String,
    pub entities: Vec<EntityInfo>,
    pub relations: Vec<RelationInfo>,
}

impl SummaryJob {
    pub async fn run(&self, summarizer: &CommunitySummarizer) -> Result<CommunitySummary, LlmError> {
        summarizer
            .summarize_community(self.community_id, &self.entities, &self.relations)
            .await
    }
}

/// Graph, communities and document store: the whole of one index's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    graph: KnowledgeGraph,
    communities: CommunityState,
    documents: DocumentStore,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a store from snapshot parts, rejecting communities that
    /// name entities the graph does not have
    pub fn from_parts(
        graph: KnowledgeGraph,
        communities: CommunityState,
        documents: DocumentStore,
    ) -> Result<Self, PersistenceError> {
        if let Some(missing) = communities
            .communities
            .iter()
            .flat_map(|community| community.members.iter())
            .find(|key| !graph.contains(key))
        {
            return Err(PersistenceError::Inconsistent(format!(
                "community member {} is not in the graph",
                missing
            )));
        }

        Ok(Self {
            graph,
            communities,
            documents,
        })
    }

    pub fn upsert(&mut self, entities: &[Entity], relationships: &[Relationship]) -> UpsertSummary {
        self.graph.upsert(entities, relationships)
    }

    /// Partition the current graph. Summaries carry over to communities whose
    /// membership is unchanged; the rest start unsummarized.
    pub fn detect_communities(&mut self, config: &CommunityConfig) {
        let groups = LouvainDetector::new(self.graph.to_graph_data(), config).detect_communities();

        let mut cached: HashMap<String, CommunitySummary> = self
            .communities
            .communities
            .drain(..)
            .filter_map(|community| community.summary.map(|summary| (community.digest, summary)))
            .collect();

        let communities: Vec<Community> = groups
            .into_iter()
            .enumerate()
            .map(|(id, members)| {
                let digest = membership_digest(&members);
                let summary = cached.remove(&digest).map(|summary| CommunitySummary {
                    community_id: id,
                    ..summary
                });
                Community {
                    id,
                    members,
                    digest,
                    summary,
                }
            })
            .collect();

        let reused = communities.iter().filter(|c| c.summary.is_some()).count();
        info!(
            revision = self.graph.revision(),
            communities = communities.len(),
            reused_summaries = reused,
            "Detected communities"
        );

        self.communities = CommunityState {
            detected_revision: Some(self.graph.revision()),
            communities,
        };
    }

    /// Work items for every community still lacking a summary
    pub fn pending_summaries(&self) -> Vec<SummaryJob> {
        self.communities
            .communities
            .iter()
            .filter(|community| community.summary.is_none())
            .map(|community| {
                let (entities, relations) = self.graph.community_context(&community.members);
                SummaryJob {
                    community_id: community.id,
                    digest: community.digest.clone(),
                    entities,
                    relations,
                }
            })
            .collect()
    }

    /// Attach a summary to the community with this membership digest.
    /// Returns false when no such community exists any more.
    pub fn apply_summary(&mut self, digest: &str, summary: CommunitySummary) -> bool {
        match self
            .communities
            .communities
            .iter_mut()
            .find(|community| community.digest == digest)
        {
            Some(community) => {
                community.summary = Some(CommunitySummary {
                    community_id: community.id,
                    ..summary
                });
                true
            }
            None => false,
        }
    }

    /// Communities lag the graph
    pub fn needs_detection(&self) -> bool {
        self.communities.detected_revision != Some(self.graph.revision())
    }

    /// Communities lag the graph or some summary is missing
    pub fn is_stale(&self) -> bool {
        self.needs_detection() || self.communities.communities.iter().any(|c| c.summary.is_none())
    }

    /// Replace the graph with an empty one, keeping cached summaries for reuse
    pub fn reset_graph(&mut self) {
        self.graph.clear();
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn communities(&self) -> &[Community] {
        &self.communities.communities
    }

    pub fn community_state(&self) -> &CommunityState {
        &self.communities
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }
}
