use extract::EntityKey;
use std::collections::HashMap;

/// Index-addressed view of the graph used by the clustering code.
///
/// Each relationship contributes one `(source, target)` pair, so repeated
/// pairs (multi-edges) add weight.
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    pub entities: Vec<EntityKey>,
    pub edges: Vec<(usize, usize)>, // (source_idx, target_idx)
    pub entity_to_idx: HashMap<EntityKey, usize>,
}

impl GraphData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&mut self, key: EntityKey) -> usize {
        if let Some(&idx) = self.entity_to_idx.get(&key) {
            return idx;
        }

        let idx = self.entities.len();
        self.entities.push(key.clone());
        self.entity_to_idx.insert(key, idx);
        idx
    }

    pub fn add_edge(&mut self, source: usize, target: usize) {
        self.edges.push((source, target));
    }

    /// Add an edge by key, creating endpoints as needed
    pub fn connect(&mut self, source: &EntityKey, target: &EntityKey) {
        let s = self.add_entity(source.clone());
        let t = self.add_entity(target.clone());
        self.add_edge(s, t);
    }
}

/// Entity details handed to the summarizer
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityInfo {
    pub name: String,
    pub entity_type: String,
    pub description: String,
}

/// Relationship details handed to the summarizer
#[derive(Debug, Clone, serde::Serialize)]
pub struct RelationInfo {
    pub source: String,
    pub relation: String,
    pub target: String,
    pub description: String,
}
