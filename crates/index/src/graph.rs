use communities::{EntityInfo, GraphData, RelationInfo};
use extract::{Entity, EntityKey, Relationship, UNKNOWN_ENTITY_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Description given to entities created only because a relationship named them
pub const PLACEHOLDER_DESCRIPTION: &str = "Auto-created";

/// A stored relationship, with endpoints resolved to entity keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: EntityKey,
    pub target: EntityKey,
    pub relation: String,
    pub description: String,
}

impl GraphEdge {
    fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.relation.clone())
    }
}

type EdgeKey = (EntityKey, EntityKey, String);

enum EdgeMerge {
    Added,
    Described,
    Unchanged,
}

/// What one `upsert` call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub entities_added: usize,
    pub relationships_added: usize,
    pub placeholders_created: usize,
    pub changed: bool,
}

/// In-memory property graph keyed by `(name, type)`.
///
/// Relationship endpoints are names; they resolve case-insensitively to an
/// existing entity, or to a new `UNKNOWN` placeholder. A name never has both
/// placeholder and typed nodes: a typed entity absorbs the placeholders of
/// its name, edges included.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct KnowledgeGraph {
    entities: HashMap<EntityKey, Entity>,
    edges: HashMap<EdgeKey, GraphEdge>,
    name_index: HashMap<String, Vec<EntityKey>>,
    revision: u64,
}

/// On-disk form of the graph, sorted so snapshots are stable
#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    revision: u64,
    entities: Vec<Entity>,
    relationships: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entities, then relationships. Re-applying the same input changes nothing.
    pub fn upsert(&mut self, entities: &[Entity], relationships: &[Relationship]) -> UpsertSummary {
        let mut summary = UpsertSummary::default();
        let mut batch: HashMap<String, EntityKey> = HashMap::new();

        for entity in entities {
            let key = self.upsert_entity(entity, &mut summary);
            batch
                .entry(fold(&key.name))
                .and_modify(|existing| {
                    if existing.is_placeholder() {
                        *existing = key.clone();
                    }
                })
                .or_insert(key);
        }

        for relationship in relationships {
            let source = self.resolve(&relationship.source, &batch, &mut summary);
            let target = self.resolve(&relationship.target, &batch, &mut summary);
            let edge = GraphEdge {
                source,
                target,
                relation: relationship.relation.clone(),
                description: relationship.description.clone(),
            };
            match self.merge_edge(edge) {
                EdgeMerge::Added => {
                    summary.relationships_added += 1;
                    summary.changed = true;
                }
                EdgeMerge::Described => summary.changed = true,
                EdgeMerge::Unchanged => {}
            }
        }

        if summary.changed {
            self.revision += 1;
            debug!(
                revision = self.revision,
                entities_added = summary.entities_added,
                relationships_added = summary.relationships_added,
                "Graph updated"
            );
        }

        summary
    }

    fn upsert_entity(&mut self, entity: &Entity, summary: &mut UpsertSummary) -> EntityKey {
        let key = entity.key();

        if key.is_placeholder() {
            // An untyped mention of a known name refers to that entity
            if let Some(typed) = self.typed_key_for(&entity.name) {
                if let Some(existing) = self.entities.get_mut(&typed) {
                    summary.changed |= merge_description(&mut existing.description, &entity.description);
                }
                return typed;
            }
        }

        match self.entities.get_mut(&key) {
            Some(existing) => {
                summary.changed |= merge_description(&mut existing.description, &entity.description);
            }
            None => {
                let mut node = entity.clone();
                if node.description.trim().is_empty() && key.is_placeholder() {
                    node.description = PLACEHOLDER_DESCRIPTION.to_string();
                }
                self.insert_entity(node);
                summary.entities_added += 1;
                summary.changed = true;
            }
        }

        if !key.is_placeholder() && self.absorb_placeholders(&key) {
            summary.changed = true;
        }

        key
    }

    fn insert_entity(&mut self, entity: Entity) {
        let key = entity.key();
        self.name_index.entry(fold(&key.name)).or_default().push(key.clone());
        self.entities.insert(key, entity);
    }

    fn remove_entity(&mut self, key: &EntityKey) -> Option<Entity> {
        let folded = fold(&key.name);
        if let Some(keys) = self.name_index.get_mut(&folded) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.name_index.remove(&folded);
            }
        }
        self.entities.remove(key)
    }

    /// Fold every placeholder sharing `key`'s name into `key`, rewriting its edges
    fn absorb_placeholders(&mut self, key: &EntityKey) -> bool {
        let placeholders: Vec<EntityKey> = self
            .name_index
            .get(&fold(&key.name))
            .map(|keys| keys.iter().filter(|k| k.is_placeholder()).cloned().collect())
            .unwrap_or_default();

        for placeholder in &placeholders {
            if let Some(absorbed) = self.remove_entity(placeholder) {
                if let Some(target) = self.entities.get_mut(key) {
                    merge_description(&mut target.description, &absorbed.description);
                }
            }

            let affected: Vec<EdgeKey> = self
                .edges
                .keys()
                .filter(|(s, t, _)| s == placeholder || t == placeholder)
                .cloned()
                .collect();

            for edge_key in affected {
                if let Some(mut edge) = self.edges.remove(&edge_key) {
                    if &edge.source == placeholder {
                        edge.source = key.clone();
                    }
                    if &edge.target == placeholder {
                        edge.target = key.clone();
                    }
                    self.merge_edge(edge);
                }
            }

            debug!(placeholder = %placeholder, entity = %key, "Absorbed placeholder entity");
        }

        !placeholders.is_empty()
    }

    fn merge_edge(&mut self, edge: GraphEdge) -> EdgeMerge {
        let key = edge.key();
        match self.edges.get_mut(&key) {
            Some(existing) => {
                if merge_description(&mut existing.description, &edge.description) {
                    EdgeMerge::Described
                } else {
                    EdgeMerge::Unchanged
                }
            }
            None => {
                self.edges.insert(key, edge);
                EdgeMerge::Added
            }
        }
    }

    fn resolve(
        &mut self,
        name: &str,
        batch: &HashMap<String, EntityKey>,
        summary: &mut UpsertSummary,
    ) -> EntityKey {
        let folded = fold(name);
        if let Some(key) = batch.get(&folded).filter(|k| self.entities.contains_key(*k)) {
            return key.clone();
        }

        if let Some(key) = self.typed_key_for(name) {
            return key;
        }

        if let Some(key) = self.name_index.get(&folded).and_then(|keys| keys.iter().min()) {
            return key.clone();
        }

        let placeholder = Entity::new(name, UNKNOWN_ENTITY_TYPE, PLACEHOLDER_DESCRIPTION);
        let key = placeholder.key();
        self.insert_entity(placeholder);
        summary.entities_added += 1;
        summary.placeholders_created += 1;
        summary.changed = true;
        key
    }

    /// Smallest typed key carrying this name, ignoring case
    fn typed_key_for(&self, name: &str) -> Option<EntityKey> {
        self.name_index
            .get(&fold(name))?
            .iter()
            .filter(|k| !k.is_placeholder())
            .min()
            .cloned()
    }

    /// Drop everything. The revision still advances so older community runs read as stale.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.edges.clear();
        self.name_index.clear();
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// All entities ordered by key
    pub fn entities(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.entities.values().collect();
        entities.sort_by(|a, b| a.key().cmp(&b.key()));
        entities
    }

    /// All relationships ordered by (source, target, relation)
    pub fn relationships(&self) -> Vec<&GraphEdge> {
        let mut edges: Vec<(&EdgeKey, &GraphEdge)> = self.edges.iter().collect();
        edges.sort_by(|a, b| a.0.cmp(b.0));
        edges.into_iter().map(|(_, edge)| edge).collect()
    }

    /// Index view for clustering, built in key order so detection is reproducible
    pub fn to_graph_data(&self) -> GraphData {
        let mut data = GraphData::new();
        for entity in self.entities() {
            data.add_entity(entity.key());
        }
        for edge in self.relationships() {
            data.connect(&edge.source, &edge.target);
        }
        data
    }

    /// Entity and internal relationship details for a set of members, both sorted
    pub fn community_context(&self, members: &[EntityKey]) -> (Vec<EntityInfo>, Vec<RelationInfo>) {
        let member_set: HashSet<&EntityKey> = members.iter().collect();

        let mut keys: Vec<&EntityKey> = member_set.iter().copied().collect();
        keys.sort();
        let entities = keys
            .into_iter()
            .filter_map(|key| self.entities.get(key))
            .map(|entity| EntityInfo {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                description: entity.description.clone(),
            })
            .collect();

        let relations = self
            .relationships()
            .into_iter()
            .filter(|edge| member_set.contains(&edge.source) && member_set.contains(&edge.target))
            .map(|edge| RelationInfo {
                source: edge.source.name.clone(),
                relation: edge.relation.clone(),
                target: edge.target.name.clone(),
                description: edge.description.clone(),
            })
            .collect();

        (entities, relations)
    }
}

impl PartialEq for KnowledgeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.revision == other.revision && self.entities == other.entities && self.edges == other.edges
    }
}

impl From<GraphSnapshot> for KnowledgeGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut graph = KnowledgeGraph::new();
        for entity in snapshot.entities {
            if !graph.entities.contains_key(&entity.key()) {
                graph.insert_entity(entity);
            }
        }
        for edge in snapshot.relationships {
            for endpoint in [&edge.source, &edge.target] {
                if !graph.entities.contains_key(endpoint) {
                    graph.insert_entity(Entity::new(
                        endpoint.name.clone(),
                        endpoint.entity_type.clone(),
                        PLACEHOLDER_DESCRIPTION,
                    ));
                }
            }
            graph.edges.insert(edge.key(), edge);
        }
        graph.revision = snapshot.revision;
        graph
    }
}

impl From<KnowledgeGraph> for GraphSnapshot {
    fn from(graph: KnowledgeGraph) -> Self {
        GraphSnapshot {
            revision: graph.revision,
            entities: graph.entities().into_iter().cloned().collect(),
            relationships: graph.relationships().into_iter().cloned().collect(),
        }
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Append `incoming` unless it is empty or already present as a line.
/// A placeholder description is replaced outright.
fn merge_description(existing: &mut String, incoming: &str) -> bool {
    let incoming = incoming.trim();
    if incoming.is_empty() || incoming == PLACEHOLDER_DESCRIPTION {
        return false;
    }
    if existing.is_empty() || existing == PLACEHOLDER_DESCRIPTION {
        *existing = incoming.to_string();
        return true;
    }
    if existing.split('\n').any(|line| line == incoming)
        || (incoming.contains('\n') && existing.contains(incoming))
    {
        return false;
    }
    existing.push('\n');
    existing.push_str(incoming);
    true
}
