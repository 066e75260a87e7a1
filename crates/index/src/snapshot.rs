use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::documents::DocumentStore;
use crate::error::PersistenceError;
use crate::graph::KnowledgeGraph;
use crate::store::{CommunityState, GraphStore};

const CURRENT_FILE: &str = "CURRENT";
const CURRENT_TMP_FILE: &str = "CURRENT.tmp";
const GENERATION_PREFIX: &str = "gen-";
const DOCUMENTS_FILE: &str = "documents.json";
const GRAPH_FILE: &str = "graph.json";
const COMMUNITIES_FILE: &str = "communities.json";

/// Encoded snapshot files, ready to write without touching the live state
pub struct SnapshotFiles {
    documents: Vec<u8>,
    graph: Vec<u8>,
    communities: Vec<u8>,
}

impl SnapshotFiles {
    pub fn encode(store: &GraphStore) -> Result<Self, PersistenceError> {
        Ok(Self {
            documents: encode(DOCUMENTS_FILE, store.documents())?,
            graph: encode(GRAPH_FILE, store.graph())?,
            communities: encode(COMMUNITIES_FILE, store.community_state())?,
        })
    }
}

fn encode<T: Serialize>(file: &'static str, value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Encode { file, source })
}

/// Generational snapshot directory.
///
/// Each persist writes a complete `gen-<N>` directory, then swaps the
/// `CURRENT` pointer by rename. Readers only ever follow `CURRENT`, so a
/// crash mid-write leaves the previous generation live.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the live generation. `Ok(None)` when nothing was ever persisted.
    pub async fn load(&self) -> Result<Option<GraphStore>, PersistenceError> {
        let Some(generation) = self.current_generation().await? else {
            return Ok(None);
        };

        let dir = self.generation_dir(generation);
        let documents: DocumentStore = read_json(&dir.join(DOCUMENTS_FILE)).await?;
        let graph: KnowledgeGraph = read_json(&dir.join(GRAPH_FILE)).await?;
        let communities: CommunityState = read_json(&dir.join(COMMUNITIES_FILE)).await?;

        let store = GraphStore::from_parts(graph, communities, documents)?;
        info!(
            generation,
            entities = store.graph().entity_count(),
            relationships = store.graph().relationship_count(),
            communities = store.communities().len(),
            "Loaded snapshot"
        );
        Ok(Some(store))
    }

    /// Write a new generation and make it live. Returns its number.
    pub async fn persist(&self, files: SnapshotFiles) -> Result<u64, PersistenceError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PersistenceError::io(&self.root, e))?;

        let current = self.current_generation().await.unwrap_or(None);
        let existing = self.generation_dirs().await?;
        let generation = existing
            .iter()
            .map(|(n, _)| *n)
            .chain(current)
            .max()
            .unwrap_or(0)
            + 1;

        let dir = self.generation_dir(generation);
        fs::create_dir(&dir)
            .await
            .map_err(|e| PersistenceError::io(&dir, e))?;

        write_file(&dir.join(DOCUMENTS_FILE), &files.documents).await?;
        write_file(&dir.join(GRAPH_FILE), &files.graph).await?;
        write_file(&dir.join(COMMUNITIES_FILE), &files.communities).await?;

        let tmp = self.root.join(CURRENT_TMP_FILE);
        write_file(&tmp, generation_name(generation).as_bytes()).await?;
        let pointer = self.root.join(CURRENT_FILE);
        fs::rename(&tmp, &pointer)
            .await
            .map_err(|e| PersistenceError::io(&pointer, e))?;

        debug!(generation, "Persisted snapshot");

        // Old and orphaned generations are garbage from here on
        for (n, path) in existing {
            if n != generation {
                if let Err(e) = fs::remove_dir_all(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove old generation");
                }
            }
        }

        Ok(generation)
    }

    async fn current_generation(&self) -> Result<Option<u64>, PersistenceError> {
        let pointer = self.root.join(CURRENT_FILE);
        let content = match fs::read_to_string(&pointer).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::io(pointer, e)),
        };

        let name = content.trim();
        parse_generation(name)
            .map(Some)
            .ok_or_else(|| PersistenceError::InvalidPointer(name.to_string()))
    }

    /// Every `gen-<N>` directory under the root, whether live or not
    async fn generation_dirs(&self) -> Result<Vec<(u64, PathBuf)>, PersistenceError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| PersistenceError::io(&self.root, e))?;

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(&self.root, e))?
        {
            let Some(n) = entry.file_name().to_str().and_then(parse_generation) else {
                continue;
            };
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir {
                dirs.push((n, entry.path()));
            }
        }

        dirs.sort();
        Ok(dirs)
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.root.join(generation_name(generation))
    }
}

fn generation_name(generation: u64) -> String {
    format!("{}{}", GENERATION_PREFIX, generation)
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;

    file.write_all(bytes)
        .await
        .map_err(|e| PersistenceError::io(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| PersistenceError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use communities::CommunityConfig;
    use extract::{Entity, Relationship};
    use ingest::{Chunker, ChunkerConfig, Document};

    fn sample_store() -> GraphStore {
        let mut store = GraphStore::new();
        let document = Document::new("curie.txt", "Marie Curie discovered radium in Paris.");
        let chunks = Chunker::new(ChunkerConfig::default()).split(&document).collect();
        store.documents_mut().record(&document, chunks, Vec::new());
        store.upsert(
            &[
                Entity::new("Marie Curie", "PERSON", "physicist"),
                Entity::new("radium", "SUBSTANCE", "element"),
            ],
            &[
                Relationship::new("Marie Curie", "radium", "discovered", "1898"),
                Relationship::new("Marie Curie", "Paris", "worked_in", ""),
            ],
        );
        store.detect_communities(&CommunityConfig::default());
        store
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("never-written"));
        assert!(snapshots.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        let store = sample_store();

        let generation = snapshots.persist(SnapshotFiles::encode(&store).unwrap()).await.unwrap();
        assert_eq!(generation, 1);

        let loaded = snapshots.load().await.unwrap().unwrap();
        assert_eq!(loaded, store);
        assert!(!loaded.needs_detection());
    }

    #[tokio::test]
    async fn persist_replaces_old_and_orphaned_generations() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        let store = sample_store();

        snapshots.persist(SnapshotFiles::encode(&store).unwrap()).await.unwrap();
        std::fs::create_dir(dir.path().join("gen-7")).unwrap();
        std::fs::write(dir.path().join("gen-7").join(GRAPH_FILE), "garbage").unwrap();

        // The orphan is never read
        assert_eq!(snapshots.load().await.unwrap().unwrap(), store);

        let generation = snapshots.persist(SnapshotFiles::encode(&store).unwrap()).await.unwrap();
        assert_eq!(generation, 8);
        assert!(!dir.path().join("gen-1").exists());
        assert!(!dir.path().join("gen-7").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap(),
            "gen-8"
        );
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_generation_live() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        let store = sample_store();
        snapshots.persist(SnapshotFiles::encode(&store).unwrap()).await.unwrap();

        // A plain file where the next generation directory must go
        std::fs::write(dir.path().join("gen-2"), "in the way").unwrap();

        let mut changed = store.clone();
        changed.upsert(&[Entity::new("Pierre Curie", "PERSON", "")], &[]);
        let result = snapshots.persist(SnapshotFiles::encode(&changed).unwrap()).await;
        assert!(result.is_err());

        assert_eq!(snapshots.load().await.unwrap().unwrap(), store);
    }

    #[tokio::test]
    async fn corrupt_generation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        snapshots.persist(SnapshotFiles::encode(&sample_store()).unwrap()).await.unwrap();

        std::fs::write(dir.path().join("gen-1").join(GRAPH_FILE), "{ not json").unwrap();
        assert!(matches!(
            snapshots.load().await,
            Err(PersistenceError::Decode { .. })
        ));

        std::fs::write(dir.path().join(CURRENT_FILE), "nonsense").unwrap();
        assert!(matches!(
            snapshots.load().await,
            Err(PersistenceError::InvalidPointer(_))
        ));
    }
}
