use anyhow::Result;
use communities::{CommunitySummarizer, CommunitySummary};
use extract::{ExtractedChunk, LanguageModel, LlmError, TripleExtractor};
use futures::stream::{self, StreamExt};
use ingest::{Chunk, Chunker, Document, FileReader};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::IndexConfig;
use crate::error::PersistenceError;
use crate::snapshot::{SnapshotFiles, SnapshotStore};
use crate::store::{GraphStore, SummaryJob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub source: String,
    pub chunks: usize,
    pub entities_added: usize,
    pub relationships_added: usize,
    /// Same content was already indexed; nothing was extracted
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub communities: usize,
    pub summarized: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relationships: usize,
    pub communities: usize,
    pub summarized_communities: usize,
    pub revision: u64,
    pub stale: bool,
}

/// One persisted knowledge graph and the pipeline that feeds it.
///
/// Mutations are serialized by `writer`. The state lock is only held for
/// in-memory merges, so queries keep reading while extraction or
/// summarization calls are in flight.
pub struct Index {
    config: IndexConfig,
    chunker: Chunker,
    extractor: TripleExtractor,
    summarizer: CommunitySummarizer,
    snapshots: SnapshotStore,
    state: RwLock<GraphStore>,
    writer: Mutex<()>,
}

impl Index {
    /// Load the snapshot under `config.storage_dir`, or start empty when there
    /// is none or it cannot be read
    pub async fn open(config: IndexConfig, llm: Arc<dyn LanguageModel>) -> Self {
        let snapshots = SnapshotStore::new(&config.storage_dir);

        let store = match snapshots.load().await {
            Ok(Some(store)) => store,
            Ok(None) => {
                info!(path = %config.storage_dir.display(), "No snapshot found, starting with an empty index");
                GraphStore::new()
            }
            Err(error) => {
                warn!(
                    path = %config.storage_dir.display(),
                    error = %error,
                    "Snapshot unreadable, starting with an empty index"
                );
                GraphStore::new()
            }
        };

        Self {
            chunker: Chunker::new(config.chunker),
            extractor: TripleExtractor::new(llm.clone(), config.extractor.clone()),
            summarizer: CommunitySummarizer::new(llm),
            snapshots,
            state: RwLock::new(store),
            writer: Mutex::new(()),
            config,
        }
    }

    /// Shared view of the current state
    pub async fn read(&self) -> RwLockReadGuard<'_, GraphStore> {
        self.state.read().await
    }

    /// Read, chunk, extract and merge one file, then persist
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let (document, chunks) = ingest::ingest_file(path, &self.chunker).await?;
        Ok(self.ingest_chunks(document, chunks).await?)
    }

    pub async fn ingest_document(&self, document: Document) -> Result<IngestReport, PersistenceError> {
        let chunks = self.chunker.split(&document).collect();
        self.ingest_chunks(document, chunks).await
    }

    /// Ingest every supported file under `dir`. A failing file is logged and skipped.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<IngestReport>> {
        let files = FileReader::list_directory(dir)?;
        info!(path = %dir.display(), files = files.len(), "Ingesting directory");

        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            match self.ingest(&file).await {
                Ok(report) => reports.push(report),
                Err(error) => warn!(path = %file.display(), error = %error, "Failed to ingest file"),
            }
        }

        Ok(reports)
    }

    async fn ingest_chunks(&self, document: Document, chunks: Vec<Chunk>) -> Result<IngestReport, PersistenceError> {
        let _writer = self.writer.lock().await;

        let mut report = IngestReport {
            doc_id: document.id.clone(),
            source: document.source.clone(),
            chunks: chunks.len(),
            entities_added: 0,
            relationships_added: 0,
            skipped: false,
        };

        let retry: Option<Vec<String>> = {
            let state = self.state.read().await;
            if state.documents().is_unchanged(&document) {
                info!(source = %document.source, "Document unchanged, skipping");
                report.skipped = true;
                return Ok(report);
            }
            state.documents().failed_chunks(&document).map(<[String]>::to_vec)
        };

        let extracted = match &retry {
            Some(ids) => {
                let pending: Vec<Chunk> = chunks.iter().filter(|chunk| ids.contains(&chunk.chunk_id)).cloned().collect();
                info!(source = %document.source, chunks = pending.len(), "Retrying chunks that failed extraction");
                self.extractor.extract_all(&pending).await
            }
            None => self.extractor.extract_all(&chunks).await,
        };
        let failed = failed_chunk_ids(&extracted);
        if !failed.is_empty() {
            warn!(source = %document.source, failed = failed.len(), "Some chunks failed extraction and will be retried on the next ingest");
        }

        {
            let mut state = self.state.write().await;
            for chunk in &extracted {
                let summary = state.upsert(&chunk.extraction.entities, &chunk.extraction.relationships);
                report.entities_added += summary.entities_added;
                report.relationships_added += summary.relationships_added;
            }
            state.documents_mut().record(&document, chunks, failed);
        }

        self.after_mutation().await?;

        info!(
            source = %report.source,
            chunks = report.chunks,
            entities_added = report.entities_added,
            relationships_added = report.relationships_added,
            "Ingested document"
        );
        Ok(report)
    }

    /// Re-extract every stored chunk into a fresh graph
    pub async fn rebuild(&self) -> Result<IndexStats, PersistenceError> {
        let _writer = self.writer.lock().await;

        let chunks = self.state.read().await.documents().chunks();
        info!(chunks = chunks.len(), "Rebuilding graph");
        let extracted: Vec<ExtractedChunk> = self.extractor.extract_all(&chunks).await;

        {
            let mut state = self.state.write().await;
            state.reset_graph();
            for chunk in &extracted {
                state.upsert(&chunk.extraction.entities, &chunk.extraction.relationships);
            }
            state.documents_mut().reset_failures(&failed_chunk_ids(&extracted));
        }

        self.after_mutation().await?;
        Ok(self.stats().await)
    }

    /// Detect communities if the graph moved, summarize the ones missing a summary, persist
    pub async fn refresh_communities(&self) -> Result<RefreshReport, PersistenceError> {
        let _writer = self.writer.lock().await;
        self.refresh_locked().await
    }

    /// Refresh before answering a query, if enabled and needed. When a writer
    /// is active the query proceeds on the current communities instead of waiting.
    pub async fn refresh_if_stale(&self) -> Result<(), PersistenceError> {
        if !self.config.refresh_on_query {
            return Ok(());
        }
        {
            let state = self.state.read().await;
            if state.graph().is_empty() || !state.is_stale() {
                return Ok(());
            }
        }

        match self.writer.try_lock() {
            Ok(_writer) => {
                if self.state.read().await.is_stale() {
                    self.refresh_locked().await?;
                }
                Ok(())
            }
            Err(_) => {
                debug!("Index busy, answering from current communities");
                Ok(())
            }
        }
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            documents: state.documents().document_count(),
            chunks: state.documents().chunk_count(),
            entities: state.graph().entity_count(),
            relationships: state.graph().relationship_count(),
            communities: state.communities().len(),
            summarized_communities: state.communities().iter().filter(|c| c.summary.is_some()).count(),
            revision: state.graph().revision(),
            stale: state.is_stale(),
        }
    }

    async fn after_mutation(&self) -> Result<(), PersistenceError> {
        if self.config.detect_on_ingest {
            self.refresh_locked().await.map(|_| ())
        } else {
            self.persist_locked().await
        }
    }

    /// Caller holds `writer`
    async fn refresh_locked(&self) -> Result<RefreshReport, PersistenceError> {
        let jobs = {
            let mut state = self.state.write().await;
            if state.needs_detection() {
                state.detect_communities(&self.config.communities);
            }
            state.pending_summaries()
        };

        let results: Vec<(SummaryJob, Result<CommunitySummary, LlmError>)> = stream::iter(jobs)
            .map(|job| async move {
                let result = job.run(&self.summarizer).await;
                (job, result)
            })
            .buffer_unordered(self.config.communities.max_concurrent_summaries.max(1))
            .collect()
            .await;

        let mut report = RefreshReport::default();
        {
            let mut state = self.state.write().await;
            for (job, result) in results {
                match result {
                    Ok(summary) => {
                        if state.apply_summary(&job.digest, summary) {
                            report.summarized += 1;
                        }
                    }
                    Err(error) => {
                        warn!(community_id = job.community_id, error = %error, "Community summarization failed");
                        report.failed += 1;
                    }
                }
            }
            report.communities = state.communities().len();
        }

        info!(
            communities = report.communities,
            summarized = report.summarized,
            failed = report.failed,
            "Refreshed communities"
        );

        self.persist_locked().await?;
        Ok(report)
    }

    /// Caller holds `writer`
    async fn persist_locked(&self) -> Result<(), PersistenceError> {
        let files = SnapshotFiles::encode(&*self.state.read().await)?;
        self.snapshots.persist(files).await?;
        Ok(())
    }
}

fn failed_chunk_ids(extracted: &[ExtractedChunk]) -> Vec<String> {
    extracted
        .iter()
        .filter(|chunk| chunk.failed)
        .map(|chunk| chunk.chunk_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use communities::summarizer::SUMMARY_HEADER;
    use extract::EntityKey;
    use extract::prompt::EXTRACTION_HEADER;
    use extract::testing::ScriptedModel;
    use std::path::PathBuf;

    const CURIE_TEXT: &str = "Marie Curie discovered radium in Paris.";

    const CURIE_EXTRACTION: &str = r#"Here is the extraction:
{"entities": [
  {"entity_name": "Marie Curie", "entity_type": "person", "entity_description": "Physicist and chemist"},
  {"entity_name": "radium", "entity_type": "substance", "entity_description": "Radioactive element"},
  {"entity_name": "Paris", "entity_type": "location", "entity_description": "Capital of France"}
],
"relationships": [
  {"source_entity": "Marie Curie", "target_entity": "radium", "relation": "discovered", "relationship_description": "Curie discovered radium"},
  {"source_entity": "Marie Curie", "target_entity": "Paris", "relation": "worked_in", "relationship_description": "Her laboratory was in Paris"}
]}"#;

    fn curie_model() -> Arc<ScriptedModel> {
        Arc::new(
            ScriptedModel::new()
                .on(SUMMARY_HEADER, "Marie Curie discovered radium while working in Paris.")
                .on(EXTRACTION_HEADER, CURIE_EXTRACTION),
        )
    }

    fn config(storage: &Path) -> IndexConfig {
        IndexConfig {
            storage_dir: PathBuf::from(storage),
            ..IndexConfig::default()
        }
    }

    #[tokio::test]
    async fn ingest_builds_graph_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let model = curie_model();
        let index = Index::open(config(dir.path()), model.clone()).await;

        let report = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.entities_added, 3);
        assert_eq!(report.relationships_added, 2);

        {
            let state = index.read().await;
            let graph = state.graph();
            assert!(graph.contains(&EntityKey::new("Marie Curie", "PERSON")));
            assert!(graph.contains(&EntityKey::new("radium", "SUBSTANCE")));
            assert!(graph.contains(&EntityKey::new("Paris", "LOCATION")));
            assert!(graph.relationships().iter().any(|edge| {
                edge.source.name == "Marie Curie" && edge.target.name == "radium" && edge.relation == "discovered"
            }));
        }

        // Communities are deferred until asked for
        assert!(index.stats().await.stale);
        assert_eq!(index.stats().await.communities, 0);
        assert!(dir.path().join("CURRENT").exists());
    }

    #[tokio::test]
    async fn unchanged_document_is_not_extracted_twice() {
        let dir = tempfile::tempdir().unwrap();
        let model = curie_model();
        let index = Index::open(config(dir.path()), model.clone()).await;

        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        let calls = model.call_count();

        let report = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert!(report.skipped);
        assert_eq!(model.call_count(), calls);
        assert_eq!(index.stats().await.documents, 1);
    }

    #[tokio::test]
    async fn refresh_then_reopen_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let model = curie_model();
        let index = Index::open(config(dir.path()), model.clone()).await;
        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();

        let report = index.refresh_communities().await.unwrap();
        assert_eq!(report.communities, 1);
        assert_eq!(report.summarized, 1);
        let stats = index.stats().await;
        assert!(!stats.stale);

        let reopened = Index::open(config(dir.path()), Arc::new(ScriptedModel::new())).await;
        assert_eq!(reopened.stats().await, stats);
        assert_eq!(*reopened.read().await, *index.read().await);

        // Nothing changed, so refreshing again costs no model calls
        let calls = model.call_count();
        index.refresh_communities().await.unwrap();
        assert_eq!(model.call_count(), calls);
    }

    #[tokio::test]
    async fn failed_summary_is_retried_on_next_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(
            ScriptedModel::new()
                .fail_on(SUMMARY_HEADER)
                .on(EXTRACTION_HEADER, CURIE_EXTRACTION),
        );
        let index = Index::open(config(dir.path()), model.clone()).await;
        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();

        let report = index.refresh_communities().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(index.stats().await.stale);

        let calls = model.call_count();
        index.refresh_communities().await.unwrap();
        assert_eq!(model.call_count(), calls + 1);
    }

    #[tokio::test]
    async fn detect_on_ingest_keeps_communities_current() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(
            IndexConfig {
                detect_on_ingest: true,
                ..config(dir.path())
            },
            curie_model(),
        )
        .await;

        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        let stats = index.stats().await;
        assert!(!stats.stale);
        assert_eq!(stats.summarized_communities, 1);
    }

    #[tokio::test]
    async fn corrupt_snapshot_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("gen-1")).unwrap();
        std::fs::write(dir.path().join("gen-1").join("graph.json"), "{ truncated").unwrap();
        std::fs::write(dir.path().join("CURRENT"), "gen-1").unwrap();

        let index = Index::open(config(dir.path()), curie_model()).await;
        let stats = index.stats().await;
        assert_eq!(stats.entities, 0);
        assert_eq!(stats.documents, 0);

        // The next persist moves past the broken generation
        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("CURRENT")).unwrap(), "gen-2");
    }

    #[tokio::test]
    async fn rebuild_reproduces_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(config(dir.path()), curie_model()).await;
        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        let before = index.stats().await;

        let after = index.rebuild().await.unwrap();
        assert_eq!(after.entities, before.entities);
        assert_eq!(after.relationships, before.relationships);
        assert!(after.revision > before.revision);
    }

    #[tokio::test]
    async fn ingest_directory_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("nested")).unwrap();
        std::fs::write(docs.join("a.txt"), CURIE_TEXT).unwrap();
        std::fs::write(docs.join("nested").join("b.md"), "Pierre Curie worked in Paris.").unwrap();
        std::fs::write(docs.join("ignored.pdf"), "binary").unwrap();

        let index = Index::open(config(&dir.path().join("storage")), curie_model()).await;
        let reports = index.ingest_directory(&docs).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(index.stats().await.documents, 2);
    }

    #[tokio::test]
    async fn document_whose_extraction_failed_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let down = Arc::new(ScriptedModel::new().fail_on(EXTRACTION_HEADER));
        let index = Index::open(config(dir.path()), down).await;

        let first = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.entities_added, 0);
        assert_eq!(index.stats().await.documents, 1);
        drop(index);

        // The failure survives a restart and the same text is extracted again
        let model = curie_model();
        let index = Index::open(config(dir.path()), model.clone()).await;
        let second = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert!(!second.skipped);
        assert_eq!(second.entities_added, 3);
        assert_eq!(model.call_count(), 1);

        let third = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert!(third.skipped);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn rebuild_clears_recovered_failures() {
        let dir = tempfile::tempdir().unwrap();
        let down = Arc::new(ScriptedModel::new().fail_on(EXTRACTION_HEADER));
        Index::open(config(dir.path()), down)
            .await
            .ingest_document(Document::new("curie.txt", CURIE_TEXT))
            .await
            .unwrap();

        let model = curie_model();
        let index = Index::open(config(dir.path()), model.clone()).await;
        assert_eq!(index.rebuild().await.unwrap().entities, 3);

        let report = index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        assert!(report.skipped);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_ingests_all_reach_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(config(dir.path()), curie_model()).await;

        let ingests = (0..8).map(|i| {
            let document = Document::new(format!("note-{}.txt", i), format!("{} Note {}.", CURIE_TEXT, i));
            index.ingest_document(document)
        });
        for report in futures::future::join_all(ingests).await {
            assert!(!report.unwrap().skipped);
        }

        let reopened = Index::open(config(dir.path()), Arc::new(ScriptedModel::new())).await;
        let stats = reopened.stats().await;
        assert_eq!(stats.documents, 8);
        assert_eq!(stats.entities, 3);
    }

    #[tokio::test]
    async fn ingestion_runs_on_spawned_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(Index::open(config(dir.path()), curie_model()).await);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    let document = Document::new(format!("spawned-{}.txt", i), format!("{} Copy {}.", CURIE_TEXT, i));
                    index.ingest_document(document).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = Index::open(config(dir.path()), Arc::new(ScriptedModel::new())).await;
        assert_eq!(reopened.stats().await.documents, 4);
    }

    #[tokio::test]
    async fn query_time_refresh_leaves_an_empty_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(config(dir.path()), curie_model()).await;

        index.refresh_if_stale().await.unwrap();
        assert!(!dir.path().join("CURRENT").exists());

        index.ingest_document(Document::new("curie.txt", CURIE_TEXT)).await.unwrap();
        index.refresh_if_stale().await.unwrap();
        assert!(!index.stats().await.stale);
    }
}
