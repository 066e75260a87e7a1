use anyhow::Result;
use extract::LanguageModel;
use index::{Index, IndexStats, IngestReport, PersistenceError, RefreshReport};
use query::{QueryEngine, SYNTHESIS_FAILED_ANSWER};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::metrics::{Metrics, TimedOperation};

/// Wires the index and query engine together for the HTTP layer
pub struct GraphRagService {
    index: Arc<Index>,
    engine: QueryEngine,
    metrics: Arc<Metrics>,
}

impl GraphRagService {
    pub async fn new(config: &AppConfig, llm: Arc<dyn LanguageModel>) -> Self {
        let index = Index::open(config.index.clone(), llm.clone()).await;
        Self {
            index: Arc::new(index),
            engine: QueryEngine::new(llm, config.query.clone()),
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start ingesting a file or directory and return immediately with the job id.
    /// Failures are logged under that id, never returned. Dropping the handle
    /// leaves the job running.
    pub fn submit_ingest(&self, path: PathBuf) -> (Uuid, JoinHandle<()>) {
        let id = Uuid::new_v4();
        let index = self.index.clone();
        let metrics = self.metrics.clone();
        metrics.record_job_started();

        let span = info_span!("ingest_job", job_id = %id, path = %path.display());
        let handle = tokio::spawn(
            async move {
                let timer = TimedOperation::start();
                let outcome = run_ingest(&index, &path).await;

                match outcome {
                    Ok(reports) => {
                        for report in &reports {
                            metrics.record_document(report);
                        }
                        metrics.record_job_finished(true, timer.elapsed());
                        info!(documents = reports.len(), "Ingestion job finished");
                    }
                    Err(e) => {
                        metrics.record_job_finished(false, timer.elapsed());
                        error!(error = %format!("{:#}", e), "Ingestion job failed");
                    }
                }
            }
            .instrument(span),
        );

        (id, handle)
    }

    pub async fn query(&self, text: &str) -> String {
        let timer = TimedOperation::start();
        let result = self.engine.answer(&self.index, text).await;

        let fallback = !result.trace.model_called || result.answer == SYNTHESIS_FAILED_ANSWER;
        self.metrics.record_query(timer.elapsed(), fallback);
        result.answer
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.stats().await
    }

    pub async fn refresh_communities(&self) -> Result<RefreshReport, PersistenceError> {
        self.index.refresh_communities().await
    }
}

async fn run_ingest(index: &Index, path: &Path) -> Result<Vec<IngestReport>> {
    if path.is_dir() {
        index.ingest_directory(path).await
    } else {
        Ok(vec![index.ingest(path).await?])
    }
}
