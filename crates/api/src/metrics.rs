use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Ingestion jobs
    ingest_jobs_started: AtomicUsize,
    ingest_jobs_succeeded: AtomicUsize,
    ingest_jobs_failed: AtomicUsize,
    documents_skipped: AtomicUsize,

    // Queries
    queries: AtomicUsize,
    fallback_answers: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_query_time_us: AtomicU64,

    // Counts
    total_chunks_processed: AtomicUsize,
    total_entities_added: AtomicUsize,
    total_relationships_added: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ingest_jobs_started: AtomicUsize::new(0),
            ingest_jobs_succeeded: AtomicUsize::new(0),
            ingest_jobs_failed: AtomicUsize::new(0),
            documents_skipped: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            fallback_answers: AtomicUsize::new(0),
            total_ingest_time_us: AtomicU64::new(0),
            total_query_time_us: AtomicU64::new(0),
            total_chunks_processed: AtomicUsize::new(0),
            total_entities_added: AtomicUsize::new(0),
            total_relationships_added: AtomicUsize::new(0),
        })
    }

    pub fn record_job_started(&self) {
        self.ingest_jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_finished(&self, success: bool, duration: Duration) {
        if success {
            self.ingest_jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ingest_jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_ingest_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_document(&self, report: &index::IngestReport) {
        if report.skipped {
            self.documents_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.total_chunks_processed.fetch_add(report.chunks, Ordering::Relaxed);
        self.total_entities_added.fetch_add(report.entities_added, Ordering::Relaxed);
        self.total_relationships_added.fetch_add(report.relationships_added, Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration, fallback: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.fallback_answers.fetch_add(1, Ordering::Relaxed);
        }
        self.total_query_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = self.ingest_jobs_succeeded.load(Ordering::Relaxed)
            + self.ingest_jobs_failed.load(Ordering::Relaxed);

        MetricsSnapshot {
            ingest_jobs_started: self.ingest_jobs_started.load(Ordering::Relaxed),
            ingest_jobs_succeeded: self.ingest_jobs_succeeded.load(Ordering::Relaxed),
            ingest_jobs_failed: self.ingest_jobs_failed.load(Ordering::Relaxed),
            documents_skipped: self.documents_skipped.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            fallback_answers: self.fallback_answers.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, finished),
            avg_query_time_ms: avg_time_ms(&self.total_query_time_us, self.queries.load(Ordering::Relaxed)),
            total_chunks_processed: self.total_chunks_processed.load(Ordering::Relaxed),
            total_entities_added: self.total_entities_added.load(Ordering::Relaxed),
            total_relationships_added: self.total_relationships_added.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub ingest_jobs_started: usize,
    pub ingest_jobs_succeeded: usize,
    pub ingest_jobs_failed: usize,
    pub documents_skipped: usize,
    pub queries: usize,
    pub fallback_answers: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub total_chunks_processed: usize,
    pub total_entities_added: usize,
    pub total_relationships_added: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
