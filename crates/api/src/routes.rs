use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics::MetricsSnapshot;
use crate::service::GraphRagService;

type AppState = Arc<GraphRagService>;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
struct IngestRequest {
    path: String,
}

#[derive(Serialize)]
struct IngestResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
}

pub fn router(service: Arc<GraphRagService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .route("/stats", get(stats))
        .route("/communities/refresh", post(refresh_communities))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn ingest(
    State(service): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), StatusCode> {
    if req.path.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (job_id, _) = service.submit_ingest(PathBuf::from(req.path.trim()));
    info!(job_id = %job_id, "Accepted ingestion job");

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            job_id: job_id.to_string(),
        }),
    ))
}

async fn query(
    State(service): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, StatusCode> {
    if req.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let answer = service.query(&req.query).await;
    Ok(Json(QueryResponse { answer }))
}

async fn stats(State(service): State<AppState>) -> Json<index::IndexStats> {
    Json(service.stats().await)
}

async fn refresh_communities(
    State(service): State<AppState>,
) -> Result<Json<index::RefreshReport>, StatusCode> {
    service.refresh_communities().await.map(Json).map_err(|e| {
        error!(error = %e, "Community refresh failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn metrics(State(service): State<AppState>) -> Json<MetricsSnapshot> {
    Json(service.metrics().snapshot())
}
