mod config;
mod metrics;
mod routes;
mod service;

use anyhow::{Context, Result};
use extract::{LanguageModel, OllamaClient, RetryPolicy, RetryingModel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, LogFormat, OperationMode};
use service::GraphRagService;

/// Config file path; without it the `GRAPHRAG_MODE` preset (fast, accurate, balanced) is used
const CONFIG_ENV: &str = "GRAPHRAG_CONFIG";
const MODE_ENV: &str = "GRAPHRAG_MODE";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    tracing::info!(
        mode = ?config.mode,
        model = %config.ollama.model,
        storage = %config.index.storage_dir.display(),
        "Starting GraphRAG service"
    );

    let llm: Arc<dyn LanguageModel> = Arc::new(RetryingModel::new(
        OllamaClient::new(&config.ollama),
        RetryPolicy::from_config(&config.retry),
    ));

    let service = Arc::new(GraphRagService::new(&config, llm).await);
    let app = routes::router(service);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn load_config() -> Result<AppConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return AppConfig::from_file(&PathBuf::from(path));
    }

    let mode = match std::env::var(MODE_ENV) {
        Ok(value) => serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
            .with_context(|| format!("Unknown {}: {}", MODE_ENV, value))?,
        Err(_) => OperationMode::Balanced,
    };
    Ok(AppConfig::for_mode(mode))
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
