use anyhow::{Context, Result};
use extract::{OllamaConfig, RetryConfig};
use index::IndexConfig;
use query::QueryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub ollama: OllamaConfig,
    pub retry: RetryConfig,
    pub index: IndexConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // More parallel model calls, shorter timeouts, fewer retries
    Accurate,  // Few parallel calls, patient timeouts and retries
    #[default]
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            ollama: OllamaConfig::default(),
            retry: RetryConfig::default(),
            index: IndexConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        let mut config = Self {
            mode: OperationMode::Fast,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            ..Self::default()
        };
        config.ollama.request_timeout_secs = 30;
        config.index.extractor.max_concurrent_extractions = 20;
        config.index.communities.max_concurrent_summaries = 10;
        config
    }

    pub fn accurate_mode() -> Self {
        let mut config = Self {
            mode: OperationMode::Accurate,
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        };
        config.ollama.request_timeout_secs = 120;
        config.index.extractor.max_concurrent_extractions = 3;
        config.index.communities.max_concurrent_summaries = 2;
        config
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
