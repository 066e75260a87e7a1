use thiserror::Error;

/// Failure of a single language-model request.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Failed to send request to {model}: {message}")]
    Request { model: String, message: String },

    #[error("{model} request failed with status {status}: {body}")]
    Status {
        model: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {model}: {message}")]
    Decode { model: String, message: String },

    #[cfg(any(test, feature = "testing"))]
    #[error("Scripted model failure: {0}")]
    Scripted(String),
}

/// Extraction problems that are recovered locally and never abort a batch.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The model response could not be decoded as structured data
    #[error("Failed to parse extraction output: {0}")]
    Parse(String),

    /// One entity or relationship record is missing a field or has the wrong shape
    #[error("Malformed {kind} record #{position}: {message}")]
    Field {
        kind: RecordKind,
        position: usize,
        message: String,
    },

    #[error(transparent)]
    Model(#[from] LlmError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Entity,
    Relationship,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Entity => write!(f, "entity"),
            RecordKind::Relationship => write!(f, "relationship"),
        }
    }
}
