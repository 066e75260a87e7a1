use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk within its document, starting at 0
    pub index: usize,
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    /// Byte range `[start, end)` of `text` inside the document. Always on char boundaries.
    pub char_span: (usize, usize),
}

impl Chunk {
    pub fn new(
        index: usize,
        doc_id: String,
        text: String,
        source: String,
        char_span: (usize, usize),
    ) -> Self {
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&doc_id, &text, char_span);

        Self {
            index,
            doc_id,
            chunk_id,
            text,
            source,
            char_span,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, span: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(span.0.to_string().as_bytes());
        hasher.update(span.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }
}
