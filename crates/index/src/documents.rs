use ingest::{Chunk, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub source: String,
    pub content_hash: String,
    pub chunks: Vec<Chunk>,
    /// Chunks whose model call failed; retried when the same content is ingested again
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_chunks: Vec<String>,
}

/// Ingested documents and their chunks, in ingestion order.
///
/// Chunks are kept so the graph can be rebuilt without rereading sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStore {
    documents: Vec<DocumentRecord>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc_id: &str) -> Option<&DocumentRecord> {
        self.documents.iter().find(|record| record.id == doc_id)
    }

    fn same_content(&self, document: &Document) -> Option<&DocumentRecord> {
        self.get(&document.id)
            .filter(|record| record.content_hash == document.content_hash())
    }

    /// True when this exact text was already ingested from the same source
    /// and every chunk of it was extracted
    pub fn is_unchanged(&self, document: &Document) -> bool {
        self.same_content(document)
            .is_some_and(|record| record.failed_chunks.is_empty())
    }

    /// Chunk ids left over from an earlier attempt at this exact text
    pub fn failed_chunks(&self, document: &Document) -> Option<&[String]> {
        self.same_content(document)
            .map(|record| record.failed_chunks.as_slice())
            .filter(|failed| !failed.is_empty())
    }

    /// Record a document, replacing any earlier version from the same source
    pub fn record(&mut self, document: &Document, chunks: Vec<Chunk>, failed_chunks: Vec<String>) {
        self.documents.retain(|record| record.id != document.id);
        self.documents.push(DocumentRecord {
            id: document.id.clone(),
            source: document.source.clone(),
            content_hash: document.content_hash(),
            chunks,
            failed_chunks,
        });
    }

    /// Replace every record's failure list after the whole store was re-extracted
    pub fn reset_failures(&mut self, failed: &[String]) {
        for record in &mut self.documents {
            record.failed_chunks = record
                .chunks
                .iter()
                .filter(|chunk| failed.contains(&chunk.chunk_id))
                .map(|chunk| chunk.chunk_id.clone())
                .collect();
        }
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    /// Every stored chunk, document by document
    pub fn chunks(&self) -> Vec<Chunk> {
        self.documents
            .iter()
            .flat_map(|record| record.chunks.iter().cloned())
            .collect()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|record| record.chunks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::{Chunker, ChunkerConfig};

    fn chunked(document: &Document) -> Vec<Chunk> {
        Chunker::new(ChunkerConfig::default()).split(document).collect()
    }

    #[test]
    fn unchanged_detection_follows_content() {
        let mut store = DocumentStore::new();
        let original = Document::new("a.txt", "Marie Curie discovered radium.");
        store.record(&original, chunked(&original), Vec::new());

        assert!(store.is_unchanged(&original));
        assert!(!store.is_unchanged(&Document::new("a.txt", "Something else.")));
        assert!(!store.is_unchanged(&Document::new("b.txt", "Marie Curie discovered radium.")));
    }

    #[test]
    fn new_version_replaces_old_record() {
        let mut store = DocumentStore::new();
        let first = Document::new("a.txt", "one two");
        let other = Document::new("b.txt", "three");
        let second = Document::new("a.txt", "one two four");

        store.record(&first, chunked(&first), Vec::new());
        store.record(&other, chunked(&other), Vec::new());
        store.record(&second, chunked(&second), Vec::new());

        assert_eq!(store.document_count(), 2);
        assert_eq!(store.chunk_count(), 2);
        assert_eq!(store.documents()[1].content_hash, second.content_hash());
        assert_eq!(store.chunks()[1].text, "one two four");
    }

    #[test]
    fn failed_chunks_keep_the_document_open_for_retry() {
        let mut store = DocumentStore::new();
        let document = Document::new("a.txt", "Marie Curie discovered radium.");
        let chunks = chunked(&document);
        let chunk_id = chunks[0].chunk_id.clone();

        store.record(&document, chunks, vec![chunk_id.clone()]);
        assert!(!store.is_unchanged(&document));
        assert_eq!(store.failed_chunks(&document), Some(&[chunk_id][..]));

        // New content starts over, it does not retry
        assert_eq!(store.failed_chunks(&Document::new("a.txt", "Other text.")), None);

        store.reset_failures(&[]);
        assert!(store.is_unchanged(&document));
        assert_eq!(store.failed_chunks(&document), None);
    }
}
