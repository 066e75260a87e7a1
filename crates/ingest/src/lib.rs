pub mod chunk;
pub mod chunker;
pub mod document;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig, Chunks};
pub use document::{Document, generate_doc_id};
pub use reader::FileReader;

use anyhow::Result;
use std::path::Path;

/// Read a file and split it with the given chunker
pub async fn ingest_file(file_path: &Path, chunker: &Chunker) -> Result<(Document, Vec<Chunk>)> {
    let document = FileReader::read_file(file_path).await?;
    let chunks = chunker.split(&document).collect();

    Ok((document, chunks))
}
