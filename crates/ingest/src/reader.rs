use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::document::Document;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

pub struct FileReader;

impl FileReader {
    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
    }

    pub async fn read_file(path: &Path) -> Result<Document> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        if !Self::is_supported(path) {
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;

        debug!(path = %path.display(), bytes = content.len(), "Read document");
        Ok(Document::new(path.to_string_lossy(), content))
    }

    /// Every supported file under `dir`, recursively, in a stable order
    pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk directory: {:?}", dir))?;
            let path = entry.path();
            if entry.file_type().is_file() && Self::is_supported(path) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_text_files() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = dir.path().join("curie.txt");
        std::fs::write(&path, "Marie Curie discovered radium in Paris.").unwrap();

        let document = FileReader::read_file(&path).await.unwrap();
        assert_eq!(document.text, "Marie Curie discovered radium in Paris.");
        assert_eq!(document.source, path.to_string_lossy());
    }

    #[tokio::test]
    async fn rejects_unsupported_formats() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, "%PDF").unwrap();

        let err = FileReader::read_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported file format"));
    }

    #[test]
    fn lists_supported_files_recursively() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("skip.json"), "{}").unwrap();
        std::fs::write(dir.path().join("nested/c.txt"), "c").unwrap();

        let files = FileReader::list_directory(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "nested/c.txt"]);
    }
}
