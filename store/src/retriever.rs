//! Chunk retrieval from JSON files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deckgen_core::{ContentChunk, DeckError, Retriever};
use tokio::fs;
use tracing::debug;

use crate::error::{check_file_id, StoreError};

/// Reads a module's chunks from `<dir>/<module_id>.json`, a JSON array of
/// chunks in relevance order. A module without a file has no chunks.
pub struct FileChunkRetriever {
    dir: PathBuf,
}

impl FileChunkRetriever {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn load(&self, module_id: &str) -> crate::Result<Vec<ContentChunk>> {
        check_file_id(module_id)?;
        let path = self.dir.join(format!("{module_id}.json"));

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No chunk file for module {module_id} at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::ReadFile(format!("{}: {e}", path.display()))),
        };

        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl Retriever for FileChunkRetriever {
    async fn retrieve(
        &self,
        module_id: &str,
        k: usize,
    ) -> deckgen_core::Result<Vec<ContentChunk>> {
        let mut chunks = self
            .load(module_id)
            .await
            .map_err(|e| DeckError::Retrieval(e.to_string()))?;
        chunks.truncate(k);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_and_limits_chunks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("101.json"),
            r#"[
                {"chunk_id": "c1", "source_file": "hr.pdf", "location": "p1", "text": "Recruitment basics."},
                {"chunk_id": "c2", "source_file": "hr.pdf", "text": "Onboarding basics."},
                {"chunk_id": "c3", "source_file": "hr.pdf", "text": "Reviews basics."}
            ]"#,
        )
        .unwrap();

        let retriever = FileChunkRetriever::new(dir.path());
        let chunks = retriever.retrieve("101", 2).await.unwrap();

        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(chunks[0].location.as_deref(), Some("p1"));
        assert!(chunks[1].tokens() > 0);
    }

    #[tokio::test]
    async fn test_missing_module_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let retriever = FileChunkRetriever::new(dir.path());
        assert!(retriever.retrieve("404", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_retrieval_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("101.json"), "not json").unwrap();
        let retriever = FileChunkRetriever::new(dir.path());

        let err = retriever.retrieve("101", 10).await.unwrap_err();
        assert!(matches!(err, DeckError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_like_module_ids() {
        let dir = TempDir::new().unwrap();
        let retriever = FileChunkRetriever::new(dir.path());
        assert!(retriever.retrieve("../secrets", 10).await.is_err());
    }
}
