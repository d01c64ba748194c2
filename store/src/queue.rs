//! Content-acquisition requests appended to a JSON-lines file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deckgen_core::{ContentQueue, DeckError};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// One queued request for more source material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub job_id: String,
    pub module_id: String,
    pub requested_at: DateTime<Utc>,
}

/// Queue that appends one JSON line per request.
pub struct FileContentQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileContentQueue {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, request: &ContentRequest) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::CreateDirectory(format!("{}: {e}", parent.display())))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::WriteFile(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::WriteFile(format!("{}: {e}", self.path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::WriteFile(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Every request recorded so far, oldest first.
    pub async fn pending(&self) -> Result<Vec<ContentRequest>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::ReadFile(format!("{}: {e}", self.path.display())));
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl ContentQueue for FileContentQueue {
    async fn enqueue(&self, module_id: &str) -> deckgen_core::Result<String> {
        let request = ContentRequest {
            job_id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            requested_at: Utc::now(),
        };
        self.append(&request)
            .await
            .map_err(|e| DeckError::Queue(e.to_string()))?;

        info!("Queued content request {} for module {module_id}", request.job_id);
        Ok(request.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_requests_in_order() {
        let dir = TempDir::new().unwrap();
        let queue = FileContentQueue::new(dir.path().join("queue").join("requests.jsonl"));

        assert!(queue.pending().await.unwrap().is_empty());

        let first = queue.enqueue("101").await.unwrap();
        queue.enqueue("102").await.unwrap();

        let pending = queue.pending().await.unwrap();
        let modules: Vec<&str> = pending.iter().map(|r| r.module_id.as_str()).collect();
        assert_eq!(modules, vec!["101", "102"]);
        assert_eq!(pending[0].job_id, first);
    }
}
