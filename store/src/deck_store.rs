//! JSON file deck store.
//!
//! Each deck lives in `<root>/<deck_id>.json`. Writes go to a temp file that
//! is renamed into place so a crash never leaves a half-written deck.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deckgen_core::{Deck, DeckStore};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{check_file_id, Result, StoreError};

/// Deck store writing one JSON file per deck.
pub struct FileDeckStore {
    root: PathBuf,

    /// External id to deck id, for decks that carry one.
    external_ids: Mutex<HashMap<String, String>>,
}

impl FileDeckStore {
    /// Open a store at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::CreateDirectory(format!("{}: {e}", root.display())))?;

        let store = Self {
            root,
            external_ids: Mutex::new(HashMap::new()),
        };
        let index = store.scan().await?;
        *store.external_ids.lock().await = index;

        Ok(store)
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn deck_path(&self, deck_id: &str) -> PathBuf {
        self.root.join(format!("{deck_id}.json"))
    }

    /// Build the external id index from the decks on disk.
    async fn scan(&self) -> Result<HashMap<String, String>> {
        let mut index = HashMap::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::ReadFile(format!("{}: {e}", self.root.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::ReadFile(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(deck_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match self.read_deck(&path).await {
                Ok(deck) => {
                    if let Some(external_id) = deck.external_id {
                        index.insert(external_id, deck_id.to_string());
                    }
                }
                Err(e) => warn!("Skipping unreadable deck {}: {e}", path.display()),
            }
        }

        info!(
            "Opened deck store at {} ({} deck(s) with external ids)",
            self.root.display(),
            index.len()
        );
        Ok(index)
    }

    async fn read_deck(&self, path: &Path) -> Result<Deck> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::ReadFile(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_deck(&self, deck_id: &str, deck: &Deck) -> Result<()> {
        let path = self.deck_path(deck_id);
        let content = serde_json::to_string_pretty(deck)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| StoreError::WriteFile(format!("{}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::WriteFile(format!("{}: {e}", path.display())))?;

        debug!("Saved deck {deck_id} for module {}", deck.module_id);
        Ok(())
    }

    /// Load a deck by id.
    pub async fn load(&self, deck_id: &str) -> Result<Option<Deck>> {
        check_file_id(deck_id)?;
        let path = self.deck_path(deck_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        self.read_deck(&path).await.map(Some)
    }

    /// Ids of every stored deck, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::ReadFile(format!("{}: {e}", self.root.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::ReadFile(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn save_deck(&self, deck: &Deck) -> Result<String> {
        // Held across the write so two saves with one external id cannot race.
        let mut external_ids = self.external_ids.lock().await;

        if let Some(external_id) = &deck.external_id
            && let Some(existing) = external_ids.get(external_id)
        {
            debug!("Deck with external id {external_id} already stored as {existing}");
            return Ok(existing.clone());
        }

        let deck_id = Uuid::new_v4().to_string();
        self.write_deck(&deck_id, deck).await?;

        if let Some(external_id) = &deck.external_id {
            external_ids.insert(external_id.clone(), deck_id.clone());
        }
        Ok(deck_id)
    }
}

#[async_trait]
impl DeckStore for FileDeckStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, deck: &Deck) -> deckgen_core::Result<String> {
        Ok(self.save_deck(deck).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckgen_core::TopicSummary;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn deck(external_id: Option<&str>) -> Deck {
        Deck::new("101", "HR Fundamentals", TopicSummary::default(), Vec::new())
            .with_external_id(external_id.map(String::from))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileDeckStore::new(dir.path()).await.unwrap();

        let id = store.save(&deck(None)).await.unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();

        assert_eq!(loaded.title, "HR Fundamentals");
        assert_eq!(store.list().await.unwrap(), vec![id]);
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileDeckStore::new(dir.path()).await.unwrap();
        store.save(&deck(None)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_external_id_dedupes_across_reopen() {
        let dir = TempDir::new().unwrap();
        let first = {
            let store = FileDeckStore::new(dir.path()).await.unwrap();
            store.save(&deck(Some("run-1"))).await.unwrap()
        };

        let store = FileDeckStore::new(dir.path()).await.unwrap();
        let second = store.save(&deck(Some("run-1"))).await.unwrap();
        let other = store.save(&deck(Some("run-2"))).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileDeckStore::new(dir.path()).await.unwrap();
        assert!(matches!(
            store.load("../etc/passwd").await,
            Err(StoreError::InvalidId(_))
        ));
    }
}
