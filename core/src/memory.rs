//! In-memory collaborators for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::collaborator::{ContentQueue, DeckStore, Retriever};
use crate::error::{DeckError, Result};
use crate::model::{ContentChunk, Deck};

/// Retriever backed by a map of module id to chunks.
#[derive(Debug, Default)]
pub struct MemoryRetriever {
    modules: RwLock<HashMap<String, Vec<ContentChunk>>>,
    fail: AtomicBool,
}

impl MemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retriever holding a single module.
    pub fn with_module(module_id: impl Into<String>, chunks: Vec<ContentChunk>) -> Self {
        let modules = HashMap::from([(module_id.into(), chunks)]);
        Self {
            modules: RwLock::new(modules),
            fail: AtomicBool::new(false),
        }
    }

    /// Add or replace the chunks of a module.
    pub async fn insert(&self, module_id: impl Into<String>, chunks: Vec<ContentChunk>) {
        self.modules.write().await.insert(module_id.into(), chunks);
    }

    /// Make every retrieval fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Retriever for MemoryRetriever {
    async fn retrieve(&self, module_id: &str, k: usize) -> Result<Vec<ContentChunk>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeckError::Retrieval(format!(
                "retriever unavailable for module {module_id}"
            )));
        }

        let modules = self.modules.read().await;
        Ok(modules
            .get(module_id)
            .map(|chunks| chunks.iter().take(k).cloned().collect())
            .unwrap_or_default())
    }
}

/// Deck store holding decks in memory.
#[derive(Debug)]
pub struct MemoryDeckStore {
    name: String,
    decks: RwLock<HashMap<String, Deck>>,
    fail: AtomicBool,
}

impl Default for MemoryDeckStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDeckStore {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a store with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decks: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every save fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Stored decks by id.
    pub async fn decks(&self) -> HashMap<String, Deck> {
        self.decks.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.decks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.decks.read().await.is_empty()
    }
}

#[async_trait]
impl DeckStore for MemoryDeckStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, deck: &Deck) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeckError::Persistence(format!(
                "{} store rejected deck for module {}",
                self.name, deck.module_id
            )));
        }

        let mut decks = self.decks.write().await;
        if let Some(external_id) = &deck.external_id
            && let Some((id, _)) = decks
                .iter()
                .find(|(_, d)| d.external_id.as_ref() == Some(external_id))
        {
            debug!("Deck with external id {external_id} already stored as {id}");
            return Ok(id.clone());
        }

        let id = Uuid::new_v4().to_string();
        decks.insert(id.clone(), deck.clone());
        Ok(id)
    }
}

/// Content queue recording enqueued modules in memory.
#[derive(Debug, Default)]
pub struct MemoryContentQueue {
    jobs: RwLock<Vec<(String, String)>>,
}

impl MemoryContentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module ids enqueued so far, in order.
    pub async fn enqueued(&self) -> Vec<String> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|(_, module_id)| module_id.clone())
            .collect()
    }
}

#[async_trait]
impl ContentQueue for MemoryContentQueue {
    async fn enqueue(&self, module_id: &str) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        self.jobs
            .write()
            .await
            .push((job_id.clone(), module_id.to_string()));
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TopicSummary;
    use pretty_assertions::assert_eq;

    fn deck(external_id: Option<&str>) -> Deck {
        Deck::new("101", "HR basics", TopicSummary::default(), Vec::new())
            .with_external_id(external_id.map(String::from))
    }

    #[tokio::test]
    async fn test_retriever_limits_to_k() {
        let chunks: Vec<ContentChunk> = (1..=5)
            .map(|i| ContentChunk::new(format!("c{i}"), "a.pdf", "text"))
            .collect();
        let retriever = MemoryRetriever::with_module("101", chunks);

        assert_eq!(retriever.retrieve("101", 3).await.unwrap().len(), 3);
        assert!(retriever.retrieve("999", 3).await.unwrap().is_empty());

        retriever.set_failing(true);
        assert!(retriever.retrieve("101", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_deck_store_dedupes_external_id() {
        let store = MemoryDeckStore::new();
        let first = store.save(&deck(Some("run-1"))).await.unwrap();
        let second = store.save(&deck(Some("run-1"))).await.unwrap();
        let third = store.save(&deck(None)).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_deck_store_failure() {
        let store = MemoryDeckStore::named("primary");
        store.set_failing(true);
        let err = store.save(&deck(None)).await.unwrap_err();
        assert!(err.to_string().contains("primary store rejected"));
    }

    #[tokio::test]
    async fn test_queue_records_modules() {
        let queue = MemoryContentQueue::new();
        let a = queue.enqueue("101").await.unwrap();
        let b = queue.enqueue("102").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(queue.enqueued().await, vec!["101", "102"]);
    }
}
