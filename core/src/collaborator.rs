//! Interfaces the pipeline depends on but does not implement.
//!
//! File-backed implementations live in `deckgen-store`; in-memory ones in
//! [`crate::memory`].

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ContentChunk, Deck};

/// Source of content chunks for a module.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` chunks for `module_id`, most relevant first.
    async fn retrieve(&self, module_id: &str, k: usize) -> Result<Vec<ContentChunk>>;
}

/// Persistence for finished decks.
#[async_trait]
pub trait DeckStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &str;

    /// Persist a deck and return its identifier.
    ///
    /// Stores that deduplicate return the existing identifier when a deck
    /// with the same `external_id` was already saved.
    async fn save(&self, deck: &Deck) -> Result<String>;
}

/// Queue of modules that need more source material.
#[async_trait]
pub trait ContentQueue: Send + Sync {
    /// Request content acquisition for a module and return the job id.
    async fn enqueue(&self, module_id: &str) -> Result<String>;
}
