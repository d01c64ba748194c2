//! Primary/fallback deck persistence.

use std::sync::Arc;

use async_trait::async_trait;
use deckgen_core::{Deck, DeckError, DeckStore};
use tracing::warn;

/// Saves to `primary`, falling back to `fallback` when that fails.
///
/// The pipeline sees a single store; a save fails only when both do.
pub struct FallbackDeckStore {
    primary: Arc<dyn DeckStore>,
    fallback: Arc<dyn DeckStore>,
}

impl FallbackDeckStore {
    pub fn new(primary: Arc<dyn DeckStore>, fallback: Arc<dyn DeckStore>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl DeckStore for FallbackDeckStore {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn save(&self, deck: &Deck) -> deckgen_core::Result<String> {
        let primary_err = match self.primary.save(deck).await {
            Ok(id) => return Ok(id),
            Err(e) => e,
        };
        warn!(
            "Primary store {} failed for module {}: {primary_err}; using {}",
            self.primary.name(),
            deck.module_id,
            self.fallback.name()
        );

        self.fallback.save(deck).await.map_err(|fallback_err| {
            DeckError::Persistence(format!(
                "{}: {primary_err}; {}: {fallback_err}",
                self.primary.name(),
                self.fallback.name()
            ))
        })
    }
}
