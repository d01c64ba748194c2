//! # Deck store
//!
//! File-backed implementations of the pipeline's collaborators:
//!
//! - **[`FileDeckStore`]**: one JSON file per deck, written atomically,
//!   deduplicated by external id
//! - **[`FallbackDeckStore`]**: tries a primary store, then a fallback
//! - **[`FileChunkRetriever`]**: reads `<dir>/<module_id>.json`
//! - **[`FileContentQueue`]**: appends content requests to a JSON-lines file

pub mod deck_store;
pub mod error;
pub mod fallback;
pub mod queue;
pub mod retriever;

pub use deck_store::FileDeckStore;
pub use error::{Result, StoreError};
pub use fallback::FallbackDeckStore;
pub use queue::{ContentRequest, FileContentQueue};
pub use retriever::FileChunkRetriever;
