//! # Deck generation
//!
//! Turns retrieved course material into verified flashcard decks. It
//! provides:
//!
//! - **Stage calls**: bounded, retrying generation calls with JSON extraction,
//!   schema validation and partial recovery
//! - **Evidence verification**: every cited excerpt is checked against its
//!   source chunk and corrected or flagged
//! - **Post-processing**: answer length limits, duplicate removal and a
//!   difficulty balance report
//! - **Module pipeline**: retrieval, two-stage generation, verification and
//!   persistence for one module, or many with [`run_batch`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ModulePipeline                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Retriever ──► fit_context ──► Stage A ──► Stage B              │
//! │     │                 (StageCaller + LlmClient)                 │
//! │     ▼                                      │                    │
//! │  ContentQueue                              ▼                    │
//! │  (too few chunks)      EvidenceVerifier ──► PostProcessor       │
//! │                                              │                  │
//! │                                              ▼                  │
//! │                        DeckStore ◄── Deck    ModuleResult       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod json;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod stage;
pub mod verifier;

pub use batch::run_batch;
pub use collaborator::{ContentQueue, DeckStore, Retriever};
pub use config::{DeckgenConfig, StageConfig};
pub use error::{DeckError, Result};
pub use json::{extract_json, JsonExtractionError, JsonSource};
pub use memory::{MemoryContentQueue, MemoryDeckStore, MemoryRetriever};
pub use model::{
    BloomLevel, CardBatch, ContentChunk, CoverageEntry, CoverageStatus, Deck, Difficulty,
    Evidence, FlashcardItem, KeyTopic, ModuleResult, ModuleStatus, ResultMetrics, SourceRef,
    SummaryPoint, TopicSummary,
};
pub use pipeline::{
    assign_card_ids, classify_status, ModulePipeline, PipelineBuilder, PipelineSettings,
};
pub use postprocess::{
    normalize_question, DifficultyMix, PostProcessReport, PostProcessSettings, PostProcessor,
};
pub use retry::{classify_error, Backoff, ErrorClass};
pub use schema::{
    CardBatchSchema, OutputSchema, Recovered, RelaxedCardSchema, SchemaIssue, TopicSummarySchema,
};
pub use stage::{
    ContextFit, StageCaller, StageErrorType, StageFailure, StageId, StageRequest, StageResult,
    StageSuccess,
};
pub use verifier::{
    apply_corrections, Correction, CorrectionStatus, EvidenceVerifier, VerificationOutcome,
    VerificationReport, VerificationSummary, VerifierOptions,
};
