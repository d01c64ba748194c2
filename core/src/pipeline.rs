//! Module pipeline orchestration.
//!
//! One run turns a module id into a persisted deck and a [`ModuleResult`]:
//!
//! 1. retrieve chunks, enqueueing a content request when there are too few
//! 2. condense the context if it exceeds the token budget
//! 3. Stage A: topic summary
//! 4. Stage B: flashcards
//! 5. normalise card ids, verify evidence against the retrieved chunks
//! 6. post-process, persist, classify
//!
//! Every outcome, including collaborator failures, is reported through the
//! returned [`ModuleResult`]; `run` never returns an error.

use std::sync::Arc;
use std::time::Instant;

use deckgen_llm::LlmClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborator::{ContentQueue, DeckStore, Retriever};
use crate::config::DeckgenConfig;
use crate::error::{DeckError, Result};
use crate::model::{
    card_id, CardBatch, ContentChunk, Deck, FlashcardItem, ModuleResult, ModuleStatus,
    ResultMetrics, TopicSummary,
};
use crate::postprocess::PostProcessor;
use crate::prompts;
use crate::schema::{CardBatchSchema, TopicSummarySchema};
use crate::stage::{StageCaller, StageFailure, StageId, StageRequest};
use crate::verifier::{apply_corrections, EvidenceVerifier};

/// Pipeline thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fewer retrieved chunks than this triggers a content request.
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    /// Chunks requested from the retriever.
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,

    /// Cards requested from Stage B; fewer surviving cards is `PARTIAL`.
    #[serde(default = "default_target_cards")]
    pub target_cards: usize,
}

fn default_min_chunks() -> usize {
    4
}

fn default_retrieve_k() -> usize {
    40
}

fn default_target_cards() -> usize {
    20
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_chunks: default_min_chunks(),
            retrieve_k: default_retrieve_k(),
            target_cards: default_target_cards(),
        }
    }
}

impl PipelineSettings {
    pub fn with_min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }

    pub fn with_retrieve_k(mut self, retrieve_k: usize) -> Self {
        self.retrieve_k = retrieve_k;
        self
    }

    pub fn with_target_cards(mut self, target_cards: usize) -> Self {
        self.target_cards = target_cards;
        self
    }
}

/// Status for a run that produced and persisted cards.
pub fn classify_status(
    card_count: usize,
    target_cards: usize,
    any_review_required: bool,
) -> ModuleStatus {
    if card_count < target_cards || any_review_required {
        ModuleStatus::Partial
    } else {
        ModuleStatus::Success
    }
}

/// Renumber cards as `M<module_id>_C<n>`, starting at 1 in output order.
pub fn assign_card_ids(module_id: &str, cards: &mut [FlashcardItem]) {
    for (i, card) in cards.iter_mut().enumerate() {
        card.card_id = card_id(module_id, i + 1);
    }
}

/// Bookkeeping for one run.
struct RunState {
    module_id: String,
    started: Instant,
    api_calls: u32,
    chunks_retrieved: usize,
    generated_count: usize,
    verified_count: usize,
    warnings: Vec<String>,
}

impl RunState {
    fn new(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            started: Instant::now(),
            api_calls: 0,
            chunks_retrieved: 0,
            generated_count: 0,
            verified_count: 0,
            warnings: Vec::new(),
        }
    }

    fn finish(
        self,
        status: ModuleStatus,
        deck_id: Option<String>,
        error_message: Option<String>,
    ) -> ModuleResult {
        let verification_rate = if self.generated_count == 0 {
            0.0
        } else {
            self.verified_count as f32 / self.generated_count as f32
        };

        ModuleResult {
            module_id: self.module_id,
            status,
            generated_count: self.generated_count,
            verified_count: self.verified_count,
            warnings: self.warnings,
            deck_id,
            metrics: ResultMetrics {
                time_ms: self.started.elapsed().as_millis() as u64,
                api_calls: self.api_calls,
                chunks_retrieved: self.chunks_retrieved,
                verification_rate,
            },
            error_message,
        }
    }

    fn fail(self, message: impl Into<String>) -> ModuleResult {
        let message = message.into();
        warn!("Module {} failed: {message}", self.module_id);
        self.finish(ModuleStatus::Failed, None, Some(message))
    }

    fn stage_failed(mut self, failure: StageFailure) -> ModuleResult {
        self.api_calls += failure.attempt_count;
        self.fail(failure.to_string())
    }
}

/// Generates, verifies and persists the deck for one module.
pub struct ModulePipeline {
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn DeckStore>,
    queue: Arc<dyn ContentQueue>,
    caller: StageCaller,
    verifier: EvidenceVerifier,
    post_processor: PostProcessor,
    settings: PipelineSettings,
}

impl ModulePipeline {
    /// Start wiring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline for one module.
    pub async fn run(&self, module_id: &str) -> ModuleResult {
        self.run_with_external_id(module_id, None).await
    }

    /// Run the pipeline, tagging the persisted deck with `external_id` so
    /// deduplicating stores return the existing deck on a rerun.
    pub async fn run_with_external_id(
        &self,
        module_id: &str,
        external_id: Option<String>,
    ) -> ModuleResult {
        info!("Generating deck for module {module_id}");
        let mut state = RunState::new(module_id);

        // Step 1: retrieve
        let chunks = match self
            .retriever
            .retrieve(module_id, self.settings.retrieve_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => return state.fail(e.to_string()),
        };
        state.chunks_retrieved = chunks.len();
        debug!("Retrieved {} chunks for module {module_id}", chunks.len());

        if chunks.len() < self.settings.min_chunks {
            return self.request_more_content(state, chunks.len()).await;
        }

        // Step 2: context guard
        let context = match self.caller.fit_context(&chunks).await {
            Ok(fit) => {
                state.api_calls += fit.api_calls;
                if fit.condensed {
                    state.warnings.push(format!(
                        "context condensed into {} summaries",
                        fit.chunks.len()
                    ));
                }
                fit.chunks
            }
            Err(failure) => return state.stage_failed(failure),
        };

        // Step 3: Stage A
        let summary = match self.summarize(module_id, &context).await {
            Ok((summary, attempts, warnings)) => {
                state.api_calls += attempts;
                state.warnings.extend(warnings);
                summary
            }
            Err(failure) => return state.stage_failed(failure),
        };

        // Step 4: Stage B
        let batch = match self.generate_cards(module_id, &summary, &context).await {
            Ok((batch, attempts, warnings)) => {
                state.api_calls += attempts;
                state.warnings.extend(warnings);
                batch
            }
            Err(failure) => return state.stage_failed(failure),
        };

        let CardBatch {
            mut cards,
            module_title,
            ..
        } = batch;

        // Step 5: ids and verification against the retrieved chunks
        assign_card_ids(module_id, &mut cards);
        state.generated_count = cards.len();

        let report = self.verifier.verify_all(&cards, &chunks);
        state.verified_count = report.summary.verified;
        if report.summary.failed > 0 {
            state.warnings.push(format!(
                "{} card(s) failed evidence verification",
                report.summary.failed
            ));
        }
        let cards = apply_corrections(cards, &report.outcomes);

        // Step 6: post-process
        let processed = self.post_processor.process(cards);
        state.warnings.extend(processed.warnings);
        let cards = processed.cards;

        if cards.is_empty() {
            return state.fail("no cards left after post-processing");
        }

        // Step 7: persist
        let card_count = cards.len();
        let any_review_required = cards.iter().any(|c| c.review_required);
        let title = module_title.unwrap_or_else(|| format!("Module {module_id}"));
        let deck = Deck::new(module_id, title, summary, cards).with_external_id(external_id);

        let deck_id = match self.store.save(&deck).await {
            Ok(id) => id,
            Err(e) => return state.fail(format!("failed to persist deck: {e}")),
        };

        let status = classify_status(card_count, self.settings.target_cards, any_review_required);
        info!(
            "Module {module_id} finished with {status}: {card_count} card(s), {} of {} verified, deck {deck_id}",
            state.verified_count, state.generated_count
        );
        state.finish(status, Some(deck_id), None)
    }

    async fn request_more_content(&self, mut state: RunState, found: usize) -> ModuleResult {
        let module_id = state.module_id.clone();
        info!(
            "Module {module_id} has {found} chunk(s), need {}; requesting more content",
            self.settings.min_chunks
        );
        state.warnings.push(format!(
            "only {found} chunk(s) retrieved, need at least {}",
            self.settings.min_chunks
        ));

        match self.queue.enqueue(&module_id).await {
            Ok(job_id) => state
                .warnings
                .push(format!("content acquisition requested (job {job_id})")),
            Err(e) => {
                warn!("Failed to enqueue content request for module {module_id}: {e}");
                state
                    .warnings
                    .push(format!("content acquisition request failed: {e}"));
            }
        }

        state.finish(ModuleStatus::NeedMoreContent, None, None)
    }

    async fn summarize(
        &self,
        module_id: &str,
        chunks: &[ContentChunk],
    ) -> std::result::Result<(TopicSummary, u32, Vec<String>), StageFailure> {
        let (system, user) = prompts::stage_a(module_id, chunks);
        let request = StageRequest::new(
            StageId::StageA,
            system,
            user,
            self.caller.config().stage_a.clone(),
        );
        let success = self
            .caller
            .call(request, &TopicSummarySchema::default())
            .await?;
        Ok((success.output, success.attempts, success.warnings))
    }

    async fn generate_cards(
        &self,
        module_id: &str,
        summary: &TopicSummary,
        chunks: &[ContentChunk],
    ) -> std::result::Result<(CardBatch, u32, Vec<String>), StageFailure> {
        let (system, user) =
            prompts::stage_b(module_id, summary, chunks, self.settings.target_cards);
        let request = StageRequest::new(
            StageId::StageB,
            system,
            user,
            self.caller.config().stage_b.clone(),
        );
        let success = self
            .caller
            .call(request, &CardBatchSchema::default())
            .await?;
        Ok((success.output, success.attempts, success.warnings))
    }
}

/// Builder for [`ModulePipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: DeckgenConfig,
    client: Option<Arc<dyn LlmClient>>,
    retriever: Option<Arc<dyn Retriever>>,
    store: Option<Arc<dyn DeckStore>>,
    queue: Option<Arc<dyn ContentQueue>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: DeckgenConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn store(mut self, store: Arc<dyn DeckStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn ContentQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Build the pipeline, failing on a missing collaborator or invalid
    /// stage configuration.
    pub fn build(self) -> Result<ModulePipeline> {
        let client = self.client.ok_or_else(|| missing("client"))?;
        let retriever = self.retriever.ok_or_else(|| missing("retriever"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let queue = self.queue.ok_or_else(|| missing("queue"))?;

        let DeckgenConfig {
            stage,
            verifier,
            post_process,
            pipeline,
        } = self.config;

        Ok(ModulePipeline {
            retriever,
            store,
            queue,
            caller: StageCaller::new(client, stage)?,
            verifier: EvidenceVerifier::new(verifier),
            post_processor: PostProcessor::new(post_process),
            settings: pipeline,
        })
    }
}

fn missing(what: &str) -> DeckError {
    DeckError::Config(format!("pipeline requires a {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::memory::{MemoryContentQueue, MemoryDeckStore, MemoryRetriever};
    use crate::model::{BloomLevel, Difficulty, Evidence, SourceRef};
    use deckgen_llm::{ScriptedClient, ScriptedReply};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(20, 20, false), ModuleStatus::Success);
        assert_eq!(classify_status(25, 20, false), ModuleStatus::Success);
        assert_eq!(classify_status(19, 20, false), ModuleStatus::Partial);
        assert_eq!(classify_status(20, 20, true), ModuleStatus::Partial);
    }

    #[test]
    fn test_assign_card_ids_is_sequential() {
        let card = FlashcardItem {
            card_id: "whatever".to_string(),
            question: "q".to_string(),
            answer: "a".to_string(),
            difficulty: Difficulty::Easy,
            bloom_level: BloomLevel::Remember,
            evidence: vec![Evidence {
                chunk_id: "c1".to_string(),
                source_file: String::new(),
                location: String::new(),
                start_sec: None,
                end_sec: None,
                excerpt: "excerpt text".to_string(),
            }],
            sources: vec![SourceRef {
                kind: "pdf".to_string(),
                file: "a.pdf".to_string(),
                location: String::new(),
            }],
            confidence_score: 0.5,
            rationale: String::new(),
            review_required: false,
            recovered: false,
        };
        let mut cards = vec![card.clone(), card.clone(), card];
        cards[1].card_id = "M7_C9".to_string();

        assign_card_ids("7", &mut cards);
        let ids: Vec<&str> = cards.iter().map(|c| c.card_id.as_str()).collect();
        assert_eq!(ids, vec!["M7_C1", "M7_C2", "M7_C3"]);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = ModulePipeline::builder()
            .client(Arc::new(ScriptedClient::new([])))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "configuration error: pipeline requires a retriever");
    }

    #[test]
    fn test_builder_rejects_bad_stage_config() {
        let config = DeckgenConfig::default().with_stage(StageConfig::default().with_max_retries(0));
        let result = ModulePipeline::builder()
            .config(config)
            .client(Arc::new(ScriptedClient::new([])))
            .retriever(Arc::new(MemoryRetriever::new()))
            .store(Arc::new(MemoryDeckStore::new()))
            .queue(Arc::new(MemoryContentQueue::new()))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retrieval_error_is_failed_result() {
        let retriever = Arc::new(MemoryRetriever::new());
        retriever.set_failing(true);
        let client = Arc::new(ScriptedClient::new([ScriptedReply::text("{}")]));
        let pipeline = ModulePipeline::builder()
            .client(client.clone())
            .retriever(retriever)
            .store(Arc::new(MemoryDeckStore::new()))
            .queue(Arc::new(MemoryContentQueue::new()))
            .build()
            .unwrap();

        let result = pipeline.run("101").await;
        assert_eq!(result.status, ModuleStatus::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some("retrieval error: retriever unavailable for module 101")
        );
        assert_eq!(result.metrics.api_calls, 0);
        assert_eq!(client.call_count(), 0);
    }
}
