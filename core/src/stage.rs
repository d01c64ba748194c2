//! Bounded, retrying invocation of one generation stage.
//!
//! A stage call races the generation client against a deadline, extracts
//! JSON from whatever text comes back, validates it against the stage's
//! schema and, for schemas that support it, salvages a partial result. The
//! whole attempt is retried with linear backoff while failures look
//! transient. Expected failures come back as a [`StageFailure`] value.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use deckgen_llm::{CompletionRequest, GenerationSettings, LlmClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StageConfig;
use crate::error::Result;
use crate::json::{extract_json, JsonSource};
use crate::model::{estimate_tokens, ContentChunk};
use crate::prompts;
use crate::retry::{classify_error, is_rate_limit, is_timeout, Backoff, ErrorClass};
use crate::schema::{describe_issues, OutputSchema, SchemaIssue};

/// Which stage is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Summary and topic extraction.
    StageA,
    /// Card generation.
    StageB,
    /// Condensing an oversized context.
    ContextSummary,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageId::StageA => "Stage A",
            StageId::StageB => "Stage B",
            StageId::ContextSummary => "context summary",
        };
        f.write_str(s)
    }
}

/// Why a stage call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageErrorType {
    InvalidLlmOutput,
    ApiError,
    Timeout,
    RateLimited,
    SchemaValidationFailed,
    InsufficientContext,
}

impl fmt::Display for StageErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageErrorType::InvalidLlmOutput => "INVALID_LLM_OUTPUT",
            StageErrorType::ApiError => "API_ERROR",
            StageErrorType::Timeout => "TIMEOUT",
            StageErrorType::RateLimited => "RATE_LIMITED",
            StageErrorType::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            StageErrorType::InsufficientContext => "INSUFFICIENT_CONTEXT",
        };
        f.write_str(s)
    }
}

/// Structured failure of a stage call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: StageId,
    pub error_type: StageErrorType,
    pub details: String,
    /// Generation calls made before giving up.
    pub attempt_count: u32,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}: {}",
            self.stage, self.attempt_count, self.error_type, self.details
        )
    }
}

/// Successful stage output.
#[derive(Debug, Clone)]
pub struct StageSuccess<T> {
    pub output: T,
    /// Generation calls made, including the successful one.
    pub attempts: u32,
    pub tokens_used: Option<u64>,
    pub warnings: Vec<String>,
    pub json_source: JsonSource,
    /// The output was salvaged by partial recovery.
    pub recovered: bool,
}

/// Result of a stage call.
pub type StageResult<T> = std::result::Result<StageSuccess<T>, StageFailure>;

/// One stage invocation.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: StageId,
    pub system_prompt: String,
    pub user_prompt: String,
    pub settings: GenerationSettings,
    /// Per-call deadline; the configured timeout when unset.
    pub deadline: Option<Duration>,
}

impl StageRequest {
    pub fn new(
        stage: StageId,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            stage,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            settings,
            deadline: None,
        }
    }

    /// Override the per-call deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Chunks to build stage prompts from.
#[derive(Debug, Clone)]
pub struct ContextFit {
    pub chunks: Vec<ContentChunk>,
    /// The input exceeded the budget and was replaced by summaries.
    pub condensed: bool,
    /// Generation calls spent on condensing.
    pub api_calls: u32,
}

#[derive(Debug)]
enum AttemptError {
    Client(String),
    Timeout(Duration),
    NoJson(String),
    Schema(Vec<SchemaIssue>),
}

impl AttemptError {
    fn class(&self) -> ErrorClass {
        match self {
            AttemptError::Client(message) => classify_error(message),
            AttemptError::Timeout(_) | AttemptError::NoJson(_) | AttemptError::Schema(_) => {
                ErrorClass::Transient
            }
        }
    }

    fn error_type(&self) -> StageErrorType {
        match self {
            AttemptError::Client(message) if is_rate_limit(message) => {
                StageErrorType::RateLimited
            }
            AttemptError::Client(message) if is_timeout(message) => StageErrorType::Timeout,
            AttemptError::Client(_) => StageErrorType::ApiError,
            AttemptError::Timeout(_) => StageErrorType::Timeout,
            AttemptError::NoJson(_) => StageErrorType::InvalidLlmOutput,
            AttemptError::Schema(_) => StageErrorType::SchemaValidationFailed,
        }
    }

    fn details(&self) -> String {
        match self {
            AttemptError::Client(message) => message.clone(),
            AttemptError::Timeout(deadline) => {
                format!("stage call timeout after {}ms", deadline.as_millis())
            }
            AttemptError::NoJson(message) => message.clone(),
            AttemptError::Schema(issues) => describe_issues(issues, 5),
        }
    }
}

struct AttemptOutput<T> {
    output: T,
    tokens_used: Option<u64>,
    json_source: JsonSource,
    warnings: Vec<String>,
    recovered: bool,
}

/// Invokes generation stages through an [`LlmClient`].
pub struct StageCaller {
    client: Arc<dyn LlmClient>,
    config: StageConfig,
    backoff: Backoff,
}

impl StageCaller {
    /// Create a stage caller, rejecting unusable configuration.
    pub fn new(client: Arc<dyn LlmClient>, config: StageConfig) -> Result<Self> {
        config.validate()?;
        let backoff = Backoff::linear(Duration::from_millis(config.base_delay_ms));
        Ok(Self {
            client,
            config,
            backoff,
        })
    }

    /// The stage configuration.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Call a stage and validate its output against `schema`.
    pub async fn call<S: OutputSchema>(
        &self,
        request: StageRequest,
        schema: &S,
    ) -> StageResult<S::Output> {
        let deadline = request.deadline.unwrap_or_else(|| self.default_deadline());
        let max_attempts = self.config.max_retries;
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            attempts += 1;
            debug!(
                "{} attempt {attempts}/{max_attempts} ({})",
                request.stage,
                schema.name()
            );

            match self.attempt(&request, schema, deadline).await {
                Ok(attempt) => {
                    info!(
                        "{} succeeded on attempt {attempts} via {:?}",
                        request.stage, attempt.json_source
                    );
                    return Ok(StageSuccess {
                        output: attempt.output,
                        attempts,
                        tokens_used: attempt.tokens_used,
                        warnings: attempt.warnings,
                        json_source: attempt.json_source,
                        recovered: attempt.recovered,
                    });
                }
                Err(err) => {
                    let class = err.class();
                    warn!(
                        "{} attempt {attempts}/{max_attempts} failed ({}, {class:?}): {}",
                        request.stage,
                        err.error_type(),
                        err.details()
                    );
                    last_error = Some(err);

                    if class == ErrorClass::Permanent {
                        break;
                    }
                    if attempts < max_attempts {
                        let delay = self.backoff.delay_after(attempts);
                        debug!("Backing off {}ms before retrying", delay.as_millis());
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let (error_type, details) = match last_error {
            Some(err) => (err.error_type(), err.details()),
            None => (
                StageErrorType::ApiError,
                "no attempt was made".to_string(),
            ),
        };

        Err(StageFailure {
            stage: request.stage,
            error_type,
            details,
            attempt_count: attempts,
        })
    }

    async fn attempt<S: OutputSchema>(
        &self,
        request: &StageRequest,
        schema: &S,
        deadline: Duration,
    ) -> std::result::Result<AttemptOutput<S::Output>, AttemptError> {
        let completion_request =
            CompletionRequest::new(&request.system_prompt, &request.user_prompt)
                .with_settings(request.settings.clone());

        let completion =
            match tokio::time::timeout(deadline, self.client.complete(completion_request)).await {
                Err(_) => return Err(AttemptError::Timeout(deadline)),
                Ok(Err(err)) => return Err(AttemptError::Client(err.to_string())),
                Ok(Ok(completion)) => completion,
            };

        let (value, json_source) =
            extract_json(&completion.text).map_err(|e| AttemptError::NoJson(e.to_string()))?;

        match schema.validate(&value) {
            Ok(output) => Ok(AttemptOutput {
                output,
                tokens_used: completion.tokens_used,
                json_source,
                warnings: Vec::new(),
                recovered: false,
            }),
            Err(issues) => match schema.recover(&value) {
                Some(recovered) => {
                    warn!(
                        "{} output failed {} validation ({}); recovered {} of {} items",
                        request.stage,
                        schema.name(),
                        describe_issues(&issues, 3),
                        recovered.kept,
                        recovered.total
                    );
                    Ok(AttemptOutput {
                        output: recovered.output,
                        tokens_used: completion.tokens_used,
                        json_source,
                        warnings: recovered.warnings,
                        recovered: true,
                    })
                }
                None => Err(AttemptError::Schema(issues)),
            },
        }
    }

    /// Keep the chunks fed to a stage within the configured token budget.
    ///
    /// Oversized input is split into two halves that are condensed
    /// concurrently; the two summaries replace the original chunks. A lone
    /// chunk is split within its text. Only text too short to cut goes
    /// through as a single part.
    pub async fn fit_context(
        &self,
        chunks: &[ContentChunk],
    ) -> std::result::Result<ContextFit, StageFailure> {
        if chunks.is_empty() {
            return Err(StageFailure {
                stage: StageId::ContextSummary,
                error_type: StageErrorType::InsufficientContext,
                details: "no chunks to build a context from".to_string(),
                attempt_count: 0,
            });
        }

        let total_tokens: usize = chunks.iter().map(ContentChunk::tokens).sum();
        if total_tokens <= self.config.context_token_budget {
            return Ok(ContextFit {
                chunks: chunks.to_vec(),
                condensed: false,
                api_calls: 0,
            });
        }

        info!(
            "Context of {total_tokens} tokens exceeds budget of {}, condensing",
            self.config.context_token_budget
        );

        let halves: Vec<Vec<ContentChunk>> = match chunks {
            [single] => match split_chunk(single) {
                Some((head, tail)) => vec![vec![head], vec![tail]],
                None => vec![vec![single.clone()]],
            },
            _ => chunks
                .chunks(chunks.len().div_ceil(2))
                .map(<[ContentChunk]>::to_vec)
                .collect(),
        };
        let parts = futures::future::join_all(
            halves
                .iter()
                .enumerate()
                .map(|(i, part)| self.condense_part(i + 1, part)),
        )
        .await;

        let api_calls = parts.len() as u32;
        let mut condensed = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Ok(chunk) => condensed.push(chunk),
                Err(mut failure) => {
                    failure.attempt_count = api_calls;
                    return Err(failure);
                }
            }
        }

        Ok(ContextFit {
            chunks: condensed,
            condensed: true,
            api_calls,
        })
    }

    async fn condense_part(
        &self,
        part: usize,
        chunks: &[ContentChunk],
    ) -> std::result::Result<ContentChunk, StageFailure> {
        let (system, user) = prompts::context_summary(part, chunks);
        let request = CompletionRequest::new(system, user)
            .with_settings(self.config.context_summary.clone());
        let deadline = self.default_deadline();

        let error = match tokio::time::timeout(deadline, self.client.complete(request)).await {
            Ok(Ok(completion)) if !completion.text.trim().is_empty() => {
                let chunk = ContentChunk::new(
                    format!("context_summary_{part}"),
                    "context-summary",
                    completion.text.trim(),
                )
                .with_heading(format!("Condensed context, part {part}"));
                return Ok(chunk);
            }
            Ok(Ok(_)) => AttemptError::NoJson("empty context summary".to_string()),
            Ok(Err(err)) => AttemptError::Client(err.to_string()),
            Err(_) => AttemptError::Timeout(deadline),
        };

        Err(StageFailure {
            stage: StageId::ContextSummary,
            error_type: error.error_type(),
            details: error.details(),
            attempt_count: 1,
        })
    }
}

/// Split a lone oversized chunk in two, preferring the sentence boundary
/// closest to the middle of its text. Both halves keep the chunk's id so
/// summaries still cite it.
fn split_chunk(chunk: &ContentChunk) -> Option<(ContentChunk, ContentChunk)> {
    let text = chunk.text.trim();
    let cut = split_point(text)?;
    let (head, tail) = (text[..cut].trim(), text[cut..].trim());
    if head.is_empty() || tail.is_empty() {
        return None;
    }

    let half = |part: &str| {
        let mut piece = chunk.clone();
        piece.text = part.to_string();
        piece.tokens_estimate = estimate_tokens(part);
        piece
    };
    Some((half(head), half(tail)))
}

fn split_point(text: &str) -> Option<usize> {
    let mid = text.len() / 2;
    let nearest = |cuts: Vec<usize>| {
        cuts.into_iter()
            .filter(|&i| i > 0 && i < text.len())
            .min_by_key(|&i| i.abs_diff(mid))
    };

    let mut prev = None;
    let sentence_ends: Vec<usize> = text
        .char_indices()
        .filter_map(|(i, c)| {
            let boundary = c.is_whitespace() && matches!(prev, Some('.' | '!' | '?'));
            prev = Some(c);
            boundary.then_some(i)
        })
        .collect();
    let word_gaps = || {
        text.char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .collect()
    };
    let char_bounds = || text.char_indices().map(|(i, _)| i).collect();

    nearest(sentence_ends)
        .or_else(|| nearest(word_gaps()))
        .or_else(|| nearest(char_bounds()))
}
