//! Configuration for the generation pipeline.
//!
//! Every field has a serde default so partial configuration files work.
//! Nothing here is read from the environment at call time; the whole
//! structure is handed to constructors.

use deckgen_llm::GenerationSettings;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, Result};
use crate::pipeline::PipelineSettings;
use crate::postprocess::PostProcessSettings;
use crate::verifier::VerifierOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckgenConfig {
    /// Stage-call behaviour.
    #[serde(default)]
    pub stage: StageConfig,

    /// Evidence verification.
    #[serde(default)]
    pub verifier: VerifierOptions,

    /// Post-processing.
    #[serde(default)]
    pub post_process: PostProcessSettings,

    /// Pipeline thresholds.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl DeckgenConfig {
    /// Set the stage configuration.
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stage = stage;
        self
    }

    /// Set the verifier options.
    pub fn with_verifier(mut self, verifier: VerifierOptions) -> Self {
        self.verifier = verifier;
        self
    }

    /// Set the post-processing settings.
    pub fn with_post_process(mut self, post_process: PostProcessSettings) -> Self {
        self.post_process = post_process;
        self
    }

    /// Set the pipeline settings.
    pub fn with_pipeline(mut self, pipeline: PipelineSettings) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// Configuration for stage calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Maximum attempts per stage call (including the first).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts; the wait after attempt `n` is `n × base`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Hard deadline for a single generation call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Token budget for the chunks fed to a stage before they are condensed.
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,

    /// Sampling settings for Stage A.
    #[serde(default = "default_stage_a_settings")]
    pub stage_a: GenerationSettings,

    /// Sampling settings for Stage B.
    #[serde(default = "default_stage_b_settings")]
    pub stage_b: GenerationSettings,

    /// Sampling settings for context condensation.
    #[serde(default = "default_context_summary_settings")]
    pub context_summary: GenerationSettings,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    90_000
}

fn default_context_token_budget() -> usize {
    24_000
}

fn default_stage_a_settings() -> GenerationSettings {
    GenerationSettings::default()
        .with_max_tokens(2_048)
        .with_json_mode(true)
}

fn default_stage_b_settings() -> GenerationSettings {
    GenerationSettings::default()
        .with_max_tokens(8_192)
        .with_json_mode(true)
}

fn default_context_summary_settings() -> GenerationSettings {
    GenerationSettings::default().with_max_tokens(1_024)
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_ms: default_timeout_ms(),
            context_token_budget: default_context_token_budget(),
            stage_a: default_stage_a_settings(),
            stage_b: default_stage_b_settings(),
            context_summary: default_context_summary_settings(),
        }
    }
}

impl StageConfig {
    /// Set the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base backoff delay.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the context token budget.
    pub fn with_context_token_budget(mut self, budget: usize) -> Self {
        self.context_token_budget = budget;
        self
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(DeckError::Config(
                "stage.max_retries must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(DeckError::Config(
                "stage.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.context_token_budget == 0 {
            return Err(DeckError::Config(
                "stage.context_token_budget must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
