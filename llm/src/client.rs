//! The provider-agnostic generation interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling settings for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Model override; providers fall back to their default model.
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Ask the provider for a JSON object response when it supports it.
    #[serde(default)]
    pub json_mode: bool,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            json_mode: false,
        }
    }
}

impl GenerationSettings {
    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Request JSON output.
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt.
    pub system_prompt: String,

    /// User prompt.
    pub user_prompt: String,

    /// Sampling settings.
    pub settings: GenerationSettings,
}

impl CompletionRequest {
    /// Create a new request with default settings.
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            settings: GenerationSettings::default(),
        }
    }

    /// Replace the sampling settings.
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Raw model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Free-form text returned by the model.
    pub text: String,

    /// Token usage (if reported by the provider).
    pub tokens_used: Option<u64>,
}

impl Completion {
    /// Create a completion without usage information.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_used: None,
        }
    }
}

/// Trait for generation providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Run one generation call.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
