//! Provider selection.
//!
//! The provider is a closed set of variants resolved once into a trait
//! object; call sites never branch on the provider again.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anthropic::AnthropicClient;
use crate::client::LlmClient;
use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;

/// Which generation provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions (or any compatible server via `base_url`).
    #[serde(rename = "openai")]
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
}

impl ProviderKind {
    /// Environment variable consulted for the API key when none is set.
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

/// Configuration for the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which provider to use.
    pub kind: ProviderKind,

    /// Default model for this provider.
    #[serde(default)]
    pub model: Option<String>,

    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Transport-level request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ProviderKind::OpenAI)
    }
}

impl ProviderConfig {
    /// Create a configuration for the given provider.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model: None,
            base_url: None,
            api_key_env: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API key directly.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let var = self
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_key_env());
        std::env::var(var)
            .map_err(|_| LlmError::ProviderNotConfigured(format!("environment variable {var} is not set")))
    }
}

/// Build the configured client.
pub fn build_client(config: &ProviderConfig) -> Result<Arc<dyn LlmClient>> {
    let api_key = config.resolve_api_key()?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    let client: Arc<dyn LlmClient> = match config.kind {
        ProviderKind::OpenAI => {
            let mut client = OpenAiClient::new()
                .with_api_key(api_key)
                .with_http_client(http);
            if let Some(model) = &config.model {
                client = client.with_model(model);
            }
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        ProviderKind::Anthropic => {
            let mut client = AnthropicClient::new()
                .with_api_key(api_key)
                .with_http_client(http);
            if let Some(model) = &config.model {
                client = client.with_model(model);
            }
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
    };

    info!("Using generation provider: {}", client.name());
    Ok(client)
}
