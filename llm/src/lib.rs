//! # LLM clients
//!
//! Provider-agnostic access to text generation models.
//!
//! The pipeline only ever sees the [`LlmClient`] trait. A concrete provider
//! is chosen once, at construction time, from a [`ProviderConfig`]; nothing
//! downstream re-inspects which provider it is talking to.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        LLM Clients                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ProviderConfig ──► build_client ──► Arc<dyn LlmClient>         │
//! │                          │                                      │
//! │                          ▼                                      │
//! │          OpenAiClient / AnthropicClient / ScriptedClient        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod anthropic;
pub mod client;
pub mod error;
pub mod openai;
pub mod provider;
pub mod scripted;

pub use anthropic::AnthropicClient;
pub use client::{Completion, CompletionRequest, GenerationSettings, LlmClient};
pub use error::{LlmError, Result};
pub use openai::OpenAiClient;
pub use provider::{build_client, ProviderConfig, ProviderKind};
pub use scripted::{ScriptedClient, ScriptedReply};
