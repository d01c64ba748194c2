//! Configuration file loading and command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use deckgen_core::DeckgenConfig;
use deckgen_llm::ProviderConfig;
use serde::{Deserialize, Serialize};

use crate::args::Cli;

/// Where collaborators read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_chunks_dir")]
    pub chunks_dir: PathBuf,

    #[serde(default = "default_decks_dir")]
    pub decks_dir: PathBuf,

    #[serde(default)]
    pub fallback_decks_dir: Option<PathBuf>,

    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,
}

fn default_chunks_dir() -> PathBuf {
    PathBuf::from("chunks")
}

fn default_decks_dir() -> PathBuf {
    PathBuf::from("decks")
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("content-requests.jsonl")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            chunks_dir: default_chunks_dir(),
            decks_dir: default_decks_dir(),
            fallback_decks_dir: None,
            queue_file: default_queue_file(),
        }
    }
}

/// Everything the runner needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(flatten)]
    pub pipeline: DeckgenConfig,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load the configured file, if any, and apply command-line overrides.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply(cli);
        Ok(settings)
    }

    fn apply(&mut self, cli: &Cli) {
        if let Some(provider) = cli.provider {
            self.provider.kind = provider.into();
        }
        if let Some(model) = &cli.model {
            self.provider.model = Some(model.clone());
        }
        if let Some(dir) = &cli.chunks_dir {
            self.paths.chunks_dir.clone_from(dir);
        }
        if let Some(dir) = &cli.decks_dir {
            self.paths.decks_dir.clone_from(dir);
        }
        if let Some(dir) = &cli.fallback_decks_dir {
            self.paths.fallback_decks_dir = Some(dir.clone());
        }
        if let Some(file) = &cli.queue_file {
            self.paths.queue_file.clone_from(file);
        }
        if let Some(target) = cli.target_cards {
            self.pipeline.pipeline.target_cards = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use deckgen_llm::ProviderKind;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[provider]
kind = "anthropic"
model = "claude-sonnet-4-5"

[paths]
chunks_dir = "data/chunks"

[stage]
max_retries = 5

[verifier]
min_similarity = 0.6

[pipeline]
target_cards = 15
"#;

    #[test]
    fn test_parses_partial_toml() {
        let settings = Settings::from_toml(SAMPLE).unwrap();

        assert_eq!(settings.provider.kind, ProviderKind::Anthropic);
        assert_eq!(settings.paths.chunks_dir, PathBuf::from("data/chunks"));
        assert_eq!(settings.paths.decks_dir, PathBuf::from("decks"));
        assert_eq!(settings.pipeline.stage.max_retries, 5);
        assert_eq!(settings.pipeline.stage.base_delay_ms, 1_000);
        assert_eq!(settings.pipeline.verifier.min_similarity, 0.6);
        assert_eq!(settings.pipeline.pipeline.target_cards, 15);
        assert_eq!(settings.pipeline.pipeline.min_chunks, 4);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.provider.kind, ProviderKind::OpenAI);
        assert_eq!(settings.paths, PathsConfig::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deckgen.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let cli = Cli::try_parse_from([
            "deckgen",
            "101",
            "--config",
            path.to_str().unwrap(),
            "--provider",
            "openai",
            "--decks-dir",
            "out",
            "--target-cards",
            "8",
        ])
        .unwrap();
        let settings = Settings::resolve(&cli).unwrap();

        assert_eq!(settings.provider.kind, ProviderKind::OpenAI);
        assert_eq!(settings.provider.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(settings.paths.decks_dir, PathBuf::from("out"));
        assert_eq!(settings.pipeline.pipeline.target_cards, 8);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let cli = Cli::try_parse_from(["deckgen", "101", "--config", "/nonexistent/deckgen.toml"])
            .unwrap();
        assert!(Settings::resolve(&cli).is_err());
    }
}
