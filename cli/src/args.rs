//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use deckgen_llm::ProviderKind;

/// Generation provider selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Openai,
    Anthropic,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => ProviderKind::OpenAI,
            ProviderArg::Anthropic => ProviderKind::Anthropic,
        }
    }
}

/// Generate verified flashcard decks for course modules.
#[derive(Parser, Debug, Clone)]
#[command(name = "deckgen", version, about)]
pub struct Cli {
    /// Module ids to generate decks for
    #[arg(required = true)]
    pub modules: Vec<String>,

    /// TOML configuration file
    #[arg(long, short, env = "DECKGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generation provider; overrides the config file
    #[arg(long, env = "DECKGEN_PROVIDER", value_enum)]
    pub provider: Option<ProviderArg>,

    /// Model name; overrides the config file
    #[arg(long, env = "DECKGEN_MODEL")]
    pub model: Option<String>,

    /// Directory holding `<module_id>.json` chunk files
    #[arg(long, env = "DECKGEN_CHUNKS_DIR")]
    pub chunks_dir: Option<PathBuf>,

    /// Directory decks are written to
    #[arg(long, env = "DECKGEN_DECKS_DIR")]
    pub decks_dir: Option<PathBuf>,

    /// Secondary deck directory used when the primary cannot be written
    #[arg(long, env = "DECKGEN_FALLBACK_DECKS_DIR")]
    pub fallback_decks_dir: Option<PathBuf>,

    /// JSON-lines file receiving content requests
    #[arg(long, env = "DECKGEN_QUEUE_FILE")]
    pub queue_file: Option<PathBuf>,

    /// Modules processed at the same time
    #[arg(long, env = "DECKGEN_CONCURRENCY", default_value_t = 2)]
    pub concurrency: usize,

    /// Cards requested per module; overrides the config file
    #[arg(long)]
    pub target_cards: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_modules_and_overrides() {
        let cli = Cli::try_parse_from([
            "deckgen",
            "101",
            "102",
            "--provider",
            "anthropic",
            "--concurrency",
            "4",
            "--target-cards",
            "12",
        ])
        .unwrap();

        assert_eq!(cli.modules, vec!["101", "102"]);
        assert_eq!(cli.provider, Some(ProviderArg::Anthropic));
        assert_eq!(cli.concurrency, 4);
        assert_eq!(cli.target_cards, Some(12));
    }

    #[test]
    fn test_requires_a_module() {
        assert!(Cli::try_parse_from(["deckgen"]).is_err());
    }
}
