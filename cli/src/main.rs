//! `deckgen`: generate verified flashcard decks for course modules.
//!
//! Chunks are read from `<chunks_dir>/<module_id>.json`, decks are written
//! to `<decks_dir>`, and modules without enough material are appended to the
//! content-request queue. One `ModuleResult` JSON document is printed per
//! module, in argument order; logs go to stderr.

mod args;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use deckgen_core::{run_batch, DeckStore, ModulePipeline, ModuleStatus};
use deckgen_llm::build_client;
use deckgen_store::{FallbackDeckStore, FileChunkRetriever, FileContentQueue, FileDeckStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(&cli)?;

    let client = build_client(&settings.provider).context("failed to set up the provider")?;
    info!("Using {} provider", client.name());

    let primary = FileDeckStore::new(&settings.paths.decks_dir)
        .await
        .context("failed to open deck store")?;
    info!("Writing decks to {}", primary.root().display());
    let store: Arc<dyn DeckStore> = match &settings.paths.fallback_decks_dir {
        Some(dir) => {
            let fallback = FileDeckStore::new(dir)
                .await
                .context("failed to open fallback deck store")?;
            Arc::new(FallbackDeckStore::new(Arc::new(primary), Arc::new(fallback)))
        }
        None => Arc::new(primary),
    };

    let pipeline = ModulePipeline::builder()
        .config(settings.pipeline)
        .client(client)
        .retriever(Arc::new(FileChunkRetriever::new(&settings.paths.chunks_dir)))
        .store(store)
        .queue(Arc::new(FileContentQueue::new(&settings.paths.queue_file)))
        .build()?;

    let results = run_batch(&pipeline, &cli.modules, cli.concurrency).await;

    let mut failed = 0;
    for result in &results {
        println!("{}", serde_json::to_string_pretty(result)?);
        if result.status == ModuleStatus::Failed {
            failed += 1;
        }
    }

    if failed > 0 {
        info!("{failed} module(s) failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
