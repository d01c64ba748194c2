//! Running the pipeline over several modules.

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::model::{ModuleResult, ModuleStatus};
use crate::pipeline::ModulePipeline;

/// Run `pipeline` for every module id with at most `concurrency` runs in
/// flight. Results come back in input order.
pub async fn run_batch(
    pipeline: &ModulePipeline,
    module_ids: &[String],
    concurrency: usize,
) -> Vec<ModuleResult> {
    info!(
        "Running {} module(s) with concurrency {}, targeting {} card(s) each",
        module_ids.len(),
        concurrency.max(1),
        pipeline.settings().target_cards
    );

    let results: Vec<ModuleResult> = stream::iter(module_ids)
        .map(|module_id| pipeline.run(module_id))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let succeeded = results
        .iter()
        .filter(|r| matches!(r.status, ModuleStatus::Success | ModuleStatus::Partial))
        .count();
    info!("Batch finished: {succeeded}/{} module(s) produced a deck", results.len());

    results
}
