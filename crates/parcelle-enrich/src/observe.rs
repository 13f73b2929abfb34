//! Loader wiring
//!
//! The UI observes a run through the progressive loader with one named task
//! wrapping the whole orchestrator call; per-operation granularity comes
//! from the result's own error and data fields, not from the loader.

use crate::orchestrator::EnrichmentOrchestrator;
use crate::result::EnrichmentResult;
use parcelle_loader::ProgressiveLoader;
use parcelle_model::ConversationId;
use std::sync::Arc;

/// Name of the single loader task driving an enrichment run.
pub const ENRICHMENT_TASK: &str = "enrichment";

/// Start an enrichment run observed through a progressive loader.
///
/// `refresh(ENRICHMENT_TASK)` re-invokes the orchestrator; abandoning the
/// loader only stops status updates, the run itself goes to completion.
#[must_use]
pub fn spawn_enrichment_loader(
    orchestrator: Arc<EnrichmentOrchestrator>,
    conversation_id: ConversationId,
) -> ProgressiveLoader<EnrichmentResult> {
    let loader = ProgressiveLoader::new();
    loader.register(ENRICHMENT_TASK, move || {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            orchestrator
                .enrich(conversation_id)
                .await
                .map_err(|error| error.to_string())
        }
    });
    loader.start();
    loader
}
