//! End-to-end enrichment scenarios against the in-memory store and seeded
//! geodata fixtures.

use async_trait::async_trait;
use parcelle_enrich::{
    spawn_enrichment_loader, EnrichmentOrchestrator, EnrichmentProgress, Op, ProgressHook,
    ENRICHMENT_TASK,
};
use parcelle_geodata::{
    DocumentFeature, GeoDataClient, GeoDataError, MunicipalityFeature, StaticGeoData, ZoneFeature,
};
use parcelle_loader::TaskState;
use parcelle_model::{
    collections, Branch, Conversation, EnrichmentStatus, Geometry, ZoningKind,
};
use parcelle_store::{MemoryStore, RecordStore};
use parcelle_test_utils as fixtures;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(
    geodata: impl GeoDataClient + 'static,
) -> (Arc<MemoryStore>, Arc<EnrichmentOrchestrator>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(EnrichmentOrchestrator::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::new(geodata),
    ));
    (store, orchestrator)
}

async fn load_conversation(
    store: &MemoryStore,
    id: parcelle_model::ConversationId,
) -> Conversation {
    store
        .get_by_id(collections::CONVERSATIONS, id.record())
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap()
}

/// Counts municipality fetches so cache hits are observable.
struct CountingGeoData {
    inner: StaticGeoData,
    municipality_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl GeoDataClient for CountingGeoData {
    async fn zoning_at(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> Result<Vec<ZoneFeature>, GeoDataError> {
        self.inner.zoning_at(longitude, latitude).await
    }

    async fn municipality(
        &self,
        insee_code: &str,
    ) -> Result<Option<MunicipalityFeature>, GeoDataError> {
        self.municipality_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.municipality(insee_code).await
    }

    async fn documents(&self, insee_code: &str) -> Result<Vec<DocumentFeature>, GeoDataError> {
        self.inner.documents(insee_code).await
    }
}

#[tokio::test]
async fn non_rnu_source_scenario_resolves_source_branch() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let result = orchestrator.enrich(conversation_id).await.unwrap();

    assert_eq!(result.branch, Branch::NonRnuSource);
    assert!(!result.has_analysis);
    assert!(!result.is_rnu);
    assert!(result.errors.is_empty());
    assert_eq!(result.map_geometry, Some(fixtures::sample_geometry()));
    assert!(result.city_id.is_some());
    assert!(result.zoning_id.is_some());
    assert!(result.zone_id.is_some());

    let document = result.document.as_ref().unwrap();
    assert!(!document.has_analysis);
    assert_eq!(document.source_url.as_deref(), Some(fixtures::SOURCE_PLU_URL));

    // Placeholder document row persisted and linked to both parents.
    assert_eq!(store.count(collections::DOCUMENTS), 1);
    assert_eq!(store.count(collections::CONVERSATION_DOCUMENTS), 1);
    assert_eq!(store.count(collections::PROJECT_DOCUMENTS), 1);

    // Conversation mirror for fast reads.
    let conversation = load_conversation(&store, conversation_id).await;
    assert_eq!(conversation.enrichment_status, EnrichmentStatus::Completed);
    assert_eq!(conversation.branch_type, Branch::NonRnuSource);
    assert!(!conversation.has_analysis);
    assert_eq!(conversation.primary_document_id, Some(document.document_id));
    assert!(conversation.project_id.is_some());

    let metadata = conversation.document_metadata.unwrap();
    assert_eq!(metadata.zone_code.as_deref(), Some(fixtures::UC_ZONE));
    assert_eq!(metadata.city_name.as_deref(), Some("Paris"));
    assert!(metadata.has_geometry);

    let snapshot = conversation.context_metadata.enrichment.unwrap();
    assert_eq!(snapshot.branch, Branch::NonRnuSource);
    assert_eq!(snapshot.zone_id, result.zone_id);
}

#[tokio::test]
async fn rnu_scenario_skips_zone_and_document_work() {
    let (store, orchestrator) = setup(fixtures::geodata_rnu("31580"));
    let conversation_id =
        fixtures::seed_conversation(&store, "31580", 1.0737, 43.3127).await;

    let result = orchestrator.enrich(conversation_id).await.unwrap();

    assert_eq!(result.branch, Branch::Rnu);
    assert!(result.is_rnu);
    assert!(result.map_geometry.is_none());
    assert!(result.document.is_none());
    assert!(result.errors.is_empty());
    assert!(result.zone_id.is_none());
    assert!(result.zoning_id.is_none());

    // Zone/zoning/document tasks never ran.
    assert!(!result.timings.contains_key(&Op::ZoningLookup));
    assert!(!result.timings.contains_key(&Op::Zone));
    assert!(!result.timings.contains_key(&Op::Document));
    assert_eq!(store.count(collections::ZONINGS), 0);
    assert_eq!(store.count(collections::ZONES), 0);
    assert_eq!(store.count(collections::DOCUMENTS), 0);
    assert_eq!(store.count(collections::MUNICIPALITIES), 1);

    let conversation = load_conversation(&store, conversation_id).await;
    assert_eq!(conversation.enrichment_status, EnrichmentStatus::Completed);
    assert_eq!(conversation.branch_type, Branch::Rnu);
    assert!(conversation.is_rnu);

    // The research snapshot carries the synthetic RNU zoning marker.
    let entry = orchestrator
        .research_entry(conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.branch, Branch::Rnu);
    assert_eq!(entry.zoning_kind, Some(ZoningKind::Rnu));
    assert!(entry.is_rnu);
}

#[tokio::test]
async fn sequential_re_enrichment_creates_no_duplicates() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let first = orchestrator.enrich(conversation_id).await.unwrap();
    let second = orchestrator.enrich(conversation_id).await.unwrap();

    assert_eq!(first.branch, second.branch);
    assert_eq!(first.zone_id, second.zone_id);

    assert_eq!(store.count(collections::PROJECTS), 1);
    assert_eq!(store.count(collections::RESEARCH_HISTORY), 1);
    assert_eq!(store.count(collections::MUNICIPALITIES), 1);
    assert_eq!(store.count(collections::ZONINGS), 1);
    assert_eq!(store.count(collections::ZONES), 1);
    assert_eq!(store.count(collections::DOCUMENTS), 1);
    assert_eq!(store.count(collections::CONVERSATION_DOCUMENTS), 1);
    assert_eq!(store.count(collections::PROJECT_DOCUMENTS), 1);
}

#[tokio::test]
async fn existing_analysis_document_wins_over_source_lookup() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let first = orchestrator.enrich(conversation_id).await.unwrap();
    let document_id = first.document.unwrap().document_id;

    // An analysis lands on the stored document between runs.
    store
        .update(
            collections::DOCUMENTS,
            document_id.record(),
            json!({"html_content": "<article>Règlement de la zone Uc</article>"}),
        )
        .await
        .unwrap();

    let second = orchestrator.enrich(conversation_id).await.unwrap();

    assert_eq!(second.branch, Branch::NonRnuAnalysis);
    assert!(second.has_analysis);
    let document = second.document.unwrap();
    assert_eq!(document.document_id, document_id);
    assert!(document.html_content.unwrap().contains("Règlement"));

    let conversation = load_conversation(&store, conversation_id).await;
    assert_eq!(conversation.branch_type, Branch::NonRnuAnalysis);
    assert!(conversation.has_analysis);
    assert_eq!(conversation.primary_document_id, Some(document_id));
}

#[tokio::test]
async fn missing_document_listing_is_a_completed_run() {
    let geodata = StaticGeoData::new()
        .with_municipality(fixtures::paris_municipality())
        .with_zone(fixtures::uc_zone_feature());
    let (store, orchestrator) = setup(geodata);
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let result = orchestrator.enrich(conversation_id).await.unwrap();

    assert_eq!(result.branch, Branch::NonRnuSource);
    assert!(result.document.is_none());
    assert!(result.errors.is_empty());
    assert_eq!(store.count(collections::DOCUMENTS), 0);

    let conversation = load_conversation(&store, conversation_id).await;
    assert_eq!(conversation.enrichment_status, EnrichmentStatus::Completed);
    assert!(conversation.primary_document_id.is_none());
}

#[tokio::test]
async fn research_entry_records_the_resolved_snapshot() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let result = orchestrator.enrich(conversation_id).await.unwrap();
    let entry = orchestrator
        .research_entry(conversation_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.conversation_id, conversation_id);
    assert_eq!(entry.municipality_name.as_deref(), Some("Paris"));
    assert_eq!(entry.branch, Branch::NonRnuSource);
    assert_eq!(entry.zoning_kind, Some(ZoningKind::Urban));
    assert_eq!(entry.city_id, result.city_id);
    assert_eq!(entry.zone_id, result.zone_id);
    assert_eq!(entry.primary_document_id, result.document.map(|d| d.document_id));
    assert!(!entry.documents_found.is_empty());
}

#[tokio::test]
async fn enrich_or_cached_serves_the_cache_without_refetching() {
    let calls = Arc::new(AtomicUsize::new(0));
    let geodata = CountingGeoData {
        inner: fixtures::geodata_non_rnu(),
        municipality_calls: Arc::clone(&calls),
    };
    let (store, orchestrator) = setup(geodata);
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    orchestrator.enrich(conversation_id).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let cached = orchestrator.enrich_or_cached(conversation_id).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cached.branch, Branch::NonRnuSource);
}

#[tokio::test]
async fn persisted_snapshot_is_honored_across_orchestrators() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let geodata: Arc<dyn GeoDataClient> = Arc::new(CountingGeoData {
        inner: fixtures::geodata_non_rnu(),
        municipality_calls: Arc::clone(&calls),
    });
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let first = EnrichmentOrchestrator::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&geodata),
    );
    let original = first.enrich(conversation_id).await.unwrap();

    // A fresh orchestrator has an empty in-process cache; the snapshot
    // persisted on the conversation still short-circuits the re-run.
    let second = EnrichmentOrchestrator::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&geodata),
    );
    let replayed = second.enrich_or_cached(conversation_id).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(replayed.branch, original.branch);
    assert_eq!(replayed.zone_id, original.zone_id);
}

#[tokio::test]
async fn map_falls_back_to_persisted_zone_geometry() {
    let store = Arc::new(MemoryStore::new());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    // First run persists the zone outline.
    let first = EnrichmentOrchestrator::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::new(fixtures::geodata_non_rnu()),
    );
    first.enrich(conversation_id).await.unwrap();

    // The provider stops returning geometry; the zone row still has it.
    let degraded = StaticGeoData::new()
        .with_municipality(fixtures::paris_municipality())
        .with_zone(fixtures::zone_feature_without_geometry(fixtures::UC_ZONE))
        .with_documents(fixtures::PARIS_INSEE, vec![fixtures::source_document_feature()]);
    let second = EnrichmentOrchestrator::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::new(degraded),
    );
    let result = second.enrich(conversation_id).await.unwrap();

    assert_eq!(result.map_geometry, Some(fixtures::sample_geometry()));
}

#[tokio::test]
async fn progress_hook_streams_geometry_during_the_run() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let seen: Arc<Mutex<Vec<Geometry>>> = Arc::new(Mutex::new(Vec::new()));
    let hook: ProgressHook = {
        let seen = Arc::clone(&seen);
        Arc::new(move |update| {
            let EnrichmentProgress::Geometry(geometry) = update;
            seen.lock().unwrap().push(geometry);
        })
    };

    let result = orchestrator
        .enrich_with_progress(conversation_id, Some(hook))
        .await
        .unwrap();

    assert_eq!(result.map_geometry, Some(fixtures::sample_geometry()));
    assert_eq!(*seen.lock().unwrap(), vec![fixtures::sample_geometry()]);
}

#[tokio::test]
async fn loader_observes_the_single_enrichment_task() {
    let (store, orchestrator) = setup(fixtures::geodata_non_rnu());
    let conversation_id = fixtures::seed_conversation(
        &store,
        fixtures::PARIS_INSEE,
        fixtures::PARIS_LON,
        fixtures::PARIS_LAT,
    )
    .await;

    let loader = spawn_enrichment_loader(Arc::clone(&orchestrator), conversation_id);
    loader.wait_all().await;

    match loader.state(ENRICHMENT_TASK).unwrap() {
        TaskState::Success(result) => assert_eq!(result.branch, Branch::NonRnuSource),
        other => panic!("unexpected loader state: {other:?}"),
    }
    assert!(loader.is_all_complete());

    // Manual retry re-runs the orchestrator; idempotence keeps the outcome.
    assert!(loader.refresh(ENRICHMENT_TASK));
    loader.wait_all().await;
    match loader.state(ENRICHMENT_TASK).unwrap() {
        TaskState::Success(result) => assert_eq!(result.branch, Branch::NonRnuSource),
        other => panic!("unexpected loader state after refresh: {other:?}"),
    }
    assert_eq!(store.count(collections::DOCUMENTS), 1);
}
