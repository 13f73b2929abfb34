//! Enrichment orchestrator
//!
//! Resolves a conversation (address + coordinates) into a municipality, a
//! zoning classification, a regulatory document and map geometry. The run
//! has one sequential gating prefix (load conversation, municipality fetch,
//! zone-list fetch when not RNU) followed by a dependency-ordered task
//! graph:
//!
//! ```text
//! city -> zoning -> zone -> document
//!                     \
//!                      -> map (concurrent; bounded wait on the zone id)
//! ```
//!
//! Dependent tasks never abort their siblings; each one's failure lands in
//! the result's error map and the run still completes with partial data.
//! Every persistence step is a get-or-create or upsert on a natural key, so
//! re-running is safe; overlapping runs on the same conversation are
//! rejected by an in-flight guard instead of raced.

use crate::analytics::{AnalyticsSink, EnrichmentEvent, TracingAnalytics};
use crate::cache::{self, ConversationCache};
use crate::error::EnrichError;
use crate::result::{DocumentData, EnrichmentProgress, EnrichmentResult, Op};
use chrono::Utc;
use dashmap::DashMap;
use parcelle_geodata::{GeoDataClient, MunicipalityFeature, ZoneFeature};
use parcelle_model::{
    classify, collections, ArtifactHydration, ArtifactState, Branch, CityId, Conversation,
    ConversationId, Document, DocumentId, DocumentMetadata, EnrichmentSnapshot, EnrichmentStatus,
    Geometry, HydrationStatus, ProjectId, ProjectStatus, ResearchEntryId, ResearchHistoryEntry,
    Zone, ZoneId, ZoningId, ZoningKind,
};
use parcelle_store::{Filter, RecordStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Callback invoked with incremental updates while a run is in flight.
pub type ProgressHook = Arc<dyn Fn(EnrichmentProgress) + Send + Sync>;

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// How long the map task waits for the zone id before proceeding
    /// without geometry. Fails open, never errors.
    pub zone_wait: Duration,
    /// Capacity of the in-process result cache.
    pub cache_capacity: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            zone_wait: Duration::from_secs(3),
            cache_capacity: 10_000,
        }
    }
}

/// Output of one dependent task: value or failure message, plus elapsed
/// wall-clock time. Tasks own their slot; the orchestrator merges them
/// after everything settles.
struct TaskOutput<T> {
    value: Result<T, String>,
    elapsed: Duration,
}

/// Settled outputs of the city -> zoning -> zone -> document chain.
/// `None` slots were skipped (RNU path).
struct ChainOutput {
    city: TaskOutput<CityId>,
    zoning: Option<TaskOutput<ZoningId>>,
    zone: Option<TaskOutput<ZoneId>>,
    document: Option<TaskOutput<Option<DocumentData>>>,
}

/// Required geocoding inputs pulled out of the conversation's metadata.
#[derive(Debug, Clone)]
struct GeocodeInputs {
    insee_code: String,
    longitude: f64,
    latitude: f64,
    address: Option<String>,
    city_hint: Option<String>,
}

impl GeocodeInputs {
    fn extract(conversation: &Conversation) -> Result<Self, EnrichError> {
        let meta = &conversation.context_metadata;
        Ok(Self {
            insee_code: meta
                .insee_code
                .clone()
                .ok_or(EnrichError::MissingInput("insee_code"))?,
            longitude: meta.longitude.ok_or(EnrichError::MissingInput("longitude"))?,
            latitude: meta.latitude.ok_or(EnrichError::MissingInput("latitude"))?,
            address: meta.address.clone(),
            city_hint: meta.city_name.clone(),
        })
    }
}

/// Removes the conversation from the in-flight registry when the run ends,
/// whatever the outcome.
struct InFlightGuard<'a> {
    registry: &'a DashMap<ConversationId, ()>,
    id: ConversationId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        registry: &'a DashMap<ConversationId, ()>,
        id: ConversationId,
    ) -> Result<Self, EnrichError> {
        match registry.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EnrichError::AlreadyInFlight(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Self { registry, id })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// The enrichment engine.
pub struct EnrichmentOrchestrator {
    store: Arc<dyn RecordStore>,
    geodata: Arc<dyn GeoDataClient>,
    cache: ConversationCache,
    analytics: Arc<dyn AnalyticsSink>,
    in_flight: DashMap<ConversationId, ()>,
    config: EnrichConfig,
}

impl EnrichmentOrchestrator {
    /// Orchestrator with default config and tracing analytics.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, geodata: Arc<dyn GeoDataClient>) -> Self {
        let config = EnrichConfig::default();
        Self {
            store,
            geodata,
            cache: ConversationCache::new(config.cache_capacity),
            analytics: Arc::new(TracingAnalytics),
            in_flight: DashMap::new(),
            config,
        }
    }

    /// Replace the analytics sink.
    #[must_use]
    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    /// Replace the config (rebuilds the cache with the new capacity).
    #[must_use]
    pub fn with_config(mut self, config: EnrichConfig) -> Self {
        self.cache = ConversationCache::new(config.cache_capacity);
        self.config = config;
        self
    }

    /// The result cache.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    /// Run enrichment for a conversation.
    ///
    /// Safe to call again after completion (get-or-create at every
    /// persistence step); a call overlapping an in-flight run for the same
    /// conversation is rejected with [`EnrichError::AlreadyInFlight`].
    ///
    /// # Errors
    /// Precondition and gating failures only; dependent-task failures are
    /// recorded in the result's error map instead.
    pub async fn enrich(
        &self,
        conversation_id: ConversationId,
    ) -> Result<EnrichmentResult, EnrichError> {
        self.enrich_with_progress(conversation_id, None).await
    }

    /// Like [`Self::enrich`], streaming incremental updates (map geometry)
    /// through the hook as soon as they are known.
    pub async fn enrich_with_progress(
        &self,
        conversation_id: ConversationId,
        progress: Option<ProgressHook>,
    ) -> Result<EnrichmentResult, EnrichError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, conversation_id)?;

        match self.run(conversation_id, progress).await {
            Ok(result) => Ok(result),
            Err(error) => {
                tracing::error!(conversation = %conversation_id, %error, "enrichment aborted");
                self.mark_failed(conversation_id).await;
                Err(error)
            }
        }
    }

    /// Serve a fresh cached result when one exists, otherwise enrich.
    ///
    /// Checks the in-process cache first, then the snapshot persisted in the
    /// conversation's own metadata (valid for seven days from `cached_at`).
    pub async fn enrich_or_cached(
        &self,
        conversation_id: ConversationId,
    ) -> Result<EnrichmentResult, EnrichError> {
        if let Some(hit) = self.cache.get(&conversation_id).await {
            tracing::debug!(conversation = %conversation_id, "enrichment cache hit");
            return Ok(hit);
        }

        if let Ok(Some(record)) = self
            .store
            .get_by_id(collections::CONVERSATIONS, conversation_id.record())
            .await
        {
            if let Ok(conversation) = record.decode::<Conversation>() {
                if conversation.enrichment_status == EnrichmentStatus::Completed {
                    if let Some(snapshot) = conversation.context_metadata.enrichment.clone() {
                        if cache::is_fresh(snapshot.cached_at, Utc::now()) {
                            tracing::debug!(conversation = %conversation_id, "persisted snapshot hit");
                            let result = result_from_snapshot(&conversation, &snapshot);
                            self.cache.insert(conversation_id, result.clone()).await;
                            return Ok(result);
                        }
                    }
                }
            }
        }

        self.enrich(conversation_id).await
    }

    /// The durable research-history entry for a conversation, if one exists.
    /// The UI falls back to it while the conversation's own fields are still
    /// pending.
    pub async fn research_entry(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ResearchHistoryEntry>, EnrichError> {
        let record = self
            .store
            .get(
                collections::RESEARCH_HISTORY,
                &Filter::by("conversation_id", conversation_id.to_string()),
            )
            .await?;
        match record {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    async fn run(
        &self,
        conversation_id: ConversationId,
        progress: Option<ProgressHook>,
    ) -> Result<EnrichmentResult, EnrichError> {
        let run_started = Instant::now();
        let mut gate_timings: HashMap<Op, Duration> = HashMap::new();

        // Step 1: load the conversation and mark the run started.
        let record = self
            .store
            .get_by_id(collections::CONVERSATIONS, conversation_id.record())
            .await?
            .ok_or(EnrichError::ConversationNotFound(conversation_id))?;
        let conversation: Conversation = record.decode()?;
        self.store
            .update(
                collections::CONVERSATIONS,
                conversation_id.record(),
                json!({
                    "enrichment_status": EnrichmentStatus::InProgress,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;

        // Step 2: required geocoding inputs.
        let inputs = GeocodeInputs::extract(&conversation)?;
        tracing::info!(
            conversation = %conversation_id,
            insee = %inputs.insee_code,
            "enrichment started"
        );

        // Step 3: project and research entry exist before any derived state
        // is written.
        let project_id = self.ensure_project(&conversation, &inputs).await?;
        let research_id = self
            .ensure_research_entry(conversation_id, &inputs)
            .await?;

        // Step 4: gating municipality fetch. Nothing downstream can run
        // without knowing the RNU status.
        let started = Instant::now();
        let municipality = self.geodata.municipality(&inputs.insee_code).await;
        gate_timings.insert(Op::Municipality, started.elapsed());
        let municipality = match municipality {
            Ok(Some(found)) => found,
            Ok(None) => {
                self.record_abort(conversation_id, gate_timings, run_started);
                return Err(EnrichError::MunicipalityNotFound(inputs.insee_code));
            }
            Err(error) => {
                self.record_abort(conversation_id, gate_timings, run_started);
                return Err(EnrichError::MunicipalityLookup(error));
            }
        };
        let is_rnu = municipality.is_rnu;
        tracing::debug!(name = %municipality.name, is_rnu, "municipality resolved");

        // Steps 5-6: zone-list fetch, gating on the non-RNU path. The first
        // feature in provider order is authoritative; ties are not re-sorted.
        let zone_feature: Option<ZoneFeature> = if is_rnu {
            None
        } else {
            let started = Instant::now();
            let outcome = self.geodata.zoning_at(inputs.longitude, inputs.latitude).await;
            gate_timings.insert(Op::ZoningLookup, started.elapsed());
            match outcome {
                Ok(features) => match features.into_iter().next() {
                    Some(feature) => Some(feature),
                    None => {
                        self.record_abort(conversation_id, gate_timings, run_started);
                        return Err(EnrichError::NoZoneAtPoint {
                            longitude: inputs.longitude,
                            latitude: inputs.latitude,
                        });
                    }
                },
                Err(error) => {
                    self.record_abort(conversation_id, gate_timings, run_started);
                    return Err(EnrichError::ZoningLookup(error));
                }
            }
        };

        // Step 7: dependent task graph. The chain owns the ordering; the map
        // task runs concurrently with a bounded, fail-open wait on the zone
        // id. One task's failure never cancels another.
        let (zone_tx, zone_rx) = oneshot::channel::<Option<ZoneId>>();
        let (chain_out, map_out) = tokio::join!(
            self.run_chain(
                &municipality,
                &inputs,
                zone_feature.as_ref(),
                conversation_id,
                project_id,
                zone_tx,
            ),
            self.run_map(zone_feature.as_ref(), zone_rx, progress.as_ref()),
        );

        // Step 8: merge per-task outputs and resolve the branch.
        let mut result = EnrichmentResult::new(conversation_id);
        result.is_rnu = is_rnu;
        result.timings.extend(gate_timings);
        merge_outputs(&mut result, chain_out, map_out);

        result.has_analysis = result
            .document
            .as_ref()
            .is_some_and(|document| document.has_analysis);
        result.branch = if is_rnu {
            Branch::Rnu
        } else {
            match &result.document {
                Some(document) if document.has_analysis => Branch::NonRnuAnalysis,
                Some(_) => Branch::NonRnuSource,
                None => classify(is_rnu, result.has_analysis),
            }
        };

        // Step 9: persist derived state, then cache and analytics.
        self.finalize(
            &conversation,
            research_id,
            &municipality,
            zone_feature.as_ref(),
            &result,
        )
        .await?;

        self.cache.insert(conversation_id, result.clone()).await;
        self.analytics
            .record(&EnrichmentEvent::from_result(&result, run_started.elapsed()));

        tracing::info!(
            conversation = %conversation_id,
            branch = %result.branch,
            failed_ops = result.failed_ops(),
            "enrichment completed"
        );
        Ok(result)
    }

    /// city -> zoning -> zone -> document, in declared order. Failed
    /// predecessors are retried once by the dependent task ("synthesize a
    /// best-effort value") before the dependent gives up.
    async fn run_chain(
        &self,
        municipality: &MunicipalityFeature,
        inputs: &GeocodeInputs,
        zone_feature: Option<&ZoneFeature>,
        conversation_id: ConversationId,
        project_id: ProjectId,
        zone_tx: oneshot::Sender<Option<ZoneId>>,
    ) -> ChainOutput {
        // city: no upstream dependency.
        let started = Instant::now();
        let city_value = self
            .ensure_city(municipality)
            .await
            .map_err(|error| error.to_string());
        let city = TaskOutput {
            value: city_value,
            elapsed: started.elapsed(),
        };
        if let Err(error) = &city.value {
            tracing::warn!(%error, "city task failed");
        }

        // RNU: zones are undefined under the national baseline; the rest of
        // the chain is skipped.
        let Some(feature) = zone_feature else {
            let _ = zone_tx.send(None);
            return ChainOutput {
                city,
                zoning: None,
                zone: None,
                document: None,
            };
        };

        let kind = feature
            .type_code
            .as_deref()
            .map(ZoningKind::from_type_code)
            .unwrap_or_else(|| ZoningKind::Other("unknown".to_string()));

        // zoning: needs the city id; falls back to a one-shot city creation
        // when the city task failed.
        let started = Instant::now();
        let zoning_value: Result<ZoningId, String> = {
            let city_id = match &city.value {
                Ok(id) => Ok(*id),
                Err(_) => self
                    .ensure_city(municipality)
                    .await
                    .map_err(|error| format!("city unavailable for zoning: {error}")),
            };
            match city_id {
                Ok(city_id) => self
                    .ensure_zoning(city_id, &kind)
                    .await
                    .map_err(|error| error.to_string()),
                Err(error) => Err(error),
            }
        };
        let zoning = TaskOutput {
            value: zoning_value,
            elapsed: started.elapsed(),
        };
        if let Err(error) = &zoning.value {
            tracing::warn!(%error, "zoning task failed");
        }

        // zone: needs the zoning id and a zone code; same one-shot fallback
        // through the chain prefix.
        let started = Instant::now();
        let zone_value: Result<ZoneId, String> = match feature.short_code.clone() {
            None => Err("no zone code available".to_string()),
            Some(code) => {
                let zoning_id = match &zoning.value {
                    Ok(id) => Ok(*id),
                    Err(_) => match self.ensure_city(municipality).await {
                        Ok(city_id) => self
                            .ensure_zoning(city_id, &kind)
                            .await
                            .map_err(|error| format!("zoning unavailable for zone: {error}")),
                        Err(error) => Err(format!("zoning unavailable for zone: {error}")),
                    },
                };
                match zoning_id {
                    Ok(zoning_id) => self
                        .ensure_zone(zoning_id, feature, &code)
                        .await
                        .map_err(|error| error.to_string()),
                    Err(error) => Err(error),
                }
            }
        };
        let zone = TaskOutput {
            value: zone_value,
            elapsed: started.elapsed(),
        };
        if let Err(error) = &zone.value {
            tracing::warn!(%error, "zone task failed");
        }
        let _ = zone_tx.send(zone.value.as_ref().ok().copied());

        // document: degrades gracefully with whatever ids are available.
        let started = Instant::now();
        let document_value = self
            .resolve_document(
                &inputs.insee_code,
                conversation_id,
                project_id,
                zone.value.as_ref().ok().copied(),
                zoning.value.as_ref().ok().copied(),
            )
            .await;
        let document = TaskOutput {
            value: document_value,
            elapsed: started.elapsed(),
        };
        if let Err(error) = &document.value {
            tracing::warn!(%error, "document task failed");
        }

        ChainOutput {
            city,
            zoning: Some(zoning),
            zone: Some(zone),
            document: Some(document),
        }
    }

    /// Map geometry: prefer the geometry already obtained from the zone
    /// fetch; otherwise wait (bounded, fail-open) for the zone row and read
    /// its persisted geometry. Streams the polygon through the progress hook
    /// the instant it is known.
    async fn run_map(
        &self,
        zone_feature: Option<&ZoneFeature>,
        zone_rx: oneshot::Receiver<Option<ZoneId>>,
        progress: Option<&ProgressHook>,
    ) -> TaskOutput<Option<Geometry>> {
        let started = Instant::now();
        let mut error: Option<String> = None;

        let geometry: Option<Geometry> = match zone_feature {
            None => None,
            Some(feature) if feature.geometry.is_some() => feature.geometry.clone(),
            Some(_) => match tokio::time::timeout(self.config.zone_wait, zone_rx).await {
                Ok(Ok(Some(zone_id))) => {
                    match self
                        .store
                        .get_by_id(collections::ZONES, zone_id.record())
                        .await
                    {
                        Ok(Some(record)) => match record.decode::<Zone>() {
                            Ok(zone) => zone.geometry,
                            Err(decode_error) => {
                                error = Some(decode_error.to_string());
                                None
                            }
                        },
                        Ok(None) => None,
                        Err(store_error) => {
                            error = Some(store_error.to_string());
                            None
                        }
                    }
                }
                Ok(_) => None,
                Err(_) => {
                    tracing::debug!("zone id wait elapsed; proceeding without geometry");
                    None
                }
            },
        };

        if let (Some(hook), Some(geom)) = (progress, &geometry) {
            (hook.as_ref())(EnrichmentProgress::Geometry(geom.clone()));
        }

        TaskOutput {
            value: match error {
                Some(message) => Err(message),
                None => Ok(geometry),
            },
            elapsed: started.elapsed(),
        }
    }

    /// Existing analysis wins; otherwise a source-URL placeholder is
    /// created from the provider's document listing. Every exposed document
    /// is linked to the conversation and its project.
    async fn resolve_document(
        &self,
        insee_code: &str,
        conversation_id: ConversationId,
        project_id: ProjectId,
        zone_id: Option<ZoneId>,
        zoning_id: Option<ZoningId>,
    ) -> Result<Option<DocumentData>, String> {
        let mut existing = None;
        if let Some(zone_id) = zone_id {
            existing = self
                .store
                .get(
                    collections::DOCUMENTS,
                    &Filter::by("zone_id", zone_id.to_string()),
                )
                .await
                .map_err(|error| error.to_string())?;
        }
        if existing.is_none() {
            if let Some(zoning_id) = zoning_id {
                existing = self
                    .store
                    .get(
                        collections::DOCUMENTS,
                        &Filter::by("zoning_id", zoning_id.to_string()),
                    )
                    .await
                    .map_err(|error| error.to_string())?;
            }
        }

        let mut placeholder: Option<Document> = None;
        if let Some(record) = existing {
            let document: Document = record.decode().map_err(|error| error.to_string())?;
            if document.has_analysis() {
                self.link_document(conversation_id, project_id, document.id)
                    .await;
                return Ok(Some(DocumentData {
                    document_id: document.id,
                    has_analysis: true,
                    html_content: document.html_content,
                    source_url: document.source_plu_url,
                }));
            }
            // Content-less row: keep as fallback while the provider is asked
            // for a fresher source pointer.
            placeholder = Some(document);
        }

        let features = match self.geodata.documents(insee_code).await {
            Ok(features) => features,
            Err(error) => {
                if let Some(document) = placeholder {
                    self.link_document(conversation_id, project_id, document.id)
                        .await;
                    return Ok(Some(DocumentData {
                        document_id: document.id,
                        has_analysis: false,
                        html_content: None,
                        source_url: document.source_plu_url,
                    }));
                }
                return Err(error.to_string());
            }
        };

        let Some(url) = features.into_iter().find_map(|feature| feature.source_url) else {
            if let Some(document) = placeholder {
                self.link_document(conversation_id, project_id, document.id)
                    .await;
                return Ok(Some(DocumentData {
                    document_id: document.id,
                    has_analysis: false,
                    html_content: None,
                    source_url: document.source_plu_url,
                }));
            }
            return Ok(None);
        };

        let document_id: DocumentId = self
            .store
            .get_or_create(
                collections::DOCUMENTS,
                &Filter::by("source_plu_url", url.clone()),
                json!({
                    "zone_id": zone_id,
                    "zoning_id": zoning_id,
                    "html_content": null,
                    "source_plu_url": url,
                    "created_at": Utc::now(),
                }),
            )
            .await
            .map_err(|error| error.to_string())?
            .into();
        self.link_document(conversation_id, project_id, document_id)
            .await;

        Ok(Some(DocumentData {
            document_id,
            has_analysis: false,
            html_content: None,
            source_url: Some(url),
        }))
    }

    /// Idempotent link-table writes, unique on the (parent, document) pair.
    /// Link failures are logged, never propagated: the document itself is
    /// already resolved.
    async fn link_document(
        &self,
        conversation_id: ConversationId,
        project_id: ProjectId,
        document_id: DocumentId,
    ) {
        let unique = Filter::by("conversation_id", conversation_id.to_string())
            .and("document_id", document_id.to_string());
        if let Err(error) = self
            .store
            .upsert(
                collections::CONVERSATION_DOCUMENTS,
                &unique,
                json!({"conversation_id": conversation_id, "document_id": document_id}),
            )
            .await
        {
            tracing::warn!(%error, "conversation-document link write failed");
        }

        let unique = Filter::by("project_id", project_id.to_string())
            .and("document_id", document_id.to_string());
        if let Err(error) = self
            .store
            .upsert(
                collections::PROJECT_DOCUMENTS,
                &unique,
                json!({"project_id": project_id, "document_id": document_id}),
            )
            .await
        {
            tracing::warn!(%error, "project-document link write failed");
        }
    }

    async fn ensure_project(
        &self,
        conversation: &Conversation,
        inputs: &GeocodeInputs,
    ) -> Result<ProjectId, EnrichError> {
        if let Some(id) = conversation.project_id {
            return Ok(id);
        }

        let name = inputs
            .address
            .clone()
            .unwrap_or_else(|| conversation.address.clone());
        let id: ProjectId = self
            .store
            .insert(
                collections::PROJECTS,
                json!({
                    "name": name,
                    "status": ProjectStatus::Draft,
                    "created_at": Utc::now(),
                }),
            )
            .await?
            .into();
        self.store
            .update(
                collections::CONVERSATIONS,
                conversation.id.record(),
                json!({"project_id": id}),
            )
            .await?;
        tracing::debug!(project = %id, "draft project created");
        Ok(id)
    }

    async fn ensure_research_entry(
        &self,
        conversation_id: ConversationId,
        inputs: &GeocodeInputs,
    ) -> Result<ResearchEntryId, EnrichError> {
        let id = self
            .store
            .get_or_create(
                collections::RESEARCH_HISTORY,
                &Filter::by("conversation_id", conversation_id.to_string()),
                json!({
                    "conversation_id": conversation_id,
                    "municipality_name": inputs.city_hint,
                    "city_id": null,
                    "zoning_id": null,
                    "zone_id": null,
                    "zoning_kind": null,
                    "branch": Branch::Pending,
                    "has_analysis": false,
                    "is_rnu": false,
                    "primary_document_id": null,
                    "documents_found": [],
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(id.into())
    }

    async fn ensure_city(
        &self,
        municipality: &MunicipalityFeature,
    ) -> Result<CityId, parcelle_store::StoreError> {
        self.store
            .get_or_create(
                collections::MUNICIPALITIES,
                &Filter::by("insee_code", municipality.insee_code.clone()),
                json!({
                    "insee_code": municipality.insee_code,
                    "name": municipality.name,
                    "is_rnu": municipality.is_rnu,
                }),
            )
            .await
            .map(CityId::from)
    }

    async fn ensure_zoning(
        &self,
        city_id: CityId,
        kind: &ZoningKind,
    ) -> Result<ZoningId, parcelle_store::StoreError> {
        self.store
            .get_or_create(
                collections::ZONINGS,
                &Filter::by("city_id", city_id.to_string()).and("kind", kind.as_code()),
                json!({"city_id": city_id, "kind": kind}),
            )
            .await
            .map(ZoningId::from)
    }

    async fn ensure_zone(
        &self,
        zoning_id: ZoningId,
        feature: &ZoneFeature,
        code: &str,
    ) -> Result<ZoneId, parcelle_store::StoreError> {
        self.store
            .get_or_create(
                collections::ZONES,
                &Filter::by("zoning_id", zoning_id.to_string()).and("name", code),
                json!({
                    "zoning_id": zoning_id,
                    "name": code,
                    "description": feature.label,
                    "geometry": feature.geometry,
                }),
            )
            .await
            .map(ZoneId::from)
    }

    /// Step 9: research entry (best-effort), conversation mirror (critical).
    async fn finalize(
        &self,
        conversation: &Conversation,
        research_id: ResearchEntryId,
        municipality: &MunicipalityFeature,
        zone_feature: Option<&ZoneFeature>,
        result: &EnrichmentResult,
    ) -> Result<(), EnrichError> {
        let now = Utc::now();

        let map_status = if result.map_geometry.is_some() {
            HydrationStatus::Ready
        } else {
            HydrationStatus::Missing
        };
        let document_status = if result.document.is_some() {
            HydrationStatus::Ready
        } else {
            HydrationStatus::Missing
        };
        let document_metadata = DocumentMetadata {
            branch: result.branch,
            document_id: result.document.as_ref().map(|d| d.document_id),
            zone_code: zone_feature.and_then(|f| f.short_code.clone()),
            zone_label: zone_feature.and_then(|f| f.label.clone()),
            city_name: Some(municipality.name.clone()),
            source_url: result.document.as_ref().and_then(|d| d.source_url.clone()),
            has_geometry: result.map_geometry.is_some(),
            artifacts: ArtifactHydration {
                map: ArtifactState::new(map_status, now),
                document: ArtifactState::new(document_status, now),
            },
        };

        let zoning_kind = if result.is_rnu {
            Some(ZoningKind::Rnu)
        } else {
            zone_feature
                .and_then(|f| f.type_code.as_deref())
                .map(ZoningKind::from_type_code)
        };
        let documents_found: Vec<DocumentId> = result
            .document
            .as_ref()
            .map(|d| vec![d.document_id])
            .unwrap_or_default();
        let research_patch = json!({
            "municipality_name": municipality.name,
            "city_id": result.city_id,
            "zoning_id": result.zoning_id,
            "zone_id": result.zone_id,
            "zoning_kind": zoning_kind,
            "branch": result.branch,
            "has_analysis": result.has_analysis,
            "is_rnu": result.is_rnu,
            "primary_document_id": result.document.as_ref().map(|d| d.document_id),
            "documents_found": documents_found,
            "updated_at": now,
        });
        if let Err(error) = self
            .store
            .update(collections::RESEARCH_HISTORY, research_id.record(), research_patch)
            .await
        {
            tracing::warn!(%error, "research history update failed");
        }

        let mut context = conversation.context_metadata.clone();
        context.enrichment = Some(EnrichmentSnapshot {
            city_id: result.city_id,
            zoning_id: result.zoning_id,
            zone_id: result.zone_id,
            branch: result.branch,
            enriched_at: now,
            cached_at: now,
        });

        self.store
            .update(
                collections::CONVERSATIONS,
                conversation.id.record(),
                json!({
                    "enrichment_status": EnrichmentStatus::Completed,
                    "branch_type": result.branch,
                    "has_analysis": result.has_analysis,
                    "is_rnu": result.is_rnu,
                    "primary_document_id": result.document.as_ref().map(|d| d.document_id),
                    "document_metadata": document_metadata,
                    "context_metadata": context,
                    "updated_at": now,
                }),
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, conversation_id: ConversationId) {
        let patch = json!({
            "enrichment_status": EnrichmentStatus::Failed,
            "updated_at": Utc::now(),
        });
        if let Err(error) = self
            .store
            .update(collections::CONVERSATIONS, conversation_id.record(), patch)
            .await
        {
            tracing::warn!(
                conversation = %conversation_id,
                %error,
                "could not mark conversation failed"
            );
        }
    }

    fn record_abort(
        &self,
        conversation_id: ConversationId,
        timings: HashMap<Op, Duration>,
        run_started: Instant,
    ) {
        self.analytics.record(&EnrichmentEvent::aborted(
            conversation_id,
            timings,
            run_started.elapsed(),
        ));
    }
}

/// Merge per-task outputs into the result. Each task settled with its own
/// value; nothing here races.
fn merge_outputs(
    result: &mut EnrichmentResult,
    chain: ChainOutput,
    map: TaskOutput<Option<Geometry>>,
) {
    result.timings.insert(Op::City, chain.city.elapsed);
    match chain.city.value {
        Ok(id) => result.city_id = Some(id),
        Err(message) => {
            result.errors.insert(Op::City, message);
        }
    }

    if let Some(zoning) = chain.zoning {
        result.timings.insert(Op::Zoning, zoning.elapsed);
        match zoning.value {
            Ok(id) => result.zoning_id = Some(id),
            Err(message) => {
                result.errors.insert(Op::Zoning, message);
            }
        }
    }

    if let Some(zone) = chain.zone {
        result.timings.insert(Op::Zone, zone.elapsed);
        match zone.value {
            Ok(id) => result.zone_id = Some(id),
            Err(message) => {
                result.errors.insert(Op::Zone, message);
            }
        }
    }

    if let Some(document) = chain.document {
        result.timings.insert(Op::Document, document.elapsed);
        match document.value {
            Ok(data) => result.document = data,
            Err(message) => {
                result.errors.insert(Op::Document, message);
            }
        }
    }

    result.timings.insert(Op::Map, map.elapsed);
    match map.value {
        Ok(geometry) => result.map_geometry = geometry,
        Err(message) => {
            result.errors.insert(Op::Map, message);
        }
    }
}

/// Rebuild a result from the snapshot persisted on the conversation. Zone
/// geometry and analysis content are not mirrored there; the UI re-reads
/// them by id when needed.
fn result_from_snapshot(
    conversation: &Conversation,
    snapshot: &EnrichmentSnapshot,
) -> EnrichmentResult {
    let mut result = EnrichmentResult::new(conversation.id);
    result.city_id = snapshot.city_id;
    result.zoning_id = snapshot.zoning_id;
    result.zone_id = snapshot.zone_id;
    result.branch = snapshot.branch;
    result.is_rnu = conversation.is_rnu;
    result.has_analysis = conversation.has_analysis;
    result.document = conversation.primary_document_id.map(|document_id| DocumentData {
        document_id,
        has_analysis: conversation.has_analysis,
        html_content: None,
        source_url: conversation
            .document_metadata
            .as_ref()
            .and_then(|m| m.source_url.clone()),
    });
    result
}
