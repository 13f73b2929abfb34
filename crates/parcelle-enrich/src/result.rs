//! Enrichment result
//!
//! The orchestrator's output contract with the UI and the cache. Built once
//! per run after every task settles; partial success is the expected shape,
//! so most fields are optional and failures live in the per-operation error
//! map instead of aborting the run.

use parcelle_model::{Branch, CityId, ConversationId, DocumentId, Geometry, ZoneId, ZoningId};
use std::collections::HashMap;
use std::time::Duration;

/// One named operation of the enrichment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Gating municipality fetch.
    Municipality,
    /// Zone-list fetch at the coordinate.
    ZoningLookup,
    /// City record get-or-create.
    City,
    /// Zoning-category get-or-create.
    Zoning,
    /// Zone get-or-create.
    Zone,
    /// Document resolution (existing analysis or source placeholder).
    Document,
    /// Map geometry resolution.
    Map,
}

impl Op {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Municipality => "municipality",
            Self::ZoningLookup => "zoning_lookup",
            Self::City => "city",
            Self::Zoning => "zoning",
            Self::Zone => "zone",
            Self::Document => "document",
            Self::Map => "map",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved document facts exposed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentData {
    pub document_id: DocumentId,
    /// Structured analysis content, when one exists.
    pub html_content: Option<String>,
    pub has_analysis: bool,
    /// Pointer to the external original, for the source branch.
    pub source_url: Option<String>,
}

/// Outcome of one enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub conversation_id: ConversationId,
    pub city_id: Option<CityId>,
    pub zoning_id: Option<ZoningId>,
    pub zone_id: Option<ZoneId>,
    pub document: Option<DocumentData>,
    pub map_geometry: Option<Geometry>,
    pub branch: Branch,
    pub is_rnu: bool,
    pub has_analysis: bool,
    /// Per-operation failure messages; a populated slot never aborted the
    /// run unless the operation was gating.
    pub errors: HashMap<Op, String>,
    /// Per-operation wall-clock elapsed times.
    pub timings: HashMap<Op, Duration>,
}

impl EnrichmentResult {
    /// Empty result for a run that has produced nothing yet.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            city_id: None,
            zoning_id: None,
            zone_id: None,
            document: None,
            map_geometry: None,
            branch: Branch::Pending,
            is_rnu: false,
            has_analysis: false,
            errors: HashMap::new(),
            timings: HashMap::new(),
        }
    }

    /// Number of operations that recorded a failure.
    #[inline]
    #[must_use]
    pub fn failed_ops(&self) -> usize {
        self.errors.len()
    }

    /// Number of operations that ran and did not record a failure.
    #[must_use]
    pub fn succeeded_ops(&self) -> usize {
        self.timings
            .keys()
            .filter(|op| !self.errors.contains_key(op))
            .count()
    }
}

/// Incremental update streamed to the UI while the run is still going.
#[derive(Debug, Clone)]
pub enum EnrichmentProgress {
    /// Map geometry is known; the polygon can render ahead of the rest.
    Geometry(Geometry),
}
