//! Conversation record and its denormalized metadata
//!
//! A conversation is created lightweight at address-submission time and
//! mutated in place by the enrichment pipeline. Everything the UI needs for
//! a fast first paint is mirrored at the top level; the full geocoding input
//! and the enrichment snapshot live in the `context_metadata` bag.

use crate::branch::{Branch, EnrichmentStatus};
use crate::ids::{CityId, ConversationId, DocumentId, ProjectId, ZoneId, ZoningId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An address lookup session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub project_id: Option<ProjectId>,
    pub address: String,
    pub longitude: f64,
    pub latitude: f64,
    pub insee_code: String,
    pub enrichment_status: EnrichmentStatus,
    pub branch_type: Branch,
    pub has_analysis: bool,
    pub is_rnu: bool,
    pub primary_document_id: Option<DocumentId>,
    pub document_metadata: Option<DocumentMetadata>,
    #[serde(default)]
    pub context_metadata: ContextMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form metadata bag attached to a conversation.
///
/// Holds the original geocoding input; after enrichment, also the nested
/// enrichment snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub insee_code: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub address: Option<String>,
    /// Municipality name hint from geocoding, used before the authoritative
    /// lookup resolves.
    pub city_name: Option<String>,
    pub enrichment: Option<EnrichmentSnapshot>,
}

/// Denormalized enrichment outcome embedded in the conversation.
///
/// Doubles as the 7-day cache entry: `cached_at` drives freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSnapshot {
    pub city_id: Option<CityId>,
    pub zoning_id: Option<ZoningId>,
    pub zone_id: Option<ZoneId>,
    pub branch: Branch,
    pub enriched_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

/// Hydration state of a UI artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationStatus {
    Ready,
    Missing,
}

/// Status/timestamp pair for one artifact; consumed only by the UI for
/// hydration ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactState {
    pub status: HydrationStatus,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactState {
    #[inline]
    #[must_use]
    pub fn new(status: HydrationStatus, updated_at: DateTime<Utc>) -> Self {
        Self { status, updated_at }
    }
}

/// Per-artifact hydration states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHydration {
    pub map: ArtifactState,
    pub document: ArtifactState,
}

/// Denormalized document snapshot mirrored onto the conversation for fast
/// reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub branch: Branch,
    pub document_id: Option<DocumentId>,
    pub zone_code: Option<String>,
    pub zone_label: Option<String>,
    pub city_name: Option<String>,
    pub source_url: Option<String>,
    pub has_geometry: bool,
    pub artifacts: ArtifactHydration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_conversation() -> Conversation {
        Conversation {
            id: ConversationId::new(),
            user_id: "user-1".to_string(),
            project_id: None,
            address: "10 Rue de Rivoli, Paris".to_string(),
            longitude: 2.3397,
            latitude: 48.8606,
            insee_code: "75056".to_string(),
            enrichment_status: EnrichmentStatus::Pending,
            branch_type: Branch::Pending,
            has_analysis: false,
            is_rnu: false,
            primary_document_id: None,
            document_metadata: None,
            context_metadata: ContextMetadata {
                insee_code: Some("75056".to_string()),
                longitude: Some(2.3397),
                latitude: Some(48.8606),
                address: Some("10 Rue de Rivoli, Paris".to_string()),
                city_name: Some("Paris".to_string()),
                enrichment: None,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn conversation_roundtrips_through_json() {
        let conv = sample_conversation();
        let json = serde_json::to_value(&conv).unwrap();
        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back, conv);
    }

    #[test]
    fn context_metadata_defaults_when_absent() {
        let mut json = serde_json::to_value(sample_conversation()).unwrap();
        json.as_object_mut().unwrap().remove("context_metadata");
        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back.context_metadata, ContextMetadata::default());
    }
}
