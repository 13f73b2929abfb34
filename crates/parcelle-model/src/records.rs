//! Persisted lookup records
//!
//! Municipality, zoning category, zone, document and research-history rows.
//! All are get-or-create / upsert targets keyed on natural uniqueness
//! constraints, so re-running enrichment never duplicates them.

use crate::branch::Branch;
use crate::geometry::Geometry;
use crate::ids::{
    CityId, ConversationId, DocumentId, ProjectId, ResearchEntryId, ZoneId, ZoningId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Municipality record, mirrored from the geodata provider.
///
/// `is_rnu = true` means no local zoning plan exists and the national
/// baseline ruleset applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: CityId,
    pub insee_code: String,
    pub name: String,
    pub is_rnu: bool,
}

/// Broad zoning type, derived from the provider's zone-type field.
///
/// Stored as the provider's short code; unknown codes are carried through
/// verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ZoningKind {
    Urban,
    ToUrbanize,
    Agricultural,
    Natural,
    /// Synthetic marker for municipalities under the national baseline.
    Rnu,
    Other(String),
}

impl ZoningKind {
    /// Parse the provider's `typezone` code.
    #[must_use]
    pub fn from_type_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "U" => Self::Urban,
            "AU" | "AUC" | "AUS" => Self::ToUrbanize,
            "A" => Self::Agricultural,
            "N" => Self::Natural,
            "RNU" => Self::Rnu,
            _ => Self::Other(code.trim().to_string()),
        }
    }

    /// Short code as persisted.
    #[must_use]
    pub fn as_code(&self) -> &str {
        match self {
            Self::Urban => "U",
            Self::ToUrbanize => "AU",
            Self::Agricultural => "A",
            Self::Natural => "N",
            Self::Rnu => "RNU",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for ZoningKind {
    fn from(code: String) -> Self {
        Self::from_type_code(&code)
    }
}

impl From<ZoningKind> for String {
    fn from(kind: ZoningKind) -> Self {
        kind.as_code().to_string()
    }
}

impl std::fmt::Display for ZoningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Municipality-scoped grouping of zones by broad type.
///
/// At most one row per (city, kind); created lazily via get-or-create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoningCategory {
    pub id: ZoningId,
    pub city_id: CityId,
    pub kind: ZoningKind,
}

/// A named zone inside a zoning category.
///
/// `name` is the external zone code (e.g. "Uc"); get-or-create keyed on
/// (zoning id, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub zoning_id: ZoningId,
    pub name: String,
    pub description: Option<String>,
    pub geometry: Option<Geometry>,
}

/// Regulatory document.
///
/// Carries either full HTML content (an analysis exists) or only a pointer
/// to the external original. `has_analysis` is derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub zone_id: Option<ZoneId>,
    pub zoning_id: Option<ZoningId>,
    pub html_content: Option<String>,
    pub source_plu_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// An analysis exists iff structured content is present.
    #[inline]
    #[must_use]
    pub fn has_analysis(&self) -> bool {
        self.html_content.is_some()
    }
}

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Archived,
}

/// Project owning one or more conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

/// Durable audit/fallback record, at most one per conversation.
///
/// Read by the UI when the conversation's own fields are still pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchHistoryEntry {
    pub id: ResearchEntryId,
    pub conversation_id: ConversationId,
    pub municipality_name: Option<String>,
    pub city_id: Option<CityId>,
    pub zoning_id: Option<ZoningId>,
    pub zone_id: Option<ZoneId>,
    pub zoning_kind: Option<ZoningKind>,
    pub branch: Branch,
    pub has_analysis: bool,
    pub is_rnu: bool,
    pub primary_document_id: Option<DocumentId>,
    pub documents_found: Vec<DocumentId>,
    pub updated_at: DateTime<Utc>,
}

/// Link row: document attached to a conversation. Unique on the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub conversation_id: ConversationId,
    pub document_id: DocumentId,
}

/// Link row: document attached to a project. Unique on the pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub project_id: ProjectId,
    pub document_id: DocumentId,
}
