//! Enrichment error taxonomy
//!
//! Only precondition and gating failures surface as `EnrichError`; every
//! dependent task's failure is captured in the result's error map instead
//! (see [`crate::result::EnrichmentResult`]).

use parcelle_geodata::GeoDataError;
use parcelle_model::ConversationId;
use parcelle_store::StoreError;

/// Failures that abort an enrichment run.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// No conversation with this id. Precondition; fix upstream data.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// The conversation's context metadata lacks a required geocoding input.
    /// Precondition; fix upstream data.
    #[error("missing required enrichment input: {0}")]
    MissingInput(&'static str),

    /// A run for this conversation is still in flight; overlapping runs are
    /// rejected rather than raced.
    #[error("enrichment already in flight for conversation {0}")]
    AlreadyInFlight(ConversationId),

    /// The gating municipality fetch failed.
    #[error("municipality lookup failed: {0}")]
    MunicipalityLookup(#[source] GeoDataError),

    /// The provider knows no municipality for this INSEE code, so the RNU
    /// status cannot be determined.
    #[error("municipality not found for INSEE code {0}")]
    MunicipalityNotFound(String),

    /// The zone-list fetch failed on the non-RNU path.
    #[error("zoning lookup failed: {0}")]
    ZoningLookup(#[source] GeoDataError),

    /// The provider returned no zone for the coordinate; nothing downstream
    /// can anchor on it.
    #[error("no zone found at ({longitude}, {latitude})")]
    NoZoneAtPoint { longitude: f64, latitude: f64 },

    /// Record-store failure on the gating path.
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
}

impl EnrichError {
    /// Whether re-invoking `enrich` as-is can reasonably succeed.
    ///
    /// Precondition failures need upstream data correction first; gating
    /// operational failures are retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInFlight(_)
                | Self::MunicipalityLookup(_)
                | Self::ZoningLookup(_)
                | Self::NoZoneAtPoint { .. }
                | Self::Store(_)
        )
    }

    /// Whether this is a precondition failure (bad input data, not an
    /// operational hiccup).
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_) | Self::MissingInput(_) | Self::MunicipalityNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions_are_not_retryable() {
        assert!(!EnrichError::MissingInput("insee_code").is_retryable());
        assert!(!EnrichError::ConversationNotFound(ConversationId::new()).is_retryable());
        assert!(EnrichError::MissingInput("insee_code").is_precondition());
    }

    #[test]
    fn gating_operational_errors_are_retryable() {
        let err = EnrichError::NoZoneAtPoint {
            longitude: 2.34,
            latitude: 48.86,
        };
        assert!(err.is_retryable());
        assert!(!err.is_precondition());
        assert!(EnrichError::AlreadyInFlight(ConversationId::new()).is_retryable());
    }

    #[test]
    fn display_carries_the_insee_code() {
        let err = EnrichError::MunicipalityNotFound("75056".to_string());
        assert!(err.to_string().contains("75056"));
    }
}
