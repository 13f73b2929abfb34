//! Geodata errors

/// Errors from a geodata backend. Transport and decoding only; empty result
/// sets are not errors.
#[derive(Debug, thiserror::Error)]
pub enum GeoDataError {
    /// Transport-level failure (connect, timeout, non-success status).
    #[error("geodata request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload did not decode as a feature collection.
    #[error("geodata payload decode failed for {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl GeoDataError {
    #[must_use]
    pub fn decode(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}
