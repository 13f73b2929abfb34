//! Store errors

/// Errors surfaced by a record-store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id in the collection.
    #[error("record not found in '{collection}': {id}")]
    NotFound { collection: String, id: String },

    /// Record bodies must be JSON objects.
    #[error("invalid record body for '{collection}': {reason}")]
    InvalidBody { collection: String, reason: String },

    /// Typed decoding of a body failed.
    #[error("record decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Backend-specific failure (network, storage engine).
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Shorthand used by implementations.
    #[must_use]
    pub fn not_found(collection: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_collection_and_id() {
        let err = StoreError::not_found("zones", "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        let msg = err.to_string();
        assert!(msg.contains("zones"));
        assert!(msg.contains("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
    }
}
