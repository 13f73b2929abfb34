//! Record-store seam
//!
//! The enrichment core persists everything through a generic, schemaless
//! record store: named collections of JSON bodies addressed by filter.
//! The production deployment backs this with the hosted BaaS; tests and
//! local runs use [`MemoryStore`].
//!
//! All mutation funnels through upsert/get-or-create on natural keys, so
//! implementations must make `get_or_create` atomic per logical key:
//! concurrent callers with the same (collection, lookup) must observe a
//! single row.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod filter;
pub mod memory;

pub use error::StoreError;
pub use filter::Filter;
pub use memory::MemoryStore;

use async_trait::async_trait;
use parcelle_model::RecordId;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A stored record: id plus its JSON body. The body always carries the id
/// under the `"id"` key as well, so typed decoding sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub body: Value,
}

impl Record {
    /// Decode the body into a typed row.
    ///
    /// # Errors
    /// Returns `StoreError::Decode` when the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(StoreError::Decode)
    }
}

/// Generic CRUD operations against named record collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// First record matching the filter, if any. When several match, the
    /// oldest (lowest id) wins, approximating insertion order.
    async fn get(&self, collection: &str, filter: &Filter) -> Result<Option<Record>, StoreError>;

    /// Record by primary id.
    async fn get_by_id(&self, collection: &str, id: RecordId)
        -> Result<Option<Record>, StoreError>;

    /// Insert a new record; the store assigns and returns the id.
    ///
    /// # Errors
    /// `StoreError::InvalidBody` when the body is not a JSON object.
    async fn insert(&self, collection: &str, body: Value) -> Result<RecordId, StoreError>;

    /// Shallow-merge the patch object's fields into an existing record.
    async fn update(&self, collection: &str, id: RecordId, patch: Value)
        -> Result<(), StoreError>;

    /// Look up by natural key; create only if absent; return the id either
    /// way. Atomic per (collection, lookup) key: concurrent callers for the
    /// same logical key observe exactly one row.
    async fn get_or_create(
        &self,
        collection: &str,
        lookup: &Filter,
        create: Value,
    ) -> Result<RecordId, StoreError>;

    /// Ensure a row with the unique key exists, merging the payload into it.
    /// Used for link tables unique on the (parent, child) pair.
    async fn upsert(
        &self,
        collection: &str,
        unique: &Filter,
        body: Value,
    ) -> Result<RecordId, StoreError>;
}
