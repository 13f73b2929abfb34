//! In-memory record store
//!
//! DashMap-backed implementation used by tests and local runs. Get-or-create
//! and upsert are serialized through a per-(collection, key) mutex so
//! concurrent callers of the same logical key observe a single row.

use crate::error::StoreError;
use crate::filter::Filter;
use crate::{Record, RecordStore};
use async_trait::async_trait;
use dashmap::DashMap;
use parcelle_model::RecordId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<RecordId, Value>>,
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |records| records.len())
    }

    fn lock_for(&self, collection: &str, filter: &Filter) -> Arc<Mutex<()>> {
        let key = format!("{collection}::{}", filter.key());
        self.creation_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn find(&self, collection: &str, filter: &Filter) -> Option<Record> {
        let records = self.collections.get(collection)?;
        let mut matches: Vec<Record> = records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| Record {
                id: *entry.key(),
                body: entry.value().clone(),
            })
            .collect();
        matches.sort_by_key(|record| record.id);
        matches.into_iter().next()
    }

    fn insert_body(&self, collection: &str, mut body: Value) -> Result<RecordId, StoreError> {
        let Some(fields) = body.as_object_mut() else {
            return Err(StoreError::InvalidBody {
                collection: collection.to_string(),
                reason: "record body must be a JSON object".to_string(),
            });
        };

        let id = RecordId::new();
        fields.insert("id".to_string(), Value::String(id.to_string()));

        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, body);

        tracing::debug!(collection, %id, "record inserted");
        Ok(id)
    }

    fn merge_into(&self, collection: &str, id: RecordId, patch: Value) -> Result<(), StoreError> {
        let Some(patch_fields) = patch.as_object() else {
            return Err(StoreError::InvalidBody {
                collection: collection.to_string(),
                reason: "update patch must be a JSON object".to_string(),
            });
        };

        let records = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let mut record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        let fields = record.as_object_mut().ok_or_else(|| StoreError::InvalidBody {
            collection: collection.to_string(),
            reason: "stored body is not an object".to_string(),
        })?;
        for (field, value) in patch_fields {
            if field == "id" {
                continue;
            }
            fields.insert(field.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, collection: &str, filter: &Filter) -> Result<Option<Record>, StoreError> {
        Ok(self.find(collection, filter))
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let Some(records) = self.collections.get(collection) else {
            return Ok(None);
        };
        Ok(records.get(&id).map(|body| Record {
            id,
            body: body.clone(),
        }))
    }

    async fn insert(&self, collection: &str, body: Value) -> Result<RecordId, StoreError> {
        self.insert_body(collection, body)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: Value,
    ) -> Result<(), StoreError> {
        self.merge_into(collection, id, patch)
    }

    async fn get_or_create(
        &self,
        collection: &str,
        lookup: &Filter,
        create: Value,
    ) -> Result<RecordId, StoreError> {
        let lock = self.lock_for(collection, lookup);
        let _guard = lock.lock().await;

        if let Some(existing) = self.find(collection, lookup) {
            return Ok(existing.id);
        }
        self.insert_body(collection, create)
    }

    async fn upsert(
        &self,
        collection: &str,
        unique: &Filter,
        body: Value,
    ) -> Result<RecordId, StoreError> {
        let lock = self.lock_for(collection, unique);
        let _guard = lock.lock().await;

        if let Some(existing) = self.find(collection, unique) {
            self.merge_into(collection, existing.id, body)?;
            return Ok(existing.id);
        }
        self.insert_body(collection, body)
    }
}
