//! Conversation enrichment cache
//!
//! Two layers with one freshness rule: an in-process moka cache with a
//! 7-day time-to-live, and [`is_fresh`] for snapshots re-read from the
//! conversation's own persisted metadata. Both exist to skip re-enrichment
//! of a recently resolved conversation.

use crate::result::EnrichmentResult;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use parcelle_model::ConversationId;
use std::time::Duration;

/// How long an enrichment snapshot stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A persisted snapshot is fresh while `0 <= now - cached_at < 7 days`.
///
/// An entry aged exactly seven days is stale; a `cached_at` in the future
/// (clock skew) is invalid.
#[inline]
#[must_use]
pub fn is_fresh(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(cached_at);
    age >= chrono::Duration::zero() && age < chrono::Duration::days(7)
}

/// In-process TTL cache of enrichment results, keyed by conversation id.
#[derive(Debug, Clone)]
pub struct ConversationCache {
    inner: Cache<ConversationId, EnrichmentResult>,
}

impl ConversationCache {
    /// Cache with the standard 7-day TTL.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Cache with a custom TTL (tests).
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn insert(&self, id: ConversationId, result: EnrichmentResult) {
        self.inner.insert(id, result).await;
    }

    #[must_use]
    pub async fn get(&self, id: &ConversationId) -> Option<EnrichmentResult> {
        self.inner.get(id).await
    }

    pub async fn invalidate(&self, id: &ConversationId) {
        self.inner.invalidate(id).await;
    }

    /// Approximate number of live entries.
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ConversationCache {
    /// Cache with default capacity (10,000 conversations).
    fn default() -> Self {
        Self::new(10_000)
    }
}
