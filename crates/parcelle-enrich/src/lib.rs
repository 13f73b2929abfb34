//! Parcelle enrichment core
//!
//! Orchestrates the resolution of a conversation (address + coordinates)
//! into municipality, zoning, regulatory document and map geometry:
//! - One sequential gating prefix, then a dependency-ordered task graph
//! - Partial success as a first-class outcome (per-operation error map)
//! - Idempotent persistence through get-or-create and upsert on natural keys
//! - A 7-day TTL cache to skip re-enrichment
//!
//! # Example
//!
//! ```rust,ignore
//! use parcelle_enrich::EnrichmentOrchestrator;
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn parcelle_store::RecordStore>,
//! #                  geodata: Arc<dyn parcelle_geodata::GeoDataClient>,
//! #                  conversation_id: parcelle_model::ConversationId)
//! # -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = EnrichmentOrchestrator::new(store, geodata);
//! let result = orchestrator.enrich(conversation_id).await?;
//!
//! println!("branch: {}", result.branch);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod analytics;
pub mod cache;
pub mod error;
pub mod observe;
pub mod orchestrator;
pub mod result;

pub use analytics::{AnalyticsSink, EnrichmentEvent, NoopAnalytics, TracingAnalytics};
pub use cache::{is_fresh, ConversationCache, CACHE_TTL};
pub use error::EnrichError;
pub use observe::{spawn_enrichment_loader, ENRICHMENT_TASK};
pub use orchestrator::{EnrichConfig, EnrichmentOrchestrator, ProgressHook};
pub use result::{DocumentData, EnrichmentProgress, EnrichmentResult, Op};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the enrichment core
    pub use crate::{
        EnrichConfig, EnrichError, EnrichmentOrchestrator, EnrichmentResult, Op, ProgressHook,
    };
}
