//! Best-effort analytics
//!
//! One event per enrichment run, carrying per-operation timings and the
//! success/failure split. The sink API is infallible by construction, so a
//! misbehaving sink can never affect the run's outcome.

use crate::result::{EnrichmentResult, Op};
use parcelle_model::{Branch, ConversationId};
use std::collections::HashMap;
use std::time::Duration;

/// Summary of one enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichmentEvent {
    pub conversation_id: ConversationId,
    pub branch: Branch,
    /// Whether the orchestration ran to completion (partial data included).
    pub completed: bool,
    pub succeeded_ops: usize,
    pub failed_ops: usize,
    pub timings: HashMap<Op, Duration>,
    pub total: Duration,
}

impl EnrichmentEvent {
    /// Event for a run that settled with a result.
    #[must_use]
    pub fn from_result(result: &EnrichmentResult, total: Duration) -> Self {
        Self {
            conversation_id: result.conversation_id,
            branch: result.branch,
            completed: true,
            succeeded_ops: result.succeeded_ops(),
            failed_ops: result.failed_ops(),
            timings: result.timings.clone(),
            total,
        }
    }

    /// Event for a run aborted on the gating path. The last timed operation
    /// is the one that failed.
    #[must_use]
    pub fn aborted(
        conversation_id: ConversationId,
        timings: HashMap<Op, Duration>,
        total: Duration,
    ) -> Self {
        Self {
            conversation_id,
            branch: Branch::Pending,
            completed: false,
            succeeded_ops: timings.len().saturating_sub(1),
            failed_ops: 1,
            timings,
            total,
        }
    }
}

/// Destination for enrichment events.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &EnrichmentEvent);
}

/// Emits events as structured tracing records.
#[derive(Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record(&self, event: &EnrichmentEvent) {
        let timings: Vec<String> = event
            .timings
            .iter()
            .map(|(op, elapsed)| format!("{op}={}ms", elapsed.as_millis()))
            .collect();
        tracing::info!(
            target: "parcelle::analytics",
            conversation = %event.conversation_id,
            branch = %event.branch,
            completed = event.completed,
            succeeded = event.succeeded_ops,
            failed = event.failed_ops,
            total_ms = event.total.as_millis() as u64,
            timings = %timings.join(","),
            "enrichment run settled"
        );
    }
}

/// Discards every event; used in tests.
#[derive(Debug, Default)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn record(&self, _event: &EnrichmentEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_counts_op_outcomes() {
        let id = ConversationId::new();
        let mut result = EnrichmentResult::new(id);
        result.branch = Branch::NonRnuSource;
        result.timings.insert(Op::City, Duration::from_millis(10));
        result.timings.insert(Op::Map, Duration::from_millis(5));
        result.errors.insert(Op::Map, "no geometry".to_string());

        let event = EnrichmentEvent::from_result(&result, Duration::from_millis(120));
        assert!(event.completed);
        assert_eq!(event.succeeded_ops, 1);
        assert_eq!(event.failed_ops, 1);
        assert_eq!(event.branch, Branch::NonRnuSource);
    }

    #[test]
    fn sinks_accept_events_without_effect_on_caller() {
        let event = EnrichmentEvent::aborted(
            ConversationId::new(),
            HashMap::new(),
            Duration::from_millis(30),
        );
        NoopAnalytics.record(&event);
        TracingAnalytics.record(&event);
    }
}
