//! Equality filters over record bodies
//!
//! A filter is a conjunction of (field, value) equality clauses matched
//! against the top-level fields of a record body. Natural keys (INSEE code,
//! (zoning id, zone name), link pairs) are expressed this way.

use serde_json::Value;

/// Conjunction of top-level field equality clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Single-clause filter.
    #[must_use]
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            clauses: vec![(field.into(), value.into())],
        }
    }

    /// Add another clause.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Whether the body satisfies every clause.
    #[must_use]
    pub fn matches(&self, body: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| body.get(field) == Some(value))
    }

    /// Canonical key for this filter, stable across clause insertion order.
    /// Used to serialize concurrent get-or-create callers per logical key.
    #[must_use]
    pub fn key(&self) -> String {
        let mut parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        parts.sort();
        parts.join("&")
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
