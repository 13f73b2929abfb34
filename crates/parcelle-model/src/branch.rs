//! Branch classification
//!
//! A conversation's regulatory findings resolve to exactly one of three
//! terminal branches. `classify` is the single source of truth for that
//! mapping; the cache, the UI fallback path and the enrichment pipeline all
//! funnel through it instead of re-deriving the rules.

use serde::{Deserialize, Serialize};

/// Three-way terminal classification of a conversation, plus the transient
/// initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Not yet classified. Transient; never a terminal value.
    Pending,
    /// National baseline rules apply; no local zoning plan exists.
    Rnu,
    /// Local plan with an existing structured analysis.
    NonRnuAnalysis,
    /// Local plan exists but only a source document, no analysis yet.
    NonRnuSource,
}

impl Branch {
    /// Whether this is one of the three terminal branches.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Rnu => "rnu",
            Self::NonRnuAnalysis => "non_rnu_analysis",
            Self::NonRnuSource => "non_rnu_source",
        };
        f.write_str(s)
    }
}

/// Lifecycle of an enrichment run as persisted on the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Classify a conversation from its two fallible inputs.
///
/// RNU always wins: a municipality under the national baseline has no local
/// analysis concept, whatever `has_analysis` claims.
#[inline]
#[must_use]
pub fn classify(is_rnu: bool, has_analysis: bool) -> Branch {
    if is_rnu {
        Branch::Rnu
    } else if has_analysis {
        Branch::NonRnuAnalysis
    } else {
        Branch::NonRnuSource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classify_truth_table() {
        assert_eq!(classify(true, true), Branch::Rnu);
        assert_eq!(classify(true, false), Branch::Rnu);
        assert_eq!(classify(false, true), Branch::NonRnuAnalysis);
        assert_eq!(classify(false, false), Branch::NonRnuSource);
    }

    #[test]
    fn rnu_wins_over_analysis() {
        assert_eq!(classify(true, true), Branch::Rnu);
    }

    #[test]
    fn branch_serde_uses_snake_case() {
        let json = serde_json::to_string(&Branch::NonRnuAnalysis).unwrap();
        assert_eq!(json, "\"non_rnu_analysis\"");
        let back: Branch = serde_json::from_str("\"non_rnu_source\"").unwrap();
        assert_eq!(back, Branch::NonRnuSource);
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&EnrichmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    proptest! {
        #[test]
        fn classify_is_terminal_and_deterministic(is_rnu: bool, has_analysis: bool) {
            let branch = classify(is_rnu, has_analysis);
            prop_assert!(branch.is_terminal());
            prop_assert_eq!(branch, classify(is_rnu, has_analysis));
            if is_rnu {
                prop_assert_eq!(branch, Branch::Rnu);
            }
        }
    }
}
