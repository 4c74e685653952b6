//! Adaptive margin-gated selection
//!
//! Instead of a fixed top-k cut, the selector widens a score gate around the
//! best candidate one margin at a time and stops at the narrowest gate that
//! admits enough distinct sources.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rag::types::{DedupedSet, Selection};

/// Margin widths tried by the multi-query strategy
pub const MULTI_QUERY_MARGINS: [f64; 6] = [0.15, 0.30, 0.50, 0.80, 1.20, 2.00];

/// Margin widths tried by the single-query strategy (one extra, wider step)
pub const SINGLE_QUERY_MARGINS: [f64; 7] = [0.15, 0.30, 0.50, 0.80, 1.20, 2.00, 3.00];

/// Selection policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Ascending margin widths added to the best score
    pub margins: Vec<f64>,
    /// Smallest acceptable pick, capped at k. `None` demands the full k.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_acceptable: Option<usize>,
}

impl SelectionPolicy {
    /// Narrower query set reaching for recall: needs all k slots
    pub fn single_query() -> Self {
        Self {
            margins: SINGLE_QUERY_MARGINS.to_vec(),
            min_acceptable: None,
        }
    }

    /// Richer six-query pool: three sources are enough
    pub fn multi_query() -> Self {
        Self {
            margins: MULTI_QUERY_MARGINS.to_vec(),
            min_acceptable: Some(3),
        }
    }

    /// Effective acceptance floor for a target of `k`
    pub fn floor(&self, k: usize) -> usize {
        self.min_acceptable.map_or(k, |min| min.min(k))
    }
}

/// Picks an ordered top-k subset from a deduplicated set
#[derive(Debug, Clone)]
pub struct AdaptiveSelector {
    policy: SelectionPolicy,
}

impl AdaptiveSelector {
    pub fn with_policy(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    pub fn select(&self, deduped: &DedupedSet, k: usize) -> Selection {
        select(deduped, k, self.policy.floor(k), &self.policy.margins)
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }
}

/// Select at most `k` candidates using the first margin whose gate admits
/// at least `min_acceptable` of them.
///
/// Falls back to the plain first `k` when no margin qualifies. Pure: equal
/// inputs always give equal output.
pub fn select(deduped: &DedupedSet, k: usize, min_acceptable: usize, margins: &[f64]) -> Selection {
    let Some(best) = deduped.best_score() else {
        return Selection::default();
    };
    let candidates = deduped.as_slice();

    for &margin in margins {
        let gate = best + margin;
        let admitted = candidates.iter().take_while(|c| c.score <= gate).count();
        let picked = admitted.min(k);

        if picked >= min_acceptable {
            debug!(margin, gate, picked, "margin gate satisfied");
            return Selection::gated(candidates[..picked].to_vec(), margin);
        }
    }

    let picked = candidates.len().min(k);
    debug!(picked, "no margin satisfied floor, taking best-effort prefix");
    Selection::best_effort(candidates[..picked].to_vec())
}
