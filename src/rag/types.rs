//! Candidate collections flowing through the selection engine
//!
//! A question moves through four shapes: a [`Pool`] of raw hits, a
//! [`DedupedSet`] with one entry per source, a [`Selection`] prefix of that
//! set, and finally the assembled context text. All of them are built fresh
//! per question and never shared.

use serde::{Deserialize, Serialize};

/// One retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Passage text
    pub content: String,
    /// Source identifier as reported by the retriever (canonical once deduplicated)
    pub origin: String,
    /// Distance to the query; lower is more relevant
    pub score: f64,
}

impl Candidate {
    pub fn new(content: impl Into<String>, origin: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            origin: origin.into(),
            score,
        }
    }
}

/// Unordered multiset of candidates from one or more queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    candidates: Vec<Candidate>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union two pools. Duplicates are kept; deduplication resolves them later.
    pub fn merge(mut self, other: Pool) -> Pool {
        self.candidates.extend(other.candidates);
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl From<Vec<Candidate>> for Pool {
    fn from(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

impl FromIterator<Candidate> for Pool {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

/// One candidate per canonical origin, ascending by score.
///
/// Only [`crate::rag::dedup::dedupe`] constructs this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupedSet {
    candidates: Vec<Candidate>,
}

impl DedupedSet {
    pub(crate) fn from_sorted(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.candidates.first().map(|c| c.score)
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn origin_keys(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.origin.as_str())
    }
}

/// Origin and score pair handed back for citation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub origin_key: String,
    pub score: f64,
}

/// Ordered prefix of a [`DedupedSet`], at most `k` long
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    candidates: Vec<Candidate>,
    /// Margin width whose gate satisfied the floor; `None` for best-effort picks
    margin: Option<f64>,
}

impl Selection {
    pub(crate) fn gated(candidates: Vec<Candidate>, margin: f64) -> Self {
        Self {
            candidates,
            margin: Some(margin),
        }
    }

    pub(crate) fn best_effort(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            margin: None,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn margin(&self) -> Option<f64> {
        self.margin
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn sources(&self) -> Vec<SourceRef> {
        self.candidates
            .iter()
            .map(|c| SourceRef {
                origin_key: c.origin.clone(),
                score: c.score,
            })
            .collect()
    }
}
