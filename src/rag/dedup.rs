//! Source deduplication
//!
//! Collapses a pool to one candidate per canonical origin, keeping the
//! closest chunk of each page and dropping anything outside the trusted
//! domains.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::rag::types::{Candidate, DedupedSet, Pool};

/// Hosts whose pages may ground an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustedDomains {
    domains: Vec<String>,
}

impl TrustedDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.into().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Admit every http(s) origin
    pub fn any() -> Self {
        Self { domains: Vec::new() }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Whether a canonical origin belongs to a trusted host (or a subdomain of one)
    pub fn admits(&self, origin_key: &str) -> bool {
        Url::parse(origin_key.trim())
            .map(|url| self.admits_url(&url))
            .unwrap_or(false)
    }

    fn admits_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url
            .host_str()
            .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
        else {
            return false;
        };
        if self.domains.is_empty() {
            return true;
        }
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for TrustedDomains {
    fn default() -> Self {
        Self::new(["medlineplus.gov"])
    }
}

/// Parse an origin and strip its query and fragment.
///
/// `https://x.gov/a.html?lang=en#causes` and `https://x.gov/a.html` share a key.
/// Origins that do not parse as absolute URLs have no key.
pub fn canonical_origin(origin: &str) -> Option<String> {
    canonical_url(origin).map(String::from)
}

fn canonical_url(origin: &str) -> Option<Url> {
    let mut url = Url::parse(origin.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// Keep the lowest-scoring candidate per canonical origin, sorted ascending.
///
/// Ties keep the first-seen candidate. Unparseable, off-domain and
/// NaN-scored candidates are dropped silently.
pub fn dedupe(pool: &Pool, trusted: &TrustedDomains) -> DedupedSet {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut best: Vec<Candidate> = Vec::new();
    let mut dropped = 0usize;

    for candidate in pool.iter() {
        let Some(url) = canonical_url(&candidate.origin) else {
            dropped += 1;
            continue;
        };
        if candidate.score.is_nan() || !trusted.admits_url(&url) {
            dropped += 1;
            continue;
        }
        let key = String::from(url);

        match slots.get(&key) {
            Some(&slot) => {
                if candidate.score < best[slot].score {
                    best[slot] = Candidate::new(candidate.content.clone(), key, candidate.score);
                }
            }
            None => {
                slots.insert(key.clone(), best.len());
                best.push(Candidate::new(candidate.content.clone(), key, candidate.score));
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores
    best.sort_by(|a, b| a.score.total_cmp(&b.score));

    debug!(
        pool = pool.len(),
        unique = best.len(),
        dropped,
        "deduplicated candidate pool"
    );

    DedupedSet::from_sorted(best)
}
