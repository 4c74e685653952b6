//! One-shot fallback expansion
//!
//! When the first selection comes up short, the question is broadened with
//! generic medical-intent keywords and queried once more with a larger
//! result count. The new hits are unioned into the existing pool; nothing
//! is replaced, so every source found before expansion survives it.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rag::retrieval::{PoolBuilder, QueryReport};
use crate::rag::types::Pool;

/// Keywords appended to the question for the broadened query
pub const DEFAULT_EXPANSION_KEYWORDS: &str = "symptoms causes diagnosis treatment emergency";

/// Fallback expansion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionConfig {
    pub keywords: String,
    /// Result count requested by the broadened query
    pub result_count: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_EXPANSION_KEYWORDS.to_string(),
            result_count: 120,
        }
    }
}

/// Broadens a thin pool with a single extra retrieval
#[derive(Debug, Clone)]
pub struct FallbackExpander {
    config: ExpansionConfig,
}

impl FallbackExpander {
    pub fn with_config(config: ExpansionConfig) -> Self {
        Self { config }
    }

    /// The question followed by the expansion keywords
    pub fn broadened_query(&self, question: &str) -> String {
        let question = question.trim();
        let keywords = self.config.keywords.trim();
        if keywords.is_empty() {
            question.to_string()
        } else {
            format!("{} {}", question, keywords)
        }
    }

    /// Issue the broadened query and union its hits into `existing`.
    ///
    /// A failed or timed-out call contributes nothing; `existing` comes back intact.
    pub async fn expand(
        &self,
        question: &str,
        existing: Pool,
        pools: &PoolBuilder,
    ) -> (Pool, QueryReport) {
        let query = self.broadened_query(question);
        info!(query = %query, k = self.config.result_count, "expanding thin candidate pool");

        let (extra, report) = pools.retrieve(&query, self.config.result_count).await;
        (existing.merge(extra), report)
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }
}
