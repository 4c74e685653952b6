// Candidate pool builder: issues similarity queries and absorbs failures
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{RagError, Result};
use crate::rag::types::{Candidate, Pool};

/// Default per-call timeout for retrieval requests
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Similarity search over the knowledge base
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages for `query`, lower score = more relevant
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Candidate>>;
}

/// Stands in for a knowledge base that could not be opened; every search fails
#[derive(Debug, Clone)]
pub struct UnavailableRetriever {
    reason: String,
}

impl UnavailableRetriever {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Retriever for UnavailableRetriever {
    async fn similarity_search(&self, query: &str, _k: usize) -> Result<Vec<Candidate>> {
        Err(RagError::RetrievalFailure {
            query: query.to_string(),
            reason: self.reason.clone(),
        })
    }
}

/// Outcome of one retrieval call, kept for tracing
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub query: String,
    pub requested: usize,
    pub hits: usize,
    /// Reason the call was absorbed as empty, if it failed
    pub failure: Option<String>,
}

/// Builds candidate pools from one or many queries
#[derive(Clone)]
pub struct PoolBuilder {
    retriever: Arc<dyn Retriever>,
    call_timeout: Duration,
}

impl PoolBuilder {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(retriever: Arc<dyn Retriever>, call_timeout: Duration) -> Self {
        Self {
            retriever,
            call_timeout,
        }
    }

    /// Run one query. Errors and timeouts yield an empty pool.
    pub async fn retrieve(&self, query: &str, k: usize) -> (Pool, QueryReport) {
        let call = self.retriever.similarity_search(query, k);
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                duration_ms: self.call_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(candidates) => {
                debug!(query, requested = k, hits = candidates.len(), "retrieval completed");
                let report = QueryReport {
                    query: query.to_string(),
                    requested: k,
                    hits: candidates.len(),
                    failure: None,
                };
                (Pool::from(candidates), report)
            }
            Err(err) => {
                warn!(query, error = %err, "retrieval failed, continuing with no results");
                let report = QueryReport {
                    query: query.to_string(),
                    requested: k,
                    hits: 0,
                    failure: Some(err.to_string()),
                };
                (Pool::new(), report)
            }
        }
    }

    /// Run independent queries concurrently and union their results.
    ///
    /// Every call completes (or fails to empty) before this returns.
    pub async fn retrieve_all(&self, queries: &[String], k: usize) -> (Pool, Vec<QueryReport>) {
        let outcomes = join_all(queries.iter().map(|q| self.retrieve(q, k))).await;

        outcomes.into_iter().fold(
            (Pool::new(), Vec::with_capacity(queries.len())),
            |(pool, mut reports), (part, report)| {
                reports.push(report);
                (pool.merge(part), reports)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedRetriever {
        answers: HashMap<String, Vec<Candidate>>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
            match self.answers.get(query) {
                Some(hits) => Ok(hits.iter().take(k).cloned().collect()),
                None => Err(RagError::RetrievalFailure {
                    query: query.to_string(),
                    reason: "index offline".to_string(),
                }),
            }
        }
    }

    struct SlowRetriever;

    #[async_trait]
    impl Retriever for SlowRetriever {
        async fn similarity_search(&self, _query: &str, _k: usize) -> Result<Vec<Candidate>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![Candidate::new("late", "https://medlineplus.gov/late", 0.1)])
        }
    }

    fn fixed() -> Arc<dyn Retriever> {
        let mut answers = HashMap::new();
        answers.insert(
            "flu".to_string(),
            vec![
                Candidate::new("a", "https://medlineplus.gov/flu.html", 0.2),
                Candidate::new("b", "https://medlineplus.gov/flu.html#x", 0.3),
            ],
        );
        answers.insert(
            "flu causes".to_string(),
            vec![Candidate::new("c", "https://medlineplus.gov/germs.html", 0.4)],
        );
        Arc::new(FixedRetriever { answers })
    }

    #[tokio::test]
    async fn test_retrieve_respects_k() {
        let builder = PoolBuilder::new(fixed());
        let (pool, report) = builder.retrieve("flu", 1).await;
        assert_eq!(pool.len(), 1);
        assert_eq!(report.hits, 1);
        assert!(report.failure.is_none());
    }

    #[tokio::test]
    async fn test_failure_becomes_empty_pool() {
        let builder = PoolBuilder::new(fixed());
        let (pool, report) = builder.retrieve("unknown", 10).await;
        assert!(pool.is_empty());
        assert!(report.failure.unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_empty_pool() {
        let builder = PoolBuilder::with_timeout(Arc::new(SlowRetriever), Duration::from_millis(50));
        let (pool, report) = builder.retrieve("flu", 5).await;
        assert!(pool.is_empty());
        assert!(report.failure.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unavailable_retriever_yields_empty_pools() {
        let builder = PoolBuilder::new(Arc::new(UnavailableRetriever::new("model failed to load")));
        let (pool, report) = builder.retrieve("flu", 5).await;
        assert!(pool.is_empty());
        assert!(report.failure.unwrap().contains("model failed to load"));
    }

    #[tokio::test]
    async fn test_retrieve_all_unions_and_absorbs_failures() {
        let builder = PoolBuilder::new(fixed());
        let queries = vec![
            "flu".to_string(),
            "broken".to_string(),
            "flu causes".to_string(),
        ];

        let (pool, reports) = builder.retrieve_all(&queries, 10).await;
        assert_eq!(pool.len(), 3);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.iter().filter(|r| r.failure.is_some()).count(), 1);
        assert_eq!(reports[1].query, "broken");
    }
}
