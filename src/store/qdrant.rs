//! Qdrant-backed knowledge base search
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, with_payload_selector::SelectorOptions, SearchPoints, Value as QdrantValue,
    WithPayloadSelector,
};
use qdrant_client::Qdrant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::rag::{Candidate, Retriever};
use crate::store::embedding::{EmbeddingEngine, DEFAULT_EMBEDDING_MODEL};

/// Payload field holding the chunk text
pub const CONTENT_FIELD: &str = "page_content";
/// Payload field holding the source URL
pub const SOURCE_FIELD: &str = "source";

/// Where the indexed knowledge base lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Qdrant gRPC endpoint
    pub url: String,
    pub collection: String,
    /// HuggingFace model id used to embed queries
    pub embedding_model: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "medlineplus".to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

/// Collection status reported by [`store_status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub server_version: String,
    pub collection_exists: bool,
}

/// Connect to Qdrant without loading the embedding model
pub fn connect(config: &StoreConfig) -> Result<Qdrant> {
    Qdrant::from_url(&config.url)
        .build()
        .map_err(|e| RagError::ConfigError(format!("Invalid Qdrant URL {}: {}", config.url, e)))
}

/// Check the server answers and the collection is present
pub async fn store_status(client: &Qdrant, collection: &str) -> Result<StoreStatus> {
    let health = client
        .health_check()
        .await
        .map_err(|e| RagError::Generic(format!("Qdrant health check failed: {}", e)))?;
    let collection_exists = client
        .collection_exists(collection)
        .await
        .map_err(|e| RagError::Generic(format!("Qdrant collection lookup failed: {}", e)))?;

    Ok(StoreStatus {
        server_version: health.version,
        collection_exists,
    })
}

/// [`Retriever`] over a Qdrant collection indexed with cosine similarity
pub struct QdrantRetriever {
    client: Qdrant,
    embedder: Arc<EmbeddingEngine>,
    collection: String,
}

impl QdrantRetriever {
    /// Connect and load the query embedding model
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = connect(config)?;
        let embedder = EmbeddingEngine::load(&config.embedding_model)?;
        Ok(Self::with_parts(client, Arc::new(embedder), &config.collection))
    }

    pub fn with_parts(client: Qdrant, embedder: Arc<EmbeddingEngine>, collection: &str) -> Self {
        Self {
            client,
            embedder,
            collection: collection.to_string(),
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let embedded = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RagError::Generic(format!("Embedding task failed: {}", e)))?;
        Ok(embedded?)
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let vector = self.embed_query(query).await?;

        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector,
                limit: k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| RagError::RetrievalFailure {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        let candidates: Vec<Candidate> = response
            .result
            .into_iter()
            .map(|point| to_candidate(&point.payload, point.score))
            .collect();

        debug!(collection = %self.collection, hits = candidates.len(), "qdrant search");
        Ok(candidates)
    }
}

/// Cosine similarity becomes a distance so that lower is more relevant
fn to_candidate(payload: &HashMap<String, QdrantValue>, similarity: f32) -> Candidate {
    Candidate::new(
        payload_string(payload, CONTENT_FIELD).unwrap_or_default(),
        payload_string(payload, SOURCE_FIELD).unwrap_or_default(),
        1.0 - f64::from(similarity),
    )
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    payload.get(key).and_then(|value| match value.kind.as_ref() {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    })
}
