//! Knowledge base access: query embeddings plus Qdrant similarity search

pub mod embedding;
pub mod qdrant;

pub use embedding::{EmbeddingEngine, DEFAULT_EMBEDDING_MODEL};
pub use qdrant::{connect, store_status, QdrantRetriever, StoreConfig, StoreStatus};
