// Retrieval seam and candidate pool builder
pub mod engine;

pub use engine::{
    PoolBuilder, QueryReport, Retriever, UnavailableRetriever, DEFAULT_CALL_TIMEOUT,
};
