//! Retrieval-augmented grounding pipeline
//!
//! Candidate pools are built from one or more similarity queries, collapsed
//! to one candidate per trusted origin, narrowed by a margin gate and
//! assembled into a bounded `SOURCE:`-tagged context.

pub mod context;
pub mod dedup;
pub mod expansion;
pub mod pipeline;
pub mod planner;
pub mod retrieval;
pub mod selection;
pub mod types;

pub use context::{AssembledContext, ContextBuilder, ContextConfig};
pub use dedup::{canonical_origin, dedupe, TrustedDomains};
pub use expansion::{ExpansionConfig, FallbackExpander, DEFAULT_EXPANSION_KEYWORDS};
pub use pipeline::{
    RAGConfig, RAGPipeline, RAGResult, RetrievalOutcome, Strategy, StrategyConfig,
};
pub use planner::{plan_queries, QueryPlan, QueryPlanner, QuerySource, SectionLabel};
pub use retrieval::{
    PoolBuilder, QueryReport, Retriever, UnavailableRetriever, DEFAULT_CALL_TIMEOUT,
};
pub use selection::{
    select, AdaptiveSelector, SelectionPolicy, MULTI_QUERY_MARGINS, SINGLE_QUERY_MARGINS,
};
pub use types::{Candidate, DedupedSet, Pool, Selection, SourceRef};
