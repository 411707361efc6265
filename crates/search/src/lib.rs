//! Threadline Search
//!
//! Retrieval and attribution over indexed workspace messages:
//! - Semantic retrieval (query normalization, embedding, ranked sources)
//! - Citation binding (placeholder markers swapped for real sources)

pub mod citation;
pub mod retrieval;

pub use citation::{AnswerState, BoundSource, CitationBinder, MAX_PLACEHOLDER_SOURCES};
pub use retrieval::{
    InMemoryVectorStore, PgVectorStore, RankedSource, RetrievalRequest, RetrievalService,
    VectorStore, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K,
};
