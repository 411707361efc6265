//! Threadline Common Library
//!
//! Shared code for the Threadline sync and retrieval crates including:
//! - Database models and repository patterns
//! - Embedding client abstraction
//! - Error types and handling
//! - Configuration management
//! - Text normalization for indexing and retrieval
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod telemetry;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use embeddings::Embedder;
pub use errors::{Result, SyncError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
