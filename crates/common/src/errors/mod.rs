//! Error types for Threadline
//!
//! The taxonomy distinguishes errors that are fatal for a sync run
//! (credential problems, exhausted rate-limit retries) from errors that
//! are recovered locally (per-item access failures, embedding failures)
//! and recorded in the run's diagnostics instead of aborting it.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse error classification used for metrics labels and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimited,
    RateLimitExhausted,
    Transient,
    ItemAccess,
    Embedding,
    Database,
    Serialization,
    Configuration,
    Conflict,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::RateLimitExhausted => "rate_limit_exhausted",
            ErrorKind::Transient => "transient",
            ErrorKind::ItemAccess => "item_access",
            ErrorKind::Embedding => "embedding",
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Expired or revoked credential. Fatal for the run; the caller must
    /// prompt the user to reconnect the workspace.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Upstream rate limit hit. Recoverable: the connector backs off
    /// (honoring the server wait hint when present) and retries.
    #[error("Rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Rate-limit retries exhausted. Fatal for the run.
    #[error("Rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// Transient network failure. Retried with backoff, bounded attempts.
    #[error("Transient upstream error: {message}")]
    Transient { message: String },

    /// Per-item not-found/forbidden. Skip the item, record a diagnostic.
    #[error("Cannot access {entity} '{id}': {message}")]
    ItemAccess {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Embedding generation failure. Never blocks the sync run.
    #[error("Embedding generation failed: {message}")]
    Embedding { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A sync run is already active for the workspace.
    #[error("A sync run is already active for workspace {workspace_id}")]
    RunActive { workspace_id: Uuid },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Cooperative cancellation via the stop flag.
    #[error("Sync run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Classify the error for metrics labels and diagnostics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Auth { .. } => ErrorKind::Auth,
            SyncError::RateLimited { .. } => ErrorKind::RateLimited,
            SyncError::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            SyncError::Transient { .. } => ErrorKind::Transient,
            SyncError::ItemAccess { .. } => ErrorKind::ItemAccess,
            SyncError::Embedding { .. } => ErrorKind::Embedding,
            SyncError::Database(_) => ErrorKind::Database,
            SyncError::Serialization(_) => ErrorKind::Serialization,
            SyncError::Configuration { .. } => ErrorKind::Configuration,
            SyncError::RunActive { .. } => ErrorKind::Conflict,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Other(_) => ErrorKind::Transient,
        }
    }

    /// Errors that abort the whole sync run. Everything else is recovered
    /// locally: skipped and recorded in the run diagnostics.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            SyncError::Auth { .. }
                | SyncError::RateLimitExhausted { .. }
                | SyncError::Cancelled
        )
    }

    /// Helper for wrapping upstream HTTP transport failures.
    pub fn transient(message: impl Into<String>) -> Self {
        SyncError::Transient {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        SyncError::Auth {
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        SyncError::Embedding {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures are retried with backoff; rate-limit and
        // auth classification happens at the response layer where status
        // codes and payloads are visible.
        SyncError::Transient {
            message: err.to_string(),
        }
    }
}
