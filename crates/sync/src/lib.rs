//! Threadline Sync
//!
//! The sync pipeline for connected workspaces:
//! - Orchestrator state machine driving paginated fetches
//! - Idempotent persistence through the store seam
//! - Embedding indexer keyed one-per-message
//! - Progress snapshots persisted after every page

pub mod indexer;
pub mod orchestrator;
pub mod progress;
pub mod store;

pub use indexer::{EmbeddingIndexer, IndexStats, PendingEmbedding};
pub use orchestrator::{RunSummary, SyncOptions, SyncOrchestrator};
pub use progress::{
    ChannelDetail, ChannelOutcome, EntityCounters, ItemError, NullObserver, ProgressObserver,
    SyncCounters, SyncProgress, SyncStage,
};
pub use store::SyncStore;
