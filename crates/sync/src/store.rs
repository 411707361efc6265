//! Persistence seam for the sync pipeline
//!
//! The orchestrator and indexer write through this trait so their control
//! flow can be tested against an in-memory store. The production
//! implementation delegates to the repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadline_common::db::models::RunStatus;
use threadline_common::db::repository::{
    ChannelRecord, FileRecord, MemberRecord, MessageRecord, ReactionRecord,
};
use threadline_common::db::{NewEmbedding, Repository, UpsertOutcome};
use threadline_common::errors::Result;

use crate::progress::SyncProgress;

/// Write operations the sync pipeline performs
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn update_workspace_name(&self, workspace_id: Uuid, team_name: &str) -> Result<()>;

    async fn upsert_member(
        &self,
        workspace_id: Uuid,
        record: &MemberRecord,
    ) -> Result<UpsertOutcome>;

    async fn upsert_channel(
        &self,
        workspace_id: Uuid,
        record: &ChannelRecord,
    ) -> Result<UpsertOutcome>;

    async fn upsert_message(
        &self,
        workspace_id: Uuid,
        record: &MessageRecord,
    ) -> Result<UpsertOutcome>;

    async fn upsert_file(&self, workspace_id: Uuid, record: &FileRecord)
        -> Result<UpsertOutcome>;

    async fn upsert_reaction(
        &self,
        message_row_id: Uuid,
        record: &ReactionRecord,
    ) -> Result<UpsertOutcome>;

    async fn embedding_exists(&self, message_row_id: Uuid) -> Result<bool>;

    async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<()>;

    /// Persist a progress snapshot for a running sync
    async fn record_progress(&self, progress: &SyncProgress) -> Result<()>;

    /// Move the run row to a terminal state
    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    /// Refresh workspace rolling counts and the sync high-water mark
    async fn finish_workspace(&self, workspace_id: Uuid, last_sync_at: DateTime<Utc>)
        -> Result<()>;
}

#[async_trait]
impl SyncStore for Repository {
    async fn update_workspace_name(&self, workspace_id: Uuid, team_name: &str) -> Result<()> {
        Repository::update_workspace_name(self, workspace_id, team_name).await
    }

    async fn upsert_member(
        &self,
        workspace_id: Uuid,
        record: &MemberRecord,
    ) -> Result<UpsertOutcome> {
        Repository::upsert_member(self, workspace_id, record).await
    }

    async fn upsert_channel(
        &self,
        workspace_id: Uuid,
        record: &ChannelRecord,
    ) -> Result<UpsertOutcome> {
        Repository::upsert_channel(self, workspace_id, record).await
    }

    async fn upsert_message(
        &self,
        workspace_id: Uuid,
        record: &MessageRecord,
    ) -> Result<UpsertOutcome> {
        Repository::upsert_message(self, workspace_id, record).await
    }

    async fn upsert_file(
        &self,
        workspace_id: Uuid,
        record: &FileRecord,
    ) -> Result<UpsertOutcome> {
        Repository::upsert_file(self, workspace_id, record).await
    }

    async fn upsert_reaction(
        &self,
        message_row_id: Uuid,
        record: &ReactionRecord,
    ) -> Result<UpsertOutcome> {
        Repository::upsert_reaction(self, message_row_id, record).await
    }

    async fn embedding_exists(&self, message_row_id: Uuid) -> Result<bool> {
        Repository::embedding_exists(self, message_row_id).await
    }

    async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<()> {
        Repository::insert_embedding(self, embedding).await
    }

    async fn record_progress(&self, progress: &SyncProgress) -> Result<()> {
        self.update_run_progress(
            progress.run_id,
            progress.stage.as_str(),
            serde_json::to_value(progress.counters)?,
            serde_json::to_value(&progress.channels)?,
            serde_json::to_value(&progress.errors)?,
        )
        .await
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        Repository::finish_run(self, run_id, status, error_message).await
    }

    async fn finish_workspace(
        &self,
        workspace_id: Uuid,
        last_sync_at: DateTime<Utc>,
    ) -> Result<()> {
        self.finish_workspace_sync(workspace_id, last_sync_at).await
    }
}
