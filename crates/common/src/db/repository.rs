//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations. Upserts
//! against natural keys use `RETURNING (xmax = 0)` to report whether the
//! row was newly inserted, which drives new/duplicate counters without a
//! separate existence query.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{Result, SyncError};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Row id of the inserted or updated record
    pub id: Uuid,

    /// True when the row did not exist before this call
    pub is_new: bool,
}

/// Member fields written during sync
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub member_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_bot: bool,
    pub deleted: bool,
    pub metadata: Option<serde_json::Value>,
}

/// Channel fields written during sync
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub name: String,
    pub is_private: bool,
    pub is_archived: bool,
    pub member_count: Option<i32>,
    pub metadata: Option<serde_json::Value>,
}

/// Message fields written during sync
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub text: Option<String>,
    pub thread_ts: Option<String>,
    pub reply_count: i32,
    pub edited: bool,
    pub posted_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// File fields written during sync
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_id: String,
    pub name: String,
    pub title: Option<String>,
    pub mimetype: Option<String>,
    pub size_bytes: i64,
    pub author_id: Option<String>,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Reaction fields written during sync
#[derive(Debug, Clone)]
pub struct ReactionRecord {
    pub emoji: String,
    pub count: i32,
}

/// A new embedding row, with context copied from its message
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub workspace_id: Uuid,
    pub message_id: Uuid,
    pub content: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub channel_id: Option<String>,
    pub author_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub thread_ts: Option<String>,
}

/// Row returned by vector similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    pub message_id: Uuid,
    pub content: String,
    pub score: f64,
    pub channel_id: Option<String>,
    pub author_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Summary of a workspace and its latest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub workspace_id: Uuid,
    pub team_id: String,
    pub team_name: String,
    pub is_active: bool,
    pub member_count: i32,
    pub channel_count: i32,
    pub message_count: i64,
    pub embedding_count: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub latest_run: Option<SyncRun>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Workspace Operations
    // ========================================================================

    /// Register or refresh a workspace connection.
    ///
    /// Keyed on team_id so reconnecting an existing workspace updates
    /// tokens and reactivates it instead of creating a duplicate.
    pub async fn upsert_workspace(
        &self,
        team_id: &str,
        team_name: &str,
        access_token: &str,
        bot_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Workspace> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO workspaces (
                id, team_id, team_name, access_token, bot_token, token_expires_at,
                is_active, member_count, channel_count, message_count, last_sync_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, 0, 0, 0, NULL, NOW(), NOW())
            ON CONFLICT (team_id) DO UPDATE SET
                team_name = EXCLUDED.team_name,
                access_token = EXCLUDED.access_token,
                bot_token = EXCLUDED.bot_token,
                token_expires_at = EXCLUDED.token_expires_at,
                is_active = TRUE,
                updated_at = NOW()
            RETURNING id
            "#,
            vec![
                Uuid::new_v4().into(),
                team_id.into(),
                team_name.into(),
                access_token.into(),
                bot_token.map(str::to_string).into(),
                token_expires_at.into(),
            ],
        );

        let row = self
            .write_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| SyncError::transient("workspace upsert returned no row"))?;
        let id: Uuid = row.try_get_by_index(0)?;

        self.find_workspace_by_id(id)
            .await?
            .ok_or(SyncError::NotFound {
                resource: "workspace",
                id: id.to_string(),
            })
    }

    /// Find workspace by ID
    pub async fn find_workspace_by_id(&self, id: Uuid) -> Result<Option<Workspace>> {
        WorkspaceEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find workspace by platform team id
    pub async fn find_workspace_by_team_id(&self, team_id: &str) -> Result<Option<Workspace>> {
        WorkspaceEntity::find()
            .filter(WorkspaceColumn::TeamId.eq(team_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List active workspaces
    pub async fn list_active_workspaces(&self) -> Result<Vec<Workspace>> {
        WorkspaceEntity::find()
            .filter(WorkspaceColumn::IsActive.eq(true))
            .order_by_asc(WorkspaceColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Soft-deactivate a workspace; synced data is kept
    pub async fn deactivate_workspace(&self, id: Uuid) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE workspaces SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
            vec![id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update team metadata from the platform
    pub async fn update_workspace_name(&self, id: Uuid, team_name: &str) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE workspaces SET team_name = $1, updated_at = NOW() WHERE id = $2",
            vec![team_name.into(), id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Refresh rolling counts and the sync high-water mark after a run
    pub async fn finish_workspace_sync(
        &self,
        id: Uuid,
        last_sync_at: DateTime<Utc>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE workspaces SET
                member_count = (SELECT COUNT(*) FROM members WHERE workspace_id = $1),
                channel_count = (SELECT COUNT(*) FROM channels WHERE workspace_id = $1),
                message_count = (SELECT COUNT(*) FROM messages WHERE workspace_id = $1),
                last_sync_at = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
            vec![id.into(), last_sync_at.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    // ========================================================================
    // Entity Upserts
    // ========================================================================

    async fn run_upsert(&self, stmt: Statement) -> Result<UpsertOutcome> {
        let row = self
            .write_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| SyncError::transient("upsert returned no row"))?;

        Ok(UpsertOutcome {
            id: row.try_get_by_index(0)?,
            is_new: row.try_get_by_index(1)?,
        })
    }

    /// Upsert a member, keyed on (workspace_id, member_id)
    pub async fn upsert_member(
        &self,
        workspace_id: Uuid,
        record: &MemberRecord,
    ) -> Result<UpsertOutcome> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO members (
                id, workspace_id, member_id, username, display_name, email,
                is_bot, deleted, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (workspace_id, member_id) DO UPDATE SET
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                is_bot = EXCLUDED.is_bot,
                deleted = EXCLUDED.deleted,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS is_new
            "#,
            vec![
                Uuid::new_v4().into(),
                workspace_id.into(),
                record.member_id.clone().into(),
                record.username.clone().into(),
                record.display_name.clone().into(),
                record.email.clone().into(),
                record.is_bot.into(),
                record.deleted.into(),
                record.metadata.clone().into(),
            ],
        );

        self.run_upsert(stmt).await
    }

    /// Upsert a channel, keyed on (workspace_id, channel_id)
    pub async fn upsert_channel(
        &self,
        workspace_id: Uuid,
        record: &ChannelRecord,
    ) -> Result<UpsertOutcome> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO channels (
                id, workspace_id, channel_id, name, is_private, is_archived,
                member_count, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (workspace_id, channel_id) DO UPDATE SET
                name = EXCLUDED.name,
                is_private = EXCLUDED.is_private,
                is_archived = EXCLUDED.is_archived,
                member_count = EXCLUDED.member_count,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS is_new
            "#,
            vec![
                Uuid::new_v4().into(),
                workspace_id.into(),
                record.channel_id.clone().into(),
                record.name.clone().into(),
                record.is_private.into(),
                record.is_archived.into(),
                record.member_count.into(),
                record.metadata.clone().into(),
            ],
        );

        self.run_upsert(stmt).await
    }

    /// Upsert a message, keyed on (workspace_id, channel_id, message_id).
    ///
    /// Edited messages overwrite text and metadata; re-syncing unchanged
    /// messages reports is_new = false.
    pub async fn upsert_message(
        &self,
        workspace_id: Uuid,
        record: &MessageRecord,
    ) -> Result<UpsertOutcome> {
        let metadata = match &record.metadata {
            Some(value) => Some(serde_json::to_value(value)?),
            None => None,
        };

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO messages (
                id, workspace_id, channel_id, message_id, author_id, author_name,
                text, thread_ts, reply_count, edited, posted_at, metadata,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW())
            ON CONFLICT (workspace_id, channel_id, message_id) DO UPDATE SET
                author_id = EXCLUDED.author_id,
                author_name = EXCLUDED.author_name,
                text = EXCLUDED.text,
                thread_ts = EXCLUDED.thread_ts,
                reply_count = EXCLUDED.reply_count,
                edited = EXCLUDED.edited,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS is_new
            "#,
            vec![
                Uuid::new_v4().into(),
                workspace_id.into(),
                record.channel_id.clone().into(),
                record.message_id.clone().into(),
                record.author_id.clone().into(),
                record.author_name.clone().into(),
                record.text.clone().into(),
                record.thread_ts.clone().into(),
                record.reply_count.into(),
                record.edited.into(),
                record.posted_at.into(),
                metadata.into(),
            ],
        );

        self.run_upsert(stmt).await
    }

    /// Upsert a file, keyed on (workspace_id, file_id)
    pub async fn upsert_file(
        &self,
        workspace_id: Uuid,
        record: &FileRecord,
    ) -> Result<UpsertOutcome> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO files (
                id, workspace_id, file_id, name, title, mimetype, size_bytes,
                author_id, url, posted_at, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            ON CONFLICT (workspace_id, file_id) DO UPDATE SET
                name = EXCLUDED.name,
                title = EXCLUDED.title,
                mimetype = EXCLUDED.mimetype,
                size_bytes = EXCLUDED.size_bytes,
                url = EXCLUDED.url,
                metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS is_new
            "#,
            vec![
                Uuid::new_v4().into(),
                workspace_id.into(),
                record.file_id.clone().into(),
                record.name.clone().into(),
                record.title.clone().into(),
                record.mimetype.clone().into(),
                record.size_bytes.into(),
                record.author_id.clone().into(),
                record.url.clone().into(),
                record.posted_at.into(),
                record.metadata.clone().into(),
            ],
        );

        self.run_upsert(stmt).await
    }

    /// Upsert a reaction count, keyed on (message_id, emoji)
    pub async fn upsert_reaction(
        &self,
        message_row_id: Uuid,
        record: &ReactionRecord,
    ) -> Result<UpsertOutcome> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO reactions (id, message_id, emoji, count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (message_id, emoji) DO UPDATE SET
                count = EXCLUDED.count,
                updated_at = NOW()
            RETURNING id, (xmax = 0) AS is_new
            "#,
            vec![
                Uuid::new_v4().into(),
                message_row_id.into(),
                record.emoji.clone().into(),
                record.count.into(),
            ],
        );

        self.run_upsert(stmt).await
    }

    // ========================================================================
    // Sync Run Operations
    // ========================================================================

    /// Create a sync run in the pending state
    pub async fn create_sync_run(&self, workspace_id: Uuid, full_sync: bool) -> Result<SyncRun> {
        let now = chrono::Utc::now();

        let run = SyncRunActiveModel {
            id: Set(Uuid::new_v4()),
            workspace_id: Set(workspace_id),
            status: Set(String::from(RunStatus::Pending)),
            stage: Set("initializing".to_string()),
            full_sync: Set(full_sync),
            counters: Set(serde_json::json!({})),
            channel_details: Set(serde_json::json!([])),
            errors: Set(serde_json::json!([])),
            started_at: Set(now.into()),
            finished_at: Set(None),
            error_message: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        run.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find run by ID
    pub async fn find_run_by_id(&self, id: Uuid) -> Result<Option<SyncRun>> {
        SyncRunEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a non-terminal run for a workspace, if any
    pub async fn find_active_run(&self, workspace_id: Uuid) -> Result<Option<SyncRun>> {
        SyncRunEntity::find()
            .filter(SyncRunColumn::WorkspaceId.eq(workspace_id))
            .filter(SyncRunColumn::Status.is_in(["pending", "running"]))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Persist a progress snapshot for a running sync
    pub async fn update_run_progress(
        &self,
        run_id: Uuid,
        stage: &str,
        counters: serde_json::Value,
        channel_details: serde_json::Value,
        errors: serde_json::Value,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE sync_runs SET
                status = 'running',
                stage = $1,
                counters = $2,
                channel_details = $3,
                errors = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
            vec![
                stage.into(),
                counters.into(),
                channel_details.into(),
                errors.into(),
                run_id.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Move a run to a terminal state
    pub async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE sync_runs SET
                status = $1,
                error_message = $2,
                finished_at = NOW(),
                updated_at = NOW()
            WHERE id = $3
            "#,
            vec![
                String::from(status).into(),
                error_message.into(),
                run_id.into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Fail runs that were left non-terminal past the given cutoff.
    ///
    /// Catches runs orphaned by a crash; returns the number of runs
    /// marked failed.
    pub async fn mark_stale_runs_failed(&self, stale_before: DateTime<Utc>) -> Result<u64> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE sync_runs SET
                status = 'failed',
                error_message = 'interrupted: no progress recorded',
                finished_at = NOW(),
                updated_at = NOW()
            WHERE status IN ('pending', 'running') AND updated_at < $1
            "#,
            vec![stale_before.into()],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected())
    }

    /// Recent runs for a workspace, newest first
    pub async fn sync_history(&self, workspace_id: Uuid, limit: u64) -> Result<Vec<SyncRun>> {
        SyncRunEntity::find()
            .filter(SyncRunColumn::WorkspaceId.eq(workspace_id))
            .order_by_desc(SyncRunColumn::StartedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Embedding Operations
    // ========================================================================

    /// Whether a message already has an embedding
    pub async fn embedding_exists(&self, message_row_id: Uuid) -> Result<bool> {
        let count = EmbeddingEntity::find()
            .filter(EmbeddingColumn::MessageId.eq(message_row_id))
            .count(self.read_conn())
            .await?;

        Ok(count > 0)
    }

    /// Insert an embedding (with vector via raw SQL).
    ///
    /// The unique constraint on message_id makes a concurrent duplicate a
    /// no-op rather than an error.
    pub async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<()> {
        // Convert Vec<f32> to pgvector string format "[1.0,2.0,...]"
        let vector_str = format!(
            "[{}]",
            embedding
                .vector
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO embeddings (
                id, workspace_id, message_id, content, embedding, embedding_model,
                channel_id, author_name, posted_at, thread_ts, created_at
            )
            VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (message_id) DO NOTHING
            "#,
            vec![
                Uuid::new_v4().into(),
                embedding.workspace_id.into(),
                embedding.message_id.into(),
                embedding.content.clone().into(),
                vector_str.into(),
                embedding.model.clone().into(),
                embedding.channel_id.clone().into(),
                embedding.author_name.clone().into(),
                embedding.posted_at.into(),
                embedding.thread_ts.clone().into(),
            ],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Vector similarity search scoped to a workspace.
    ///
    /// Scores are cosine similarity; rows at or below min_similarity are
    /// excluded (strictly greater than).
    pub async fn nearest_embeddings(
        &self,
        workspace_id: Uuid,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<SourceRow>> {
        let query_str = format!(
            "[{}]",
            query
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                e.message_id,
                e.content,
                1 - (e.embedding <=> $1::vector) as score,
                e.channel_id,
                e.author_name,
                e.posted_at
            FROM embeddings e
            WHERE e.workspace_id = $2
              AND e.embedding IS NOT NULL
              AND 1 - (e.embedding <=> $1::vector) > $3
            ORDER BY e.embedding <=> $1::vector
            LIMIT $4
            "#,
            vec![
                query_str.into(),
                workspace_id.into(),
                (min_similarity as f64).into(),
                (limit as i64).into(),
            ],
        );

        let results = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(SourceRow {
                    message_id: row.try_get_by_index::<Uuid>(0).ok()?,
                    content: row.try_get_by_index::<String>(1).ok()?,
                    score: row.try_get_by_index::<f64>(2).ok()?,
                    channel_id: row.try_get_by_index::<Option<String>>(3).ok()?,
                    author_name: row.try_get_by_index::<Option<String>>(4).ok()?,
                    posted_at: row
                        .try_get_by_index::<Option<DateTime<Utc>>>(5)
                        .ok()?,
                })
            })
            .collect();

        Ok(results)
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Workspace summary: rolling counts plus the latest run
    pub async fn workspace_status(&self, workspace_id: Uuid) -> Result<WorkspaceStatus> {
        let workspace = self
            .find_workspace_by_id(workspace_id)
            .await?
            .ok_or(SyncError::NotFound {
                resource: "workspace",
                id: workspace_id.to_string(),
            })?;

        let embedding_count = EmbeddingEntity::find()
            .filter(EmbeddingColumn::WorkspaceId.eq(workspace_id))
            .count(self.read_conn())
            .await?;

        let latest_run = SyncRunEntity::find()
            .filter(SyncRunColumn::WorkspaceId.eq(workspace_id))
            .order_by_desc(SyncRunColumn::StartedAt)
            .one(self.read_conn())
            .await?;

        Ok(WorkspaceStatus {
            workspace_id: workspace.id,
            team_id: workspace.team_id,
            team_name: workspace.team_name,
            is_active: workspace.is_active,
            member_count: workspace.member_count,
            channel_count: workspace.channel_count,
            message_count: workspace.message_count,
            embedding_count,
            last_sync_at: workspace.last_sync_at.map(Into::into),
            latest_run,
        })
    }
}
