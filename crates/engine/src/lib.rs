//! Threadline Engine
//!
//! The front door for workspace sync and retrieval: connects workspaces,
//! starts and cancels sync runs (one live run per workspace), exposes
//! progress and history, answers retrieval queries, and binds citations
//! for generated answers.

pub mod board;
pub mod leases;
pub mod stops;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadline_common::config::AppConfig;
use threadline_common::db::models::{SyncRun, Workspace};
use threadline_common::db::repository::WorkspaceStatus;
use threadline_common::db::{DbPool, Repository};
use threadline_common::embeddings::{create_embedder, Embedder};
use threadline_common::errors::{Result, SyncError};

use threadline_connector::{PlatformClient, SlackClient};

use threadline_search::citation::{AnswerState, BoundSource, CitationBinder};
use threadline_search::retrieval::{
    PgVectorStore, RankedSource, RetrievalRequest, RetrievalService, DEFAULT_MIN_SIMILARITY,
    DEFAULT_TOP_K,
};

use threadline_sync::indexer::EmbeddingIndexer;
use threadline_sync::orchestrator::{SyncOptions, SyncOrchestrator};
use threadline_sync::store::SyncStore;

use board::ProgressBoard;
use leases::RunLeases;
use stops::StopFlags;

pub use threadline_sync::progress::SyncProgress;

/// Builds a platform client for a workspace credential
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, workspace: &Workspace) -> Result<Arc<dyn PlatformClient>>;
}

/// Default factory producing Slack Web API clients
pub struct SlackClientFactory {
    config: threadline_common::config::ConnectorConfig,
}

impl SlackClientFactory {
    pub fn new(config: threadline_common::config::ConnectorConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for SlackClientFactory {
    fn client_for(&self, workspace: &Workspace) -> Result<Arc<dyn PlatformClient>> {
        let client = SlackClient::new(&self.config, workspace.api_token().to_string())?;
        Ok(Arc::new(client))
    }
}

/// Retrieval knobs for one query
#[derive(Debug, Clone, Copy)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub min_similarity: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Workspace sync and retrieval engine
pub struct Engine {
    config: AppConfig,
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    retrieval: RetrievalService,
    citations: CitationBinder,
    client_factory: Arc<dyn ClientFactory>,
    leases: RunLeases,
    board: Arc<ProgressBoard>,
    stops: StopFlags,
}

impl Engine {
    /// Connect to the database and assemble the engine from configuration.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = DbPool::new(&config.database).await?;
        let repository = Repository::new(pool);
        let embedder = create_embedder(&config.embedding)?;
        let factory = Arc::new(SlackClientFactory::new(config.connector.clone()));

        Ok(Self::assemble(config, repository, embedder, factory))
    }

    /// Assemble from parts; used by `new` and by tests that inject fakes.
    pub fn assemble(
        config: AppConfig,
        repository: Repository,
        embedder: Arc<dyn Embedder>,
        client_factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let retrieval = RetrievalService::new(
            embedder.clone(),
            Arc::new(PgVectorStore::new(repository.clone())),
        );

        Self {
            config,
            repository,
            embedder,
            retrieval,
            citations: CitationBinder::new(),
            client_factory,
            leases: RunLeases::new(),
            board: Arc::new(ProgressBoard::new()),
            stops: StopFlags::new(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    // ========================================================================
    // Workspace lifecycle
    // ========================================================================

    /// Register or refresh a workspace connection after OAuth
    pub async fn connect_workspace(
        &self,
        team_id: &str,
        team_name: &str,
        access_token: &str,
        bot_token: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Workspace> {
        let workspace = self
            .repository
            .upsert_workspace(team_id, team_name, access_token, bot_token, token_expires_at)
            .await?;

        tracing::info!(workspace_id = %workspace.id, team_id, "Workspace connected");
        Ok(workspace)
    }

    /// Soft-disconnect: cancel any live run and deactivate.
    ///
    /// Synced data and embeddings are kept; reconnecting reactivates.
    pub async fn disconnect_workspace(&self, workspace_id: Uuid) -> Result<bool> {
        if let Some(run) = self.repository.find_active_run(workspace_id).await? {
            self.cancel_sync(run.id);
        }

        let deactivated = self.repository.deactivate_workspace(workspace_id).await?;
        if deactivated {
            tracing::info!(%workspace_id, "Workspace disconnected");
        }
        Ok(deactivated)
    }

    /// Workspace summary: counts, high-water mark, latest run
    pub async fn workspace_status(&self, workspace_id: Uuid) -> Result<WorkspaceStatus> {
        self.repository.workspace_status(workspace_id).await
    }

    async fn active_workspace(&self, workspace_id: Uuid) -> Result<Workspace> {
        let workspace = self
            .repository
            .find_workspace_by_id(workspace_id)
            .await?
            .ok_or(SyncError::NotFound {
                resource: "workspace",
                id: workspace_id.to_string(),
            })?;

        if !workspace.is_active {
            return Err(SyncError::Configuration {
                message: format!("workspace {} is disconnected", workspace_id),
            });
        }

        Ok(workspace)
    }

    // ========================================================================
    // Sync runs
    // ========================================================================

    /// Start a sync run in the background; returns the run id.
    ///
    /// Rejected with `RunActive` when a run is already live for the
    /// workspace, in this process or any other.
    pub async fn start_sync(&self, workspace_id: Uuid, full_sync: bool) -> Result<Uuid> {
        let workspace = self.active_workspace(workspace_id).await?;

        self.leases.acquire(workspace_id)?;

        // Cross-process guard: a run row may exist from another instance
        let active = match self.repository.find_active_run(workspace_id).await {
            Ok(active) => active,
            Err(e) => {
                self.leases.release(workspace_id);
                return Err(e);
            }
        };
        if active.is_some() {
            self.leases.release(workspace_id);
            return Err(SyncError::RunActive { workspace_id });
        }

        let run = match self.repository.create_sync_run(workspace_id, full_sync).await {
            Ok(run) => run,
            Err(e) => {
                self.leases.release(workspace_id);
                return Err(e);
            }
        };

        let client = match self.client_factory.client_for(&workspace) {
            Ok(client) => client,
            Err(e) => {
                self.leases.release(workspace_id);
                return Err(e);
            }
        };

        let stop = self.stops.register(run.id);

        let store: Arc<dyn SyncStore> = Arc::new(self.repository.clone());
        let indexer = EmbeddingIndexer::new(store.clone(), self.embedder.clone(), &self.config.embedding);
        let options = SyncOptions::from_config(&self.config, full_sync);

        let orchestrator = SyncOrchestrator::new(
            client,
            store,
            indexer,
            self.board.clone(),
            stop,
            options,
        );

        let run_id = run.id;
        let last_sync_at = workspace.last_sync_at.map(Into::into);
        let leases = self.leases.clone();
        let stops = self.stops.clone();
        let board = self.board.clone();

        tokio::spawn(async move {
            let summary = orchestrator.run(workspace_id, run_id, last_sync_at).await;
            tracing::info!(
                %workspace_id,
                %run_id,
                status = ?summary.status,
                "Background sync run finished"
            );

            // The run row holds the terminal snapshot; drop the
            // in-process state so finished runs cost nothing
            stops.discard(run_id);
            board.clear(run_id);
            leases.release(workspace_id);
        });

        Ok(run_id)
    }

    /// Request cooperative cancellation of a run.
    ///
    /// Returns false when the run is not live in this process.
    pub fn cancel_sync(&self, run_id: Uuid) -> bool {
        self.stops.raise(run_id)
    }

    /// Progress for a run.
    ///
    /// Live runs answer from the in-process board; anything else is
    /// rebuilt from the persisted run row, so finished runs and runs
    /// from a previous process stay queryable.
    pub async fn sync_progress(&self, run_id: Uuid) -> Result<Option<SyncProgress>> {
        if let Some(progress) = self.board.latest(run_id) {
            return Ok(Some(progress));
        }

        let run = self.repository.find_run_by_id(run_id).await?;
        Ok(run.map(|run| SyncProgress::from_run(&run)))
    }

    /// Recent runs for a workspace, newest first
    pub async fn sync_history(&self, workspace_id: Uuid, limit: u64) -> Result<Vec<SyncRun>> {
        self.repository.sync_history(workspace_id, limit).await
    }

    /// Fail run rows orphaned by a crash.
    ///
    /// A run whose last progress write is older than `stale_after` cannot
    /// still be live; call this on startup before accepting new syncs.
    pub async fn reconcile_stale_runs(&self, stale_after: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));

        let failed = self.repository.mark_stale_runs_failed(cutoff).await?;
        if failed > 0 {
            tracing::warn!(count = failed, "Marked stale sync runs as failed");
        }
        Ok(failed)
    }

    // ========================================================================
    // Retrieval and citations
    // ========================================================================

    /// Retrieve the most relevant indexed messages for a query
    pub async fn retrieve(
        &self,
        workspace_id: Uuid,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<RankedSource>> {
        self.active_workspace(workspace_id).await?;

        let mut request = RetrievalRequest::new(workspace_id, query);
        request.top_k = options.top_k;
        request.min_similarity = options.min_similarity;

        self.retrieval.retrieve(&request).await
    }

    /// Note citation markers seen in streamed answer text
    pub fn note_answer_markers(&self, answer_id: &str, answer_text: &str) {
        self.citations.note_markers(answer_id, answer_text);
    }

    /// Retrieve sources for an answer's query and bind them to the answer.
    ///
    /// Binding is one-shot: a second call for an already-bound answer
    /// leaves the bound set untouched and returns it as-is.
    pub async fn bind_answer_sources(
        &self,
        answer_id: &str,
        workspace_id: Uuid,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<BoundSource>> {
        let sources = self.retrieve(workspace_id, query, options).await?;
        self.citations.bind(answer_id, &sources);
        Ok(self.citations.sources(answer_id))
    }

    /// Citation state for an answer
    pub fn answer_state(&self, answer_id: &str) -> AnswerState {
        self.citations.state(answer_id)
    }

    /// Current source slots for an answer
    pub fn answer_sources(&self, answer_id: &str) -> Vec<BoundSource> {
        self.citations.sources(answer_id)
    }

    /// Drop citation state for a finished answer
    pub fn forget_answer(&self, answer_id: &str) {
        self.citations.forget(answer_id);
    }
}
