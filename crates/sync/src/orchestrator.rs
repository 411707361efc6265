//! Sync orchestrator
//!
//! Drives one run through its stages: workspace metadata, member roster,
//! channel list, per-channel history, thread replies, files. Every page is
//! upserted idempotently and indexed before the next page is fetched, and
//! a progress snapshot is published after each page.
//!
//! Failure containment:
//! - item errors are counted and recorded, the item is skipped
//! - channel errors mark the channel errored, the run continues
//! - auth failures, exhausted rate limits, and cancellation abort the run

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use threadline_common::config::AppConfig;
use threadline_common::db::models::RunStatus;
use threadline_common::db::repository::{
    ChannelRecord, FileRecord, MemberRecord, MessageRecord, ReactionRecord,
};
use threadline_common::errors::{Result, SyncError};
use threadline_common::metrics::{record_page, record_sync_run};

use threadline_connector::types::{ChannelInfo, MessageItem, SyncWindow};
use threadline_connector::PlatformClient;

use crate::indexer::{EmbeddingIndexer, PendingEmbedding};
use crate::progress::{
    ChannelDetail, ChannelOutcome, ProgressObserver, SyncCounters, SyncProgress, SyncStage,
};
use crate::store::SyncStore;

/// Which counter bucket a message batch belongs to
#[derive(Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    History,
    ThreadReply,
}

/// Run-level knobs
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Ignore the high-water mark and fetch full history
    pub full_sync: bool,

    /// Overlap subtracted from the high-water mark on incremental runs
    pub safety_margin: Duration,

    /// Runaway-prevention cap on pages fetched per channel
    pub max_pages_per_channel: usize,

    /// Page size the client requests; a shorter page inside a bounded
    /// window means the window is drained
    pub page_size: usize,
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig, full_sync: bool) -> Self {
        Self {
            full_sync,
            safety_margin: config.safety_margin(),
            max_pages_per_channel: config.sync.max_pages_per_channel.max(1),
            page_size: config.connector.page_size.max(1),
        }
    }
}

/// Final report for one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub workspace_id: Uuid,
    pub status: RunStatus,
    pub counters: SyncCounters,
    pub channels: Vec<ChannelDetail>,
    pub error: Option<String>,
}

/// Orchestrates one sync run end to end
pub struct SyncOrchestrator {
    client: Arc<dyn PlatformClient>,
    store: Arc<dyn SyncStore>,
    indexer: EmbeddingIndexer,
    observer: Arc<dyn ProgressObserver>,
    stop: Arc<AtomicBool>,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        store: Arc<dyn SyncStore>,
        indexer: EmbeddingIndexer,
        observer: Arc<dyn ProgressObserver>,
        stop: Arc<AtomicBool>,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            store,
            indexer,
            observer,
            stop,
            options,
        }
    }

    /// Execute the run and persist its terminal state.
    ///
    /// Never returns an error: a fatal failure is reported in the summary
    /// after the run row has been moved to failed.
    #[instrument(skip(self), fields(workspace_id = %workspace_id, run_id = %run_id))]
    pub async fn run(
        &self,
        workspace_id: Uuid,
        run_id: Uuid,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> RunSummary {
        let started = Instant::now();
        let run_started_at = Utc::now();

        let full_sync = self.options.full_sync || last_sync_at.is_none();
        let window = self.window(full_sync, last_sync_at);

        let mut progress = SyncProgress::new(run_id, workspace_id, full_sync);

        tracing::info!(full_sync, "Starting sync run");

        let result = self.execute(&mut progress, &window).await;

        let (status, error) = match result {
            Ok(()) => {
                progress.stage = SyncStage::Completed;
                (RunStatus::Completed, None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Sync run failed");
                progress.stage = SyncStage::Failed;
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        self.publish(&mut progress).await;

        if let Err(e) = self
            .store
            .finish_run(run_id, status, error.clone())
            .await
        {
            tracing::error!(error = %e, "Failed to persist run outcome");
        }

        if status == RunStatus::Completed {
            // High-water mark is the run start, so messages posted while
            // the run was in flight are re-covered next time
            if let Err(e) = self
                .store
                .finish_workspace(workspace_id, run_started_at)
                .await
            {
                tracing::error!(error = %e, "Failed to update workspace after run");
            }
        }

        let status_label = match status {
            RunStatus::Completed => "completed",
            _ => "failed",
        };
        record_sync_run(started.elapsed().as_secs_f64(), status_label);

        tracing::info!(
            status = status_label,
            messages = progress.counters.messages.processed,
            errors = progress.total_errors(),
            "Sync run finished"
        );

        RunSummary {
            run_id,
            workspace_id,
            status,
            counters: progress.counters,
            channels: progress.channels,
            error,
        }
    }

    fn window(&self, full_sync: bool, last_sync_at: Option<DateTime<Utc>>) -> SyncWindow {
        if full_sync {
            return SyncWindow::full();
        }

        match last_sync_at {
            Some(mark) => {
                let margin = chrono::Duration::from_std(self.options.safety_margin)
                    .unwrap_or_else(|_| chrono::Duration::seconds(300));
                SyncWindow::since(mark - margin)
            }
            None => SyncWindow::full(),
        }
    }

    async fn execute(&self, progress: &mut SyncProgress, window: &SyncWindow) -> Result<()> {
        let workspace_id = progress.workspace_id;

        // Stage: workspace metadata
        self.check_stop()?;
        progress.stage = SyncStage::WorkspaceMeta;
        self.publish(progress).await;

        let team = self.client.team_info().await?;
        self.store
            .update_workspace_name(workspace_id, &team.name)
            .await?;

        // Stage: member roster
        self.check_stop()?;
        progress.stage = SyncStage::Members;
        let authors = self.sync_members(progress).await?;

        // Stage: channel list
        self.check_stop()?;
        progress.stage = SyncStage::Channels;
        let channels = self.sync_channels(progress).await?;

        // Stage: per-channel history
        progress.stage = SyncStage::Messages;
        progress.total_channels = channels.iter().filter(|c| !c.is_archived).count() as u64;
        let mut thread_roots: Vec<(String, String)> = Vec::new();

        for channel in channels.iter().filter(|c| !c.is_archived) {
            self.check_stop()?;

            progress.current_channel = Some(channel.name.clone());

            let mut detail = ChannelDetail {
                channel_id: channel.id.clone(),
                name: channel.name.clone(),
                outcome: ChannelOutcome::Ok,
                pages: 0,
                messages: 0,
                error: None,
            };

            match self
                .sync_channel_history(progress, window, channel, &authors, &mut thread_roots, &mut detail)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal_for_run() => {
                    progress.channels.push(detail);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        channel_id = %channel.id,
                        error = %e,
                        "Channel sync failed, continuing with remaining channels"
                    );
                    detail.outcome = ChannelOutcome::Errored;
                    detail.error = Some(e.to_string());
                }
            }

            progress.channels.push(detail);
            progress.completed_channels += 1;
            self.publish(progress).await;
        }

        progress.current_channel = None;

        // Stage: thread replies
        progress.stage = SyncStage::Threads;
        self.sync_threads(progress, &authors, thread_roots).await?;

        // Stage: files
        self.check_stop()?;
        progress.stage = SyncStage::Files;
        self.sync_files(progress, window).await?;

        Ok(())
    }

    async fn sync_members(&self, progress: &mut SyncProgress) -> Result<HashMap<String, String>> {
        let workspace_id = progress.workspace_id;
        let mut authors = HashMap::new();
        let mut cursor = None;

        loop {
            self.check_stop()?;

            let page = self.client.list_members(cursor).await?;
            record_page("member", page.items.len());

            for member in &page.items {
                let label = match member.display_name.as_deref() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => member.username.clone(),
                };
                authors.insert(member.id.clone(), label);

                let record = MemberRecord {
                    member_id: member.id.clone(),
                    username: member.username.clone(),
                    display_name: member.display_name.clone(),
                    email: member.email.clone(),
                    is_bot: member.is_bot,
                    deleted: member.deleted,
                    metadata: Some(member.raw.clone()),
                };

                match self.store.upsert_member(workspace_id, &record).await {
                    Ok(outcome) => progress.counters.members.record(outcome.is_new),
                    Err(e) if e.is_fatal_for_run() => return Err(e),
                    Err(e) => {
                        progress.counters.members.record_error();
                        progress.push_error("member", &member.id, &e.to_string());
                    }
                }
            }

            self.publish(progress).await;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(authors)
    }

    async fn sync_channels(&self, progress: &mut SyncProgress) -> Result<Vec<ChannelInfo>> {
        let workspace_id = progress.workspace_id;
        let mut channels = Vec::new();
        let mut cursor = None;

        loop {
            self.check_stop()?;

            let page = self.client.list_channels(cursor).await?;
            record_page("channel", page.items.len());

            for channel in &page.items {
                let record = ChannelRecord {
                    channel_id: channel.id.clone(),
                    name: channel.name.clone(),
                    is_private: channel.is_private,
                    is_archived: channel.is_archived,
                    member_count: channel.member_count,
                    metadata: Some(channel.raw.clone()),
                };

                match self.store.upsert_channel(workspace_id, &record).await {
                    Ok(outcome) => progress.counters.channels.record(outcome.is_new),
                    Err(e) if e.is_fatal_for_run() => return Err(e),
                    Err(e) => {
                        progress.counters.channels.record_error();
                        progress.push_error("channel", &channel.id, &e.to_string());
                    }
                }
            }

            channels.extend(page.items);
            self.publish(progress).await;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(channels)
    }

    async fn sync_channel_history(
        &self,
        progress: &mut SyncProgress,
        window: &SyncWindow,
        channel: &ChannelInfo,
        authors: &HashMap<String, String>,
        thread_roots: &mut Vec<(String, String)>,
        detail: &mut ChannelDetail,
    ) -> Result<()> {
        let mut cursor = None;

        loop {
            self.check_stop()?;

            if detail.pages as usize >= self.options.max_pages_per_channel {
                tracing::warn!(
                    channel_id = %channel.id,
                    pages = detail.pages,
                    "Per-channel page cap reached, stopping this channel"
                );
                break;
            }

            let page = self
                .client
                .channel_history(&channel.id, window, cursor)
                .await?;
            detail.pages += 1;
            let page_len = page.items.len();
            record_page("message", page_len);

            for item in &page.items {
                if item.is_thread_root() {
                    thread_roots.push((channel.id.clone(), item.ts.clone()));
                }
            }

            let stored = self
                .apply_messages(progress, &channel.id, &page.items, authors, MessageKind::History)
                .await?;
            detail.messages += stored.len() as u64;

            let stats = self.indexer.index_page(stored).await?;
            if stats.failed > 0 {
                tracing::warn!(
                    channel_id = %channel.id,
                    failed = stats.failed,
                    "Some messages in this page could not be embedded"
                );
            }

            self.publish(progress).await;

            // On a bounded window a short page means the window is
            // drained, whatever the cursor says
            if window.oldest.is_some() && page_len < self.options.page_size {
                break;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    async fn sync_threads(
        &self,
        progress: &mut SyncProgress,
        authors: &HashMap<String, String>,
        thread_roots: Vec<(String, String)>,
    ) -> Result<()> {
        for (channel_id, root_ts) in thread_roots {
            self.check_stop()?;

            let mut cursor = None;

            loop {
                let page = match self
                    .client
                    .thread_replies(&channel_id, &root_ts, cursor)
                    .await
                {
                    Ok(page) => page,
                    Err(e) if e.is_fatal_for_run() => return Err(e),
                    Err(e) => {
                        progress.counters.threads.record_error();
                        progress.push_error("thread", &root_ts, &e.to_string());
                        break;
                    }
                };
                record_page("thread_reply", page.items.len());

                // The root comes back as the first reply; it is already stored
                let replies: Vec<MessageItem> = page
                    .items
                    .into_iter()
                    .filter(|item| item.ts != root_ts)
                    .collect();

                let stored = self
                    .apply_messages(progress, &channel_id, &replies, authors, MessageKind::ThreadReply)
                    .await?;
                self.indexer.index_page(stored).await?;

                self.publish(progress).await;

                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }

        Ok(())
    }

    async fn sync_files(&self, progress: &mut SyncProgress, window: &SyncWindow) -> Result<()> {
        let workspace_id = progress.workspace_id;
        let mut cursor = None;

        loop {
            self.check_stop()?;

            let page = self.client.list_files(window, cursor).await?;
            record_page("file", page.items.len());

            for file in &page.items {
                let record = FileRecord {
                    file_id: file.id.clone(),
                    name: file.name.clone(),
                    title: file.title.clone(),
                    mimetype: file.mimetype.clone(),
                    size_bytes: file.size_bytes,
                    author_id: file.author.clone(),
                    url: file.url.clone(),
                    posted_at: file.posted_at(),
                    metadata: Some(file.raw.clone()),
                };

                match self.store.upsert_file(workspace_id, &record).await {
                    Ok(outcome) => progress.counters.files.record(outcome.is_new),
                    Err(e) if e.is_fatal_for_run() => return Err(e),
                    Err(e) => {
                        progress.counters.files.record_error();
                        progress.push_error("file", &file.id, &e.to_string());
                    }
                }
            }

            self.publish(progress).await;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    /// Upsert one batch of messages and their reactions; returns the
    /// queue of stored messages for the indexer.
    async fn apply_messages(
        &self,
        progress: &mut SyncProgress,
        channel_id: &str,
        items: &[MessageItem],
        authors: &HashMap<String, String>,
        kind: MessageKind,
    ) -> Result<Vec<PendingEmbedding>> {
        let workspace_id = progress.workspace_id;
        let mut stored = Vec::with_capacity(items.len());

        for item in items {
            let counters = match kind {
                MessageKind::History => &mut progress.counters.messages,
                MessageKind::ThreadReply => &mut progress.counters.threads,
            };

            let Some(posted_at) = item.posted_at() else {
                counters.record_error();
                progress.push_error("message", &item.ts, "unparseable timestamp");
                continue;
            };

            let author_name = item
                .author
                .as_ref()
                .and_then(|id| authors.get(id))
                .cloned();

            let record = MessageRecord {
                channel_id: channel_id.to_string(),
                message_id: item.ts.clone(),
                author_id: item.author.clone(),
                author_name: author_name.clone(),
                text: item.text.clone(),
                thread_ts: item.thread_ts.clone(),
                reply_count: item.reply_count,
                edited: item.edited,
                posted_at,
                metadata: Some(item.raw.clone()),
            };

            let outcome = match self.store.upsert_message(workspace_id, &record).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal_for_run() => return Err(e),
                Err(e) => {
                    let counters = match kind {
                        MessageKind::History => &mut progress.counters.messages,
                        MessageKind::ThreadReply => &mut progress.counters.threads,
                    };
                    counters.record_error();
                    progress.push_error("message", &item.ts, &e.to_string());
                    continue;
                }
            };

            let counters = match kind {
                MessageKind::History => &mut progress.counters.messages,
                MessageKind::ThreadReply => &mut progress.counters.threads,
            };
            counters.record(outcome.is_new);

            for reaction in &item.reactions {
                let record = ReactionRecord {
                    emoji: reaction.name.clone(),
                    count: reaction.count,
                };

                match self.store.upsert_reaction(outcome.id, &record).await {
                    Ok(r) => progress.counters.reactions.record(r.is_new),
                    Err(e) if e.is_fatal_for_run() => return Err(e),
                    Err(e) => {
                        progress.counters.reactions.record_error();
                        progress.push_error("reaction", &item.ts, &e.to_string());
                    }
                }
            }

            if let Some(text) = &item.text {
                stored.push(PendingEmbedding {
                    workspace_id,
                    message_row_id: outcome.id,
                    text: text.clone(),
                    channel_id: Some(channel_id.to_string()),
                    author_name,
                    posted_at: Some(posted_at),
                    thread_ts: item.thread_ts.clone(),
                });
            }
        }

        Ok(stored)
    }

    /// Publish a snapshot to the observer and the store.
    ///
    /// A progress-persistence failure is logged, never fatal.
    async fn publish(&self, progress: &mut SyncProgress) {
        progress.refresh_timing();
        self.observer.on_progress(progress);

        if let Err(e) = self.store.record_progress(progress).await {
            tracing::warn!(error = %e, "Failed to persist progress snapshot");
        }
    }

    fn check_stop(&self) -> Result<()> {
        if self.stop.load(Ordering::Relaxed) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}
