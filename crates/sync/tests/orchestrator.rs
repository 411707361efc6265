//! Orchestrator behavior against in-memory platform and store fakes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use threadline_common::config::EmbeddingConfig;
use threadline_common::db::models::RunStatus;
use threadline_common::db::repository::{
    ChannelRecord, FileRecord, MemberRecord, MessageRecord, ReactionRecord,
};
use threadline_common::db::{NewEmbedding, UpsertOutcome};
use threadline_common::embeddings::MockEmbedder;
use threadline_common::errors::{Result, SyncError};

use threadline_connector::types::{
    ChannelInfo, Cursor, FileInfo, MemberInfo, MessageItem, Page, SyncWindow, TeamInfo,
};
use threadline_connector::PlatformClient;

use threadline_sync::indexer::EmbeddingIndexer;
use threadline_sync::orchestrator::{SyncOptions, SyncOrchestrator};
use threadline_sync::progress::{ChannelOutcome, NullObserver, SyncProgress};
use threadline_sync::store::SyncStore;

// ============================================================================
// Platform fake
// ============================================================================

#[derive(Default)]
struct FakeClient {
    member_pages: Vec<Vec<MemberInfo>>,
    channel_pages: Vec<Vec<ChannelInfo>>,
    history: HashMap<String, Vec<Vec<MessageItem>>>,
    replies: HashMap<String, Vec<MessageItem>>,
    file_pages: Vec<Vec<FileInfo>>,
    failing_channels: HashSet<String>,
    fail_team_info: bool,
    observed_oldest: Mutex<Option<DateTime<Utc>>>,
}

fn page_of<T: Clone>(pages: &[Vec<T>], cursor: Option<Cursor>) -> Page<T> {
    let index: usize = cursor
        .as_ref()
        .and_then(|c| c.0.parse().ok())
        .unwrap_or(0);

    let items = pages.get(index).cloned().unwrap_or_default();
    let next_cursor = if index + 1 < pages.len() {
        Some(Cursor((index + 1).to_string()))
    } else {
        None
    };

    Page { items, next_cursor }
}

#[async_trait]
impl PlatformClient for FakeClient {
    async fn team_info(&self) -> Result<TeamInfo> {
        if self.fail_team_info {
            return Err(SyncError::auth("token_revoked"));
        }

        Ok(TeamInfo {
            team_id: "T01".to_string(),
            name: "Acme Eng".to_string(),
            domain: Some("acme".to_string()),
        })
    }

    async fn list_members(&self, cursor: Option<Cursor>) -> Result<Page<MemberInfo>> {
        Ok(page_of(&self.member_pages, cursor))
    }

    async fn list_channels(&self, cursor: Option<Cursor>) -> Result<Page<ChannelInfo>> {
        Ok(page_of(&self.channel_pages, cursor))
    }

    async fn channel_history(
        &self,
        channel_id: &str,
        window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>> {
        *self.observed_oldest.lock().unwrap() = window.oldest;

        if self.failing_channels.contains(channel_id) {
            return Err(SyncError::ItemAccess {
                entity: "channel",
                id: channel_id.to_string(),
                message: "not_in_channel".to_string(),
            });
        }

        let pages = self
            .history
            .get(channel_id)
            .cloned()
            .unwrap_or_default();
        let mut page = page_of(&pages, cursor);

        // Bounded windows return only messages at or after the floor
        if let Some(oldest) = window.oldest {
            page.items
                .retain(|item| item.posted_at().map_or(false, |t| t >= oldest));
        }

        Ok(page)
    }

    async fn thread_replies(
        &self,
        _channel_id: &str,
        thread_ts: &str,
        _cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>> {
        Ok(Page::last(
            self.replies.get(thread_ts).cloned().unwrap_or_default(),
        ))
    }

    async fn list_files(
        &self,
        _window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<FileInfo>> {
        Ok(page_of(&self.file_pages, cursor))
    }
}

// ============================================================================
// Store fake
// ============================================================================

#[derive(Default)]
struct FakeStore {
    members: Mutex<HashMap<String, Uuid>>,
    channels: Mutex<HashMap<String, Uuid>>,
    messages: Mutex<HashMap<(String, String), Uuid>>,
    files: Mutex<HashMap<String, Uuid>>,
    reactions: Mutex<HashMap<(Uuid, String), i32>>,
    embeddings: Mutex<HashSet<Uuid>>,
    snapshots: Mutex<Vec<SyncProgress>>,
    finished: Mutex<Option<(RunStatus, Option<String>)>>,
    workspace_finished: Mutex<Option<DateTime<Utc>>>,
}

fn upsert_into(map: &Mutex<HashMap<String, Uuid>>, key: &str) -> UpsertOutcome {
    let mut map = map.lock().unwrap();
    match map.get(key) {
        Some(&id) => UpsertOutcome { id, is_new: false },
        None => {
            let id = Uuid::new_v4();
            map.insert(key.to_string(), id);
            UpsertOutcome { id, is_new: true }
        }
    }
}

#[async_trait]
impl SyncStore for FakeStore {
    async fn update_workspace_name(&self, _: Uuid, _: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert_member(&self, _: Uuid, record: &MemberRecord) -> Result<UpsertOutcome> {
        Ok(upsert_into(&self.members, &record.member_id))
    }

    async fn upsert_channel(&self, _: Uuid, record: &ChannelRecord) -> Result<UpsertOutcome> {
        Ok(upsert_into(&self.channels, &record.channel_id))
    }

    async fn upsert_message(&self, _: Uuid, record: &MessageRecord) -> Result<UpsertOutcome> {
        let key = (record.channel_id.clone(), record.message_id.clone());
        let mut messages = self.messages.lock().unwrap();
        match messages.get(&key) {
            Some(&id) => Ok(UpsertOutcome { id, is_new: false }),
            None => {
                let id = Uuid::new_v4();
                messages.insert(key, id);
                Ok(UpsertOutcome { id, is_new: true })
            }
        }
    }

    async fn upsert_file(&self, _: Uuid, record: &FileRecord) -> Result<UpsertOutcome> {
        Ok(upsert_into(&self.files, &record.file_id))
    }

    async fn upsert_reaction(
        &self,
        message_row_id: Uuid,
        record: &ReactionRecord,
    ) -> Result<UpsertOutcome> {
        let mut reactions = self.reactions.lock().unwrap();
        let key = (message_row_id, record.emoji.clone());
        let is_new = !reactions.contains_key(&key);
        reactions.insert(key, record.count);
        Ok(UpsertOutcome {
            id: Uuid::new_v4(),
            is_new,
        })
    }

    async fn embedding_exists(&self, message_row_id: Uuid) -> Result<bool> {
        Ok(self.embeddings.lock().unwrap().contains(&message_row_id))
    }

    async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<()> {
        self.embeddings.lock().unwrap().insert(embedding.message_id);
        Ok(())
    }

    async fn record_progress(&self, progress: &SyncProgress) -> Result<()> {
        self.snapshots.lock().unwrap().push(progress.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        _: Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        *self.finished.lock().unwrap() = Some((status, error_message));
        Ok(())
    }

    async fn finish_workspace(&self, _: Uuid, last_sync_at: DateTime<Utc>) -> Result<()> {
        *self.workspace_finished.lock().unwrap() = Some(last_sync_at);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn ts(n: i64) -> String {
    format!("{}.000000", 1_700_000_000 + n)
}

fn message(n: i64, author: &str, text: &str) -> MessageItem {
    MessageItem {
        ts: ts(n),
        author: Some(author.to_string()),
        text: Some(text.to_string()),
        thread_ts: None,
        reply_count: 0,
        edited: false,
        reactions: vec![],
        raw: serde_json::json!({"ts": ts(n)}),
    }
}

fn thread_root(n: i64, author: &str, text: &str, reply_count: i32) -> MessageItem {
    MessageItem {
        thread_ts: Some(ts(n)),
        reply_count,
        ..message(n, author, text)
    }
}

fn thread_reply(root: i64, n: i64, author: &str, text: &str) -> MessageItem {
    MessageItem {
        thread_ts: Some(ts(root)),
        ..message(n, author, text)
    }
}

fn member(id: &str, username: &str) -> MemberInfo {
    MemberInfo {
        id: id.to_string(),
        username: username.to_string(),
        display_name: None,
        email: None,
        is_bot: false,
        deleted: false,
        raw: serde_json::json!({"id": id, "name": username}),
    }
}

fn channel(id: &str, name: &str) -> ChannelInfo {
    ChannelInfo {
        id: id.to_string(),
        name: name.to_string(),
        is_private: false,
        is_archived: false,
        member_count: Some(10),
        raw: serde_json::json!({"id": id, "name": name}),
    }
}

fn options() -> SyncOptions {
    SyncOptions {
        full_sync: true,
        safety_margin: Duration::from_secs(300),
        max_pages_per_channel: 200,
        page_size: 1,
    }
}

fn embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "mock".to_string(),
        api_key: None,
        api_base: None,
        model: "mock-embedding".to_string(),
        dimension: 8,
        timeout_secs: 30,
        max_retries: 3,
        batch_size: 10,
        inter_batch_delay_ms: 0,
    }
}

fn orchestrator(
    client: Arc<FakeClient>,
    store: Arc<FakeStore>,
    options: SyncOptions,
) -> SyncOrchestrator {
    let indexer = EmbeddingIndexer::new(
        store.clone(),
        Arc::new(MockEmbedder::new(8)),
        &embedding_config(),
    );

    SyncOrchestrator::new(
        client,
        store,
        indexer,
        Arc::new(NullObserver),
        Arc::new(AtomicBool::new(false)),
        options,
    )
}

fn workspace_client() -> FakeClient {
    let mut client = FakeClient {
        member_pages: vec![
            vec![member("U01", "ayla"), member("U02", "brook")],
            vec![member("U03", "caz")],
        ],
        channel_pages: vec![vec![
            channel("C01", "general"),
            ChannelInfo {
                is_archived: true,
                ..channel("C02", "old-project")
            },
        ]],
        file_pages: vec![vec![FileInfo {
            id: "F01".to_string(),
            name: "runbook.md".to_string(),
            title: None,
            mimetype: Some("text/markdown".to_string()),
            size_bytes: 2048,
            author: Some("U01".to_string()),
            url: None,
            created: 1_700_000_100,
            raw: serde_json::json!({"id": "F01", "name": "runbook.md"}),
        }]],
        ..FakeClient::default()
    };

    let mut root = thread_root(3, "U01", "incident started, thread here", 2);
    root.reactions = vec![threadline_connector::types::ReactionInfo {
        name: "eyes".to_string(),
        count: 4,
    }];

    client.history.insert(
        "C01".to_string(),
        vec![
            vec![
                message(1, "U01", "the deploy to production finished cleanly"),
                message(2, "U02", "metrics look stable after the rollout"),
            ],
            vec![root],
        ],
    );

    client.replies.insert(
        ts(3),
        vec![
            thread_root(3, "U01", "incident started, thread here", 2),
            thread_reply(3, 4, "U02", "root cause was the connection pool limit"),
            thread_reply(3, 5, "U03", "raised the limit and recycled the pods"),
        ],
    );

    client
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn full_sync_covers_every_page_and_stage() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());
    let orch = orchestrator(client.clone(), store.clone(), options());

    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    assert_eq!(summary.status, RunStatus::Completed);

    // Both member pages were consumed
    assert_eq!(summary.counters.members.processed, 3);
    assert_eq!(store.members.lock().unwrap().len(), 3);

    // Both channels recorded, archived one skipped for history
    assert_eq!(summary.counters.channels.processed, 2);
    assert_eq!(summary.channels.len(), 1);
    assert_eq!(summary.channels[0].channel_id, "C01");
    assert_eq!(summary.channels[0].pages, 2);

    // Both history pages plus two thread replies
    assert_eq!(summary.counters.messages.processed, 3);
    assert_eq!(summary.counters.threads.processed, 2);
    assert_eq!(store.messages.lock().unwrap().len(), 5);

    assert_eq!(summary.counters.reactions.processed, 1);
    assert_eq!(summary.counters.files.processed, 1);

    // Every stored message had substantial text, so each got one embedding
    assert_eq!(store.embeddings.lock().unwrap().len(), 5);

    // Terminal state persisted, high-water mark advanced
    assert_eq!(
        store.finished.lock().unwrap().as_ref().unwrap().0,
        RunStatus::Completed
    );
    assert!(store.workspace_finished.lock().unwrap().is_some());
}

#[tokio::test]
async fn resync_reports_duplicates_and_adds_nothing() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());

    let first = orchestrator(client.clone(), store.clone(), options());
    let summary1 = first.run(Uuid::new_v4(), Uuid::new_v4(), None).await;
    assert_eq!(summary1.counters.messages.new, 3);

    let messages_after_first = store.messages.lock().unwrap().len();
    let embeddings_after_first = store.embeddings.lock().unwrap().len();

    let second = orchestrator(client, store.clone(), options());
    let summary2 = second.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    assert_eq!(summary2.status, RunStatus::Completed);
    assert_eq!(summary2.counters.messages.new, 0);
    assert_eq!(summary2.counters.messages.duplicate, 3);
    assert_eq!(summary2.counters.threads.duplicate, 2);

    // No duplicate rows, no duplicate embeddings
    assert_eq!(store.messages.lock().unwrap().len(), messages_after_first);
    assert_eq!(store.embeddings.lock().unwrap().len(), embeddings_after_first);
}

#[tokio::test]
async fn incremental_window_subtracts_safety_margin() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());

    let opts = SyncOptions {
        full_sync: false,
        ..options()
    };
    let orch = orchestrator(client.clone(), store, opts);

    // Floor lands between the first and second message
    let mark = Utc.timestamp_opt(1_700_000_302, 0).single().unwrap();
    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), Some(mark)).await;

    let observed = client.observed_oldest.lock().unwrap().unwrap();
    assert_eq!(observed, mark - chrono::Duration::seconds(300));

    // The first message sits below the floor and is never stored
    assert_eq!(summary.counters.messages.processed, 2);
}

#[tokio::test]
async fn incremental_stops_after_short_page() {
    let mut client = workspace_client();
    // First page comes back short but still carries a cursor
    client.history.insert(
        "C01".to_string(),
        vec![
            vec![message(10, "U01", "only message inside the window")],
            vec![message(11, "U02", "behind a cursor that is never followed")],
        ],
    );
    let client = Arc::new(client);
    let store = Arc::new(FakeStore::default());

    let opts = SyncOptions {
        full_sync: false,
        page_size: 2,
        ..options()
    };
    let orch = orchestrator(client, store, opts);

    let mark = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), Some(mark)).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.channels[0].pages, 1);
    assert_eq!(summary.counters.messages.processed, 1);
}

#[tokio::test]
async fn full_sync_requests_unbounded_history() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());
    let orch = orchestrator(client.clone(), store, options());

    orch.run(Uuid::new_v4(), Uuid::new_v4(), Some(Utc::now()))
        .await;

    // full_sync overrides the high-water mark
    assert!(client.observed_oldest.lock().unwrap().is_none());
}

#[tokio::test]
async fn channel_failure_does_not_abort_the_run() {
    let mut client = workspace_client();
    client
        .channel_pages
        .get_mut(0)
        .unwrap()
        .push(channel("C03", "locked-room"));
    client.failing_channels.insert("C03".to_string());

    let store = Arc::new(FakeStore::default());
    let orch = orchestrator(Arc::new(client), store.clone(), options());

    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    assert_eq!(summary.status, RunStatus::Completed);

    let errored: Vec<_> = summary
        .channels
        .iter()
        .filter(|d| d.outcome == ChannelOutcome::Errored)
        .collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].channel_id, "C03");
    assert!(errored[0].error.as_deref().unwrap().contains("not_in_channel"));

    // The healthy channel was still fully synced
    assert_eq!(summary.counters.messages.processed, 3);
}

#[tokio::test]
async fn auth_failure_is_fatal() {
    let client = FakeClient {
        fail_team_info: true,
        ..workspace_client()
    };

    let store = Arc::new(FakeStore::default());
    let orch = orchestrator(Arc::new(client), store.clone(), options());

    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.error.unwrap().contains("Authentication failed"));

    let finished = store.finished.lock().unwrap();
    let (status, error) = finished.as_ref().unwrap();
    assert_eq!(*status, RunStatus::Failed);
    assert!(error.is_some());
}

#[tokio::test]
async fn stop_flag_cancels_the_run() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());

    let indexer = EmbeddingIndexer::new(
        store.clone(),
        Arc::new(MockEmbedder::new(8)),
        &embedding_config(),
    );
    let stop = Arc::new(AtomicBool::new(true));
    let orch = SyncOrchestrator::new(
        client,
        store.clone(),
        indexer,
        Arc::new(NullObserver),
        stop,
        options(),
    );

    let summary = orch.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.error.unwrap().contains("cancelled"));

    // Nothing was written before the stop was observed
    assert!(store.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn progress_snapshots_are_published_per_page() {
    let client = Arc::new(workspace_client());
    let store = Arc::new(FakeStore::default());
    let orch = orchestrator(client, store.clone(), options());

    orch.run(Uuid::new_v4(), Uuid::new_v4(), None).await;

    let snapshots = store.snapshots.lock().unwrap();
    // Stage transitions and per-page snapshots both land here
    assert!(snapshots.len() >= 6);

    // Counters never go backwards across snapshots
    let mut last = 0;
    for snapshot in snapshots.iter() {
        let processed = snapshot.counters.messages.processed;
        assert!(processed >= last);
        last = processed;
    }
}
