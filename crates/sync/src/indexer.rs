//! Embedding indexer
//!
//! Indexes synced messages as they are written: text is cleaned, short
//! content is skipped, already-indexed messages are skipped, and the rest
//! is embedded in paced batches. Embedding failures degrade to per-item
//! attempts and are counted, never propagated; the sync run does not fail
//! because the embedding provider is down.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadline_common::config::EmbeddingConfig;
use threadline_common::db::NewEmbedding;
use threadline_common::embeddings::Embedder;
use threadline_common::errors::Result;
use threadline_common::text;

use crate::store::SyncStore;

/// A synced message queued for indexing
#[derive(Debug, Clone)]
pub struct PendingEmbedding {
    pub workspace_id: Uuid,
    pub message_row_id: Uuid,
    pub text: String,
    pub channel_id: Option<String>,
    pub author_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub thread_ts: Option<String>,
}

/// Outcome counts for one indexing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: u64,
    pub skipped_short: u64,
    pub skipped_existing: u64,
    pub failed: u64,
}

struct Candidate {
    pending: PendingEmbedding,
    content: String,
}

/// Batched embedding writer for the sync pipeline
pub struct EmbeddingIndexer {
    store: Arc<dyn SyncStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl EmbeddingIndexer {
    pub fn new(
        store: Arc<dyn SyncStore>,
        embedder: Arc<dyn Embedder>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: config.batch_size.max(1),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }

    /// Index one page worth of messages.
    ///
    /// Database errors propagate; embedding errors are absorbed into the
    /// returned stats.
    pub async fn index_page(&self, pending: Vec<PendingEmbedding>) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut candidates = Vec::new();

        for item in pending {
            let content = text::normalize(&item.text);

            if !text::is_indexable(&content) {
                stats.skipped_short += 1;
                continue;
            }

            if self.store.embedding_exists(item.message_row_id).await? {
                stats.skipped_existing += 1;
                continue;
            }

            candidates.push(Candidate {
                pending: item,
                content,
            });
        }

        let batches: Vec<&[Candidate]> = candidates.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            self.index_batch(batch, &mut stats).await?;

            if i + 1 < batch_count {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        Ok(stats)
    }

    async fn index_batch(&self, batch: &[Candidate], stats: &mut IndexStats) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                for (candidate, vector) in batch.iter().zip(vectors) {
                    self.write(candidate, vector).await?;
                    stats.indexed += 1;
                }
            }

            Ok(vectors) => {
                tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "Embedding batch size mismatch, falling back to per-item"
                );
                self.index_one_by_one(batch, stats).await?;
            }

            Err(e) => {
                tracing::warn!(
                    batch_size = batch.len(),
                    error = %e,
                    "Embedding batch failed, falling back to per-item"
                );
                self.index_one_by_one(batch, stats).await?;
            }
        }

        Ok(())
    }

    async fn index_one_by_one(&self, batch: &[Candidate], stats: &mut IndexStats) -> Result<()> {
        for candidate in batch {
            match self.embedder.embed(&candidate.content).await {
                Ok(vector) => {
                    self.write(candidate, vector).await?;
                    stats.indexed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        message_row_id = %candidate.pending.message_row_id,
                        error = %e,
                        "Skipping message that failed to embed"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(())
    }

    async fn write(&self, candidate: &Candidate, vector: Vec<f32>) -> Result<()> {
        let pending = &candidate.pending;

        self.store
            .insert_embedding(&NewEmbedding {
                workspace_id: pending.workspace_id,
                message_id: pending.message_row_id,
                content: candidate.content.clone(),
                vector,
                model: self.embedder.model_name().to_string(),
                channel_id: pending.channel_id.clone(),
                author_name: pending.author_name.clone(),
                posted_at: pending.posted_at,
                thread_ts: pending.thread_ts.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use threadline_common::db::models::RunStatus;
    use threadline_common::db::repository::{
        ChannelRecord, FileRecord, MemberRecord, MessageRecord, ReactionRecord,
    };
    use threadline_common::db::UpsertOutcome;
    use threadline_common::embeddings::MockEmbedder;
    use threadline_common::errors::SyncError;
    use crate::progress::SyncProgress;

    #[derive(Default)]
    struct FakeStore {
        existing: Mutex<HashSet<Uuid>>,
        written: Mutex<Vec<NewEmbedding>>,
    }

    #[async_trait]
    impl SyncStore for FakeStore {
        async fn update_workspace_name(&self, _: Uuid, _: &str) -> Result<()> {
            Ok(())
        }
        async fn upsert_member(&self, _: Uuid, _: &MemberRecord) -> Result<UpsertOutcome> {
            unreachable!()
        }
        async fn upsert_channel(&self, _: Uuid, _: &ChannelRecord) -> Result<UpsertOutcome> {
            unreachable!()
        }
        async fn upsert_message(&self, _: Uuid, _: &MessageRecord) -> Result<UpsertOutcome> {
            unreachable!()
        }
        async fn upsert_file(&self, _: Uuid, _: &FileRecord) -> Result<UpsertOutcome> {
            unreachable!()
        }
        async fn upsert_reaction(&self, _: Uuid, _: &ReactionRecord) -> Result<UpsertOutcome> {
            unreachable!()
        }
        async fn embedding_exists(&self, message_row_id: Uuid) -> Result<bool> {
            Ok(self.existing.lock().unwrap().contains(&message_row_id))
        }
        async fn insert_embedding(&self, embedding: &NewEmbedding) -> Result<()> {
            self.written.lock().unwrap().push(embedding.clone());
            Ok(())
        }
        async fn record_progress(&self, _: &SyncProgress) -> Result<()> {
            Ok(())
        }
        async fn finish_run(&self, _: Uuid, _: RunStatus, _: Option<String>) -> Result<()> {
            Ok(())
        }
        async fn finish_workspace(
            &self,
            _: Uuid,
            _: DateTime<Utc>,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Err(SyncError::embedding("provider down"))
        }
        async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(SyncError::embedding("provider down"))
        }
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dimension(&self) -> usize {
            8
        }
    }

    fn pending(text: &str) -> PendingEmbedding {
        PendingEmbedding {
            workspace_id: Uuid::new_v4(),
            message_row_id: Uuid::new_v4(),
            text: text.to_string(),
            channel_id: Some("C01".to_string()),
            author_name: Some("ayla".to_string()),
            posted_at: Some(Utc::now()),
            thread_ts: None,
        }
    }

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "mock".to_string(),
            api_key: None,
            api_base: None,
            model: "mock-embedding".to_string(),
            dimension: 8,
            timeout_secs: 30,
            max_retries: 3,
            batch_size: 2,
            inter_batch_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn indexes_substantial_messages_and_skips_short() {
        let store = Arc::new(FakeStore::default());
        let indexer = EmbeddingIndexer::new(
            store.clone(),
            Arc::new(MockEmbedder::new(8)),
            &config(),
        );

        let stats = indexer
            .index_page(vec![
                pending("the deploy failed because the migration timed out"),
                pending("ok"),
                pending("<@U01> :+1:"),
            ])
            .await
            .unwrap();

        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped_short, 2);
        assert_eq!(store.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_already_indexed_messages() {
        let store = Arc::new(FakeStore::default());
        let item = pending("this message was already indexed last run");
        store.existing.lock().unwrap().insert(item.message_row_id);

        let indexer = EmbeddingIndexer::new(
            store.clone(),
            Arc::new(MockEmbedder::new(8)),
            &config(),
        );

        let stats = indexer.index_page(vec![item]).await.unwrap();
        assert_eq!(stats.skipped_existing, 1);
        assert_eq!(stats.indexed, 0);
        assert!(store.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failures_do_not_propagate() {
        let store = Arc::new(FakeStore::default());
        let indexer = EmbeddingIndexer::new(store.clone(), Arc::new(BrokenEmbedder), &config());

        let stats = indexer
            .index_page(vec![
                pending("first message with enough content"),
                pending("second message with enough content"),
                pending("third message with enough content"),
            ])
            .await
            .unwrap();

        assert_eq!(stats.failed, 3);
        assert_eq!(stats.indexed, 0);
        assert!(store.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_content_is_normalized() {
        let store = Arc::new(FakeStore::default());
        let indexer = EmbeddingIndexer::new(
            store.clone(),
            Arc::new(MockEmbedder::new(8)),
            &config(),
        );

        indexer
            .index_page(vec![pending("hey <@U02> the   build is green :tada:")])
            .await
            .unwrap();

        let written = store.written.lock().unwrap();
        assert_eq!(written[0].content, "hey the build is green");
    }
}
