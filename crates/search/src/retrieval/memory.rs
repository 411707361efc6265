//! In-memory vector store
//!
//! Backs tests and small deployments without Postgres. Exhaustive cosine
//! scan, same ordering and floor semantics as the pgvector store.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadline_common::errors::Result;
use threadline_common::text::cosine_similarity;

use super::{RankedSource, VectorStore};

struct Entry {
    workspace_id: Uuid,
    message_id: Uuid,
    content: String,
    vector: Vec<f32>,
    channel_id: Option<String>,
    author_name: Option<String>,
    posted_at: Option<DateTime<Utc>>,
}

/// Exhaustive-scan vector store
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        workspace_id: Uuid,
        message_id: Uuid,
        content: impl Into<String>,
        vector: Vec<f32>,
        channel_id: Option<String>,
        author_name: Option<String>,
        posted_at: Option<DateTime<Utc>>,
    ) {
        self.entries.lock().unwrap().push(Entry {
            workspace_id,
            message_id,
            content: content.into(),
            vector,
            channel_id,
            author_name,
            posted_at,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn nearest(
        &self,
        workspace_id: Uuid,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<RankedSource>> {
        let entries = self.entries.lock().unwrap();

        let mut scored: Vec<RankedSource> = entries
            .iter()
            .filter(|e| e.workspace_id == workspace_id)
            .map(|e| RankedSource {
                message_id: e.message_id,
                content: e.content.clone(),
                similarity: cosine_similarity(query, &e.vector),
                channel_id: e.channel_id.clone(),
                author_name: e.author_name.clone(),
                posted_at: e.posted_at,
            })
            .filter(|s| s.similarity > min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scopes_results_to_the_workspace() {
        let store = InMemoryVectorStore::new();
        let ws_a = Uuid::new_v4();
        let ws_b = Uuid::new_v4();

        store.insert(ws_a, Uuid::new_v4(), "from workspace a", vec![1.0, 0.0], None, None, None);
        store.insert(ws_b, Uuid::new_v4(), "from workspace b", vec![1.0, 0.0], None, None, None);

        let results = store.nearest(ws_a, &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "from workspace a");
    }

    #[tokio::test]
    async fn orders_by_similarity_descending() {
        let store = InMemoryVectorStore::new();
        let ws = Uuid::new_v4();

        store.insert(ws, Uuid::new_v4(), "far", vec![0.2, 0.98], None, None, None);
        store.insert(ws, Uuid::new_v4(), "near", vec![1.0, 0.05], None, None, None);
        store.insert(ws, Uuid::new_v4(), "orthogonal", vec![0.0, 1.0], None, None, None);

        let results = store.nearest(ws, &[1.0, 0.0], 10, 0.1).await.unwrap();
        assert_eq!(results[0].content, "near");
        assert!(results.iter().all(|s| s.content != "orthogonal"));
    }
}
