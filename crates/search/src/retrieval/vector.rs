//! pgvector-backed store for retrieval

use uuid::Uuid;

use threadline_common::db::Repository;
use threadline_common::errors::Result;

use super::{RankedSource, VectorStore};

/// Production vector store over the embeddings table
pub struct PgVectorStore {
    repository: Repository,
}

impl PgVectorStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl VectorStore for PgVectorStore {
    async fn nearest(
        &self,
        workspace_id: Uuid,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<RankedSource>> {
        let rows = self
            .repository
            .nearest_embeddings(workspace_id, query, limit, min_similarity)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| RankedSource {
                message_id: row.message_id,
                content: row.content,
                similarity: row.score as f32,
                channel_id: row.channel_id,
                author_name: row.author_name,
                posted_at: row.posted_at,
            })
            .collect())
    }
}
