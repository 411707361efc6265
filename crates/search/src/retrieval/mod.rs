//! Semantic retrieval over indexed messages
//!
//! A query is cleaned with the same normalization as indexed content,
//! embedded with the same model, and matched against the workspace's
//! vectors. Results below the similarity floor are dropped, the rest are
//! ranked by similarity.

mod memory;
mod vector;

pub use memory::InMemoryVectorStore;
pub use vector::PgVectorStore;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use threadline_common::embeddings::Embedder;
use threadline_common::errors::Result;
use threadline_common::metrics::record_retrieval;
use threadline_common::text;

/// Default number of sources returned
pub const DEFAULT_TOP_K: usize = 5;

/// Default similarity floor; results at or below it are dropped
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// A retrieved source with its relevance and attribution context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSource {
    pub message_id: Uuid,

    /// Cleaned message content the vector was computed from
    pub content: String,

    /// Cosine similarity in [0, 1], higher is closer
    pub similarity: f32,

    pub channel_id: Option<String>,
    pub author_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Retrieval request parameters
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub workspace_id: Uuid,
    pub query: String,
    pub top_k: usize,
    pub min_similarity: f32,
}

impl RetrievalRequest {
    pub fn new(workspace_id: Uuid, query: impl Into<String>) -> Self {
        Self {
            workspace_id,
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Vector store seam for retrieval.
///
/// Implementations must return results ordered by descending similarity
/// and exclude anything at or below `min_similarity`.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn nearest(
        &self,
        workspace_id: Uuid,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<RankedSource>>;
}

/// Embeds queries and ranks workspace sources
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Retrieve the top sources for a query.
    ///
    /// An empty query (after cleaning) returns no sources.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RankedSource>> {
        let started = Instant::now();

        let cleaned = text::normalize(&request.query);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(&cleaned).await?;

        let mut sources = self
            .store
            .nearest(
                request.workspace_id,
                &query_vector,
                request.top_k,
                request.min_similarity,
            )
            .await?;

        // Store implementations order by similarity already; enforce it
        // anyway so callers can rely on the contract
        sources.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources.truncate(request.top_k);

        record_retrieval(started.elapsed().as_secs_f64(), sources.len());

        tracing::debug!(
            workspace_id = %request.workspace_id,
            results = sources.len(),
            "Retrieval complete"
        );

        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_common::embeddings::MockEmbedder;

    struct CannedStore {
        sources: Vec<RankedSource>,
    }

    #[async_trait::async_trait]
    impl VectorStore for CannedStore {
        async fn nearest(
            &self,
            _workspace_id: Uuid,
            _query: &[f32],
            limit: usize,
            min_similarity: f32,
        ) -> Result<Vec<RankedSource>> {
            Ok(self
                .sources
                .iter()
                .filter(|s| s.similarity > min_similarity)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn source(similarity: f32, content: &str) -> RankedSource {
        RankedSource {
            message_id: Uuid::new_v4(),
            content: content.to_string(),
            similarity,
            channel_id: Some("C01".to_string()),
            author_name: Some("ayla".to_string()),
            posted_at: Some(Utc::now()),
        }
    }

    fn service(sources: Vec<RankedSource>) -> RetrievalService {
        RetrievalService::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(CannedStore { sources }),
        )
    }

    #[tokio::test]
    async fn drops_results_at_or_below_the_floor() {
        let service = service(vec![
            source(0.9, "the deploy finished at noon"),
            source(0.8, "metrics were stable afterwards"),
            source(0.5, "lunch plans for friday"),
        ]);

        let request = RetrievalRequest::new(Uuid::new_v4(), "how did the deploy go");
        let results = service.retrieve(&request).await.unwrap();

        let similarities: Vec<f32> = results.iter().map(|s| s.similarity).collect();
        assert_eq!(similarities, vec![0.9, 0.8]);
    }

    #[tokio::test]
    async fn exact_floor_is_excluded() {
        let service = service(vec![source(0.7, "right on the boundary")]);

        let request = RetrievalRequest::new(Uuid::new_v4(), "boundary question");
        let results = service.retrieve(&request).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn respects_top_k() {
        let sources = (0..10)
            .map(|i| source(0.99 - i as f32 * 0.01, "relevant message content"))
            .collect();
        let service = service(sources);

        let mut request = RetrievalRequest::new(Uuid::new_v4(), "query text");
        request.top_k = 3;

        let results = service.retrieve(&request).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results[1].similarity >= results[2].similarity);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let service = service(vec![source(0.95, "anything")]);

        let request = RetrievalRequest::new(Uuid::new_v4(), "  <@U01>  :+1: ");
        let results = service.retrieve(&request).await.unwrap();
        assert!(results.is_empty());
    }
}
