//! Message embedding entity
//!
//! One embedding per message, enforced by a unique constraint on
//! message_id. Content is denormalized so retrieval never joins back to
//! the messages table, and context columns carry what the citation layer
//! needs for attribution.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub workspace_id: Uuid,

    /// Row id of the embedded message, one embedding per message
    #[sea_orm(unique)]
    pub message_id: Uuid,

    /// Cleaned message text the vector was computed from
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// pgvector embedding stored as text for SeaORM compatibility
    /// Actual vector operations done via raw SQL
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    /// Embedding model identifier for versioning
    #[sea_orm(column_type = "Text")]
    pub embedding_model: String,

    /// Platform channel the message was posted in
    #[sea_orm(column_type = "Text", nullable)]
    pub channel_id: Option<String>,

    /// Resolved author name at sync time
    #[sea_orm(column_type = "Text", nullable)]
    pub author_name: Option<String>,

    pub posted_at: Option<DateTimeWithTimeZone>,

    /// Parent thread timestamp when the message is a reply
    #[sea_orm(column_type = "Text", nullable)]
    pub thread_ts: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            // Format: "[1.0,2.0,3.0,...]"
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workspace::Entity",
        from = "Column::WorkspaceId",
        to = "super::workspace::Column::Id",
        on_delete = "Cascade"
    )]
    Workspace,

    #[sea_orm(
        belongs_to = "super::message::Entity",
        from = "Column::MessageId",
        to = "super::message::Column::Id",
        on_delete = "Cascade"
    )]
    Message,
}

impl Related<super::workspace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workspace.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
