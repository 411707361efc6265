//! Synced message entity
//!
//! Messages are keyed by (workspace_id, channel_id, message_id) where
//! message_id is the platform timestamp string, unique within a channel.
//! Upserts against that key make re-syncs idempotent.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub workspace_id: Uuid,

    /// Platform channel identifier
    #[sea_orm(column_type = "Text")]
    pub channel_id: String,

    /// Platform message identifier (timestamp string)
    #[sea_orm(column_type = "Text")]
    pub message_id: String,

    /// Platform user id of the author
    #[sea_orm(column_type = "Text", nullable)]
    pub author_id: Option<String>,

    /// Resolved author name at sync time
    #[sea_orm(column_type = "Text", nullable)]
    pub author_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub text: Option<String>,

    /// Parent thread timestamp when this message is a reply
    #[sea_orm(column_type = "Text", nullable)]
    pub thread_ts: Option<String>,

    pub reply_count: i32,

    pub edited: bool,

    pub posted_at: DateTimeWithTimeZone,

    /// Raw platform payload fields not promoted to columns
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether this message is a thread reply (not a root)
    pub fn is_thread_reply(&self) -> bool {
        match &self.thread_ts {
            Some(ts) => ts != &self.message_id,
            None => false,
        }
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

    #[sea_orm(has_many = "super::reaction::Entity")]
    Reaction,
}

impl Related<super::workspace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workspace.def()
    }
}

impl Related<super::reaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
