//! Connected workspace entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workspaces")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Platform team identifier (unique per install)
    #[sea_orm(column_type = "Text", unique)]
    pub team_id: String,

    #[sea_orm(column_type = "Text")]
    pub team_name: String,

    /// OAuth user token
    #[sea_orm(column_type = "Text")]
    pub access_token: String,

    /// Bot token, preferred for API calls when present
    #[sea_orm(column_type = "Text", nullable)]
    pub bot_token: Option<String>,

    /// Access token expiry, when the platform reports one
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Soft-deactivation flag; inactive workspaces are excluded from
    /// sync and retrieval
    pub is_active: bool,

    pub member_count: i32,

    pub channel_count: i32,

    pub message_count: i64,

    /// High-water mark of the last successful sync
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Token to use for platform API calls
    pub fn api_token(&self) -> &str {
        self.bot_token.as_deref().unwrap_or(&self.access_token)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::channel::Entity")]
    Channel,

    #[sea_orm(has_many = "super::message::Entity")]
    Message,

    #[sea_orm(has_many = "super::sync_run::Entity")]
    SyncRun,
}

impl Related<super::channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Channel.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl Related<super::sync_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
