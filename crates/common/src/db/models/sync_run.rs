//! Sync run entity
//!
//! One row per orchestrated sync. Progress snapshots (stage, counters,
//! per-channel details, item errors) are persisted as jsonb so a run
//! interrupted by a crash still shows its last known state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Run status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Pending => "pending".to_string(),
            RunStatus::Running => "running".to_string(),
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub workspace_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Current pipeline stage name
    #[sea_orm(column_type = "Text")]
    pub stage: String,

    /// Full sync (from the beginning of history) vs incremental
    pub full_sync: bool,

    /// Per-entity counters: processed / new / duplicate / errors
    #[sea_orm(column_type = "JsonBinary")]
    pub counters: Json,

    /// Per-channel outcomes
    #[sea_orm(column_type = "JsonBinary")]
    pub channel_details: Json,

    /// Item-level errors recorded without failing the run
    #[sea_orm(column_type = "JsonBinary")]
    pub errors: Json,

    pub started_at: DateTimeWithTimeZone,

    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Fatal error that ended the run, when status is failed
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the run status as an enum
    pub fn run_status(&self) -> RunStatus {
        RunStatus::from(self.status.clone())
    }

    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.run_status(), RunStatus::Completed | RunStatus::Failed)
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
}

impl Related<super::workspace::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workspace.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            let s: String = status.into();
            assert_eq!(RunStatus::from(s), status);
        }
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        assert_eq!(RunStatus::from("bogus".to_string()), RunStatus::Pending);
    }
}
