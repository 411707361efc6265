//! Sync run progress tracking
//!
//! A run moves through fixed stages; counters and per-channel outcomes
//! accumulate as pages are processed. Snapshots are serialized into the
//! run row after every page, so progress survives a crash and can be
//! polled while the run is live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use threadline_common::db::models::SyncRun;

/// Item errors kept in a snapshot; older ones are dropped beyond this.
const MAX_RECORDED_ERRORS: usize = 100;

/// Pipeline stage of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Initializing,
    WorkspaceMeta,
    Members,
    Channels,
    Messages,
    Threads,
    Files,
    Completed,
    Failed,
}

impl SyncStage {
    /// Parse a persisted stage name; unknown names map to Initializing.
    pub fn parse(name: &str) -> Self {
        match name {
            "workspace_meta" => SyncStage::WorkspaceMeta,
            "members" => SyncStage::Members,
            "channels" => SyncStage::Channels,
            "messages" => SyncStage::Messages,
            "threads" => SyncStage::Threads,
            "files" => SyncStage::Files,
            "completed" => SyncStage::Completed,
            "failed" => SyncStage::Failed,
            _ => SyncStage::Initializing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Initializing => "initializing",
            SyncStage::WorkspaceMeta => "workspace_meta",
            SyncStage::Members => "members",
            SyncStage::Channels => "channels",
            SyncStage::Messages => "messages",
            SyncStage::Threads => "threads",
            SyncStage::Files => "files",
            SyncStage::Completed => "completed",
            SyncStage::Failed => "failed",
        }
    }
}

/// Counters for one entity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounters {
    pub processed: u64,
    pub new: u64,
    pub duplicate: u64,
    pub errors: u64,
}

impl EntityCounters {
    /// Count one upserted item
    pub fn record(&mut self, is_new: bool) {
        self.processed += 1;
        if is_new {
            self.new += 1;
        } else {
            self.duplicate += 1;
        }
    }

    /// Count one skipped item
    pub fn record_error(&mut self) {
        self.processed += 1;
        self.errors += 1;
    }
}

/// Counters across all synced entity types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    pub members: EntityCounters,
    pub channels: EntityCounters,
    pub messages: EntityCounters,
    pub threads: EntityCounters,
    pub files: EntityCounters,
    pub reactions: EntityCounters,
}

/// Terminal outcome for one channel within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOutcome {
    Ok,
    Errored,
}

/// Per-channel sync detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDetail {
    pub channel_id: String,
    pub name: String,
    pub outcome: ChannelOutcome,
    pub pages: u32,
    pub messages: u64,
    pub error: Option<String>,
}

/// An item-level error recorded without failing the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub entity: String,
    pub id: String,
    pub message: String,
}

/// Serializable snapshot of a running (or finished) sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub run_id: Uuid,
    pub workspace_id: Uuid,
    pub full_sync: bool,
    pub stage: SyncStage,

    /// Channel being fetched right now, during the message stage
    pub current_channel: Option<String>,

    /// Non-archived channels queued for history fetching
    pub total_channels: u64,
    pub completed_channels: u64,

    pub started_at: DateTime<Utc>,

    /// Seconds since the run started, materialized at publish time so
    /// persisted snapshots and remote observers carry it
    pub elapsed_secs: u64,

    /// Rough seconds remaining, from channel completion pace
    pub estimated_remaining_secs: Option<u64>,

    pub counters: SyncCounters,
    pub channels: Vec<ChannelDetail>,
    pub errors: Vec<ItemError>,
}

impl SyncProgress {
    pub fn new(run_id: Uuid, workspace_id: Uuid, full_sync: bool) -> Self {
        Self {
            run_id,
            workspace_id,
            full_sync,
            stage: SyncStage::Initializing,
            current_channel: None,
            total_channels: 0,
            completed_channels: 0,
            started_at: Utc::now(),
            elapsed_secs: 0,
            estimated_remaining_secs: None,
            counters: SyncCounters::default(),
            channels: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Wall-clock time since the run started
    pub fn elapsed(&self) -> std::time::Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Rough remaining time, extrapolated from channel completion pace.
    ///
    /// None until at least one channel has finished, and once every
    /// channel is done.
    pub fn estimated_remaining(&self) -> Option<std::time::Duration> {
        if self.completed_channels == 0 || self.completed_channels >= self.total_channels {
            return None;
        }

        let per_channel = self.elapsed().as_secs_f64() / self.completed_channels as f64;
        let remaining = (self.total_channels - self.completed_channels) as f64 * per_channel;
        Some(std::time::Duration::from_secs_f64(remaining))
    }

    /// Refresh the materialized timing fields; called before every publish.
    pub fn refresh_timing(&mut self) {
        self.elapsed_secs = self.elapsed().as_secs();
        self.estimated_remaining_secs = self.estimated_remaining().map(|d| d.as_secs());
    }

    /// Rebuild a snapshot from a persisted run row.
    ///
    /// Serves progress queries for runs not live in this process, such
    /// as after a restart. Every field here is written by the snapshot
    /// persistence path, so nothing is lost beyond the current-channel
    /// marker.
    pub fn from_run(run: &SyncRun) -> Self {
        let channels: Vec<ChannelDetail> =
            serde_json::from_value(run.channel_details.clone()).unwrap_or_default();

        let mut progress = Self::new(run.id, run.workspace_id, run.full_sync);
        progress.stage = SyncStage::parse(&run.stage);
        progress.started_at = run.started_at.into();
        progress.counters = serde_json::from_value(run.counters.clone()).unwrap_or_default();
        progress.errors = serde_json::from_value(run.errors.clone()).unwrap_or_default();
        progress.total_channels = channels.len() as u64;
        progress.completed_channels = channels.len() as u64;
        progress.channels = channels;

        match run.finished_at {
            Some(finished) => {
                let end: DateTime<Utc> = finished.into();
                progress.elapsed_secs = (end - progress.started_at).num_seconds().max(0) as u64;
            }
            None => progress.refresh_timing(),
        }

        progress
    }

    /// Record an item error, bounded so pathological runs stay small
    pub fn push_error(&mut self, entity: &str, id: &str, message: &str) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(ItemError {
                entity: entity.to_string(),
                id: id.to_string(),
                message: message.to_string(),
            });
        }
    }

    pub fn total_errors(&self) -> u64 {
        let c = &self.counters;
        c.members.errors
            + c.channels.errors
            + c.messages.errors
            + c.threads.errors
            + c.files.errors
            + c.reactions.errors
    }
}

/// Receives progress snapshots as a run advances.
///
/// Called after every processed page; implementations must be cheap.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &SyncProgress);
}

/// Observer that discards all snapshots
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_progress(&self, _progress: &SyncProgress) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_split_new_and_duplicate() {
        let mut counters = EntityCounters::default();
        counters.record(true);
        counters.record(true);
        counters.record(false);
        counters.record_error();

        assert_eq!(counters.processed, 4);
        assert_eq!(counters.new, 2);
        assert_eq!(counters.duplicate, 1);
        assert_eq!(counters.errors, 1);
    }

    #[test]
    fn error_list_is_bounded() {
        let mut progress = SyncProgress::new(Uuid::new_v4(), Uuid::new_v4(), true);
        for i in 0..(MAX_RECORDED_ERRORS + 50) {
            progress.push_error("message", &i.to_string(), "boom");
        }
        assert_eq!(progress.errors.len(), MAX_RECORDED_ERRORS);
    }

    #[test]
    fn remaining_estimate_needs_a_completed_channel() {
        let mut progress = SyncProgress::new(Uuid::new_v4(), Uuid::new_v4(), true);
        progress.total_channels = 4;
        assert!(progress.estimated_remaining().is_none());

        progress.started_at = Utc::now() - chrono::Duration::seconds(10);
        progress.completed_channels = 2;
        let remaining = progress.estimated_remaining().unwrap();
        assert!(remaining.as_secs() >= 8 && remaining.as_secs() <= 12);

        progress.completed_channels = 4;
        assert!(progress.estimated_remaining().is_none());
    }

    #[test]
    fn snapshot_rebuilds_from_a_persisted_run_row() {
        let mut counters = SyncCounters::default();
        counters.messages.record(true);
        counters.messages.record(false);

        let detail = ChannelDetail {
            channel_id: "C01".to_string(),
            name: "general".to_string(),
            outcome: ChannelOutcome::Ok,
            pages: 2,
            messages: 2,
            error: None,
        };

        let started = Utc::now() - chrono::Duration::seconds(60);
        let run = SyncRun {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            status: "completed".to_string(),
            stage: "completed".to_string(),
            full_sync: false,
            counters: serde_json::to_value(counters).unwrap(),
            channel_details: serde_json::to_value(vec![detail]).unwrap(),
            errors: serde_json::json!([]),
            started_at: started.into(),
            finished_at: Some((started + chrono::Duration::seconds(25)).into()),
            error_message: None,
            created_at: started.into(),
            updated_at: started.into(),
        };

        let progress = SyncProgress::from_run(&run);

        assert_eq!(progress.run_id, run.id);
        assert_eq!(progress.stage, SyncStage::Completed);
        assert!(!progress.full_sync);
        assert_eq!(progress.counters.messages.processed, 2);
        assert_eq!(progress.channels.len(), 1);
        assert_eq!(progress.channels[0].channel_id, "C01");
        assert_eq!(progress.total_channels, 1);
        assert_eq!(progress.elapsed_secs, 25);
        assert!(progress.errors.is_empty());
    }

    #[test]
    fn timing_fields_materialize_on_refresh() {
        let mut progress = SyncProgress::new(Uuid::new_v4(), Uuid::new_v4(), true);
        progress.started_at = Utc::now() - chrono::Duration::seconds(20);
        progress.total_channels = 4;
        progress.completed_channels = 2;

        progress.refresh_timing();

        assert!(progress.elapsed_secs >= 19);
        let remaining = progress.estimated_remaining_secs.unwrap();
        assert!((18..=22).contains(&remaining));
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(SyncStage::WorkspaceMeta.as_str(), "workspace_meta");
        assert_eq!(SyncStage::Completed.as_str(), "completed");
    }
}
