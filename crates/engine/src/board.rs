//! Live progress board
//!
//! Keeps the latest progress snapshot per run so status queries can be
//! answered without a database round trip while a run is in flight.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use threadline_sync::progress::{ProgressObserver, SyncProgress};

/// Latest snapshot per run
#[derive(Default)]
pub struct ProgressBoard {
    latest: Mutex<HashMap<Uuid, SyncProgress>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, run_id: Uuid) -> Option<SyncProgress> {
        self.latest.lock().unwrap().get(&run_id).cloned()
    }

    pub fn clear(&self, run_id: Uuid) {
        self.latest.lock().unwrap().remove(&run_id);
    }
}

impl ProgressObserver for ProgressBoard {
    fn on_progress(&self, progress: &SyncProgress) {
        self.latest
            .lock()
            .unwrap()
            .insert(progress.run_id, progress.clone());
    }
}
