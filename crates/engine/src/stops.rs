//! Cooperative stop flags for live runs
//!
//! One flag per run in this process. Cancellation raises the flag; the
//! orchestrator observes it at its next page boundary. Entries are
//! discarded when the run reaches a terminal state, so the registry only
//! ever holds flags for runs that are actually live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Per-run stop flags
#[derive(Clone, Default)]
pub struct StopFlags {
    flags: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl StopFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flag for a starting run.
    pub fn register(&self, run_id: Uuid) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.flags.lock().unwrap().insert(run_id, flag.clone());
        flag
    }

    /// Raise the stop flag for a run.
    ///
    /// Returns false when the run is not live in this process.
    pub fn raise(&self, run_id: Uuid) -> bool {
        match self.flags.lock().unwrap().remove(&run_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Drop the flag once the run reaches a terminal state.
    pub fn discard(&self, run_id: Uuid) {
        self.flags.lock().unwrap().remove(&run_id);
    }

    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.flags.lock().unwrap().contains_key(&run_id)
    }
}
