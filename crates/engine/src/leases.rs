//! In-process run leases
//!
//! One live sync per workspace within this process. The database active-run
//! check covers other processes; the lease closes the window between the
//! check and the run row insert inside this one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use threadline_common::errors::{Result, SyncError};

/// Per-workspace run leases
#[derive(Clone, Default)]
pub struct RunLeases {
    held: Arc<Mutex<HashSet<Uuid>>>,
}

impl RunLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for a workspace; fails if one is already held.
    pub fn acquire(&self, workspace_id: Uuid) -> Result<()> {
        let mut held = self.held.lock().unwrap();
        if !held.insert(workspace_id) {
            return Err(SyncError::RunActive { workspace_id });
        }
        Ok(())
    }

    /// Release the lease after the run reaches a terminal state.
    pub fn release(&self, workspace_id: Uuid) {
        self.held.lock().unwrap().remove(&workspace_id);
    }

    pub fn is_held(&self, workspace_id: Uuid) -> bool {
        self.held.lock().unwrap().contains(&workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected() {
        let leases = RunLeases::new();
        let ws = Uuid::new_v4();

        leases.acquire(ws).unwrap();
        assert!(matches!(
            leases.acquire(ws),
            Err(SyncError::RunActive { workspace_id }) if workspace_id == ws
        ));
    }

    #[test]
    fn release_allows_reacquire() {
        let leases = RunLeases::new();
        let ws = Uuid::new_v4();

        leases.acquire(ws).unwrap();
        leases.release(ws);
        leases.acquire(ws).unwrap();
    }

    #[test]
    fn leases_are_per_workspace() {
        let leases = RunLeases::new();
        leases.acquire(Uuid::new_v4()).unwrap();
        leases.acquire(Uuid::new_v4()).unwrap();
    }
}
