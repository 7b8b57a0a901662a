// autofix-orchestrator-rs/src/registry.rs
// At-most-once admission of failing runs

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Run ids accepted for processing. Entries are never removed; a run is
/// admitted at most once per registry.
#[derive(Debug, Default)]
pub struct ProcessedRunRegistry {
    admitted: Mutex<HashSet<String>>,
}

impl ProcessedRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-insert under one lock. Returns `true` only for the caller
    /// that inserted `run_id`.
    pub fn try_admit(&self, run_id: &str) -> bool {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        if admitted.contains(run_id) {
            return false;
        }
        admitted.insert(run_id.to_string())
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(run_id)
    }

    pub fn len(&self) -> usize {
        self.admitted.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
