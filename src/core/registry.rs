// src/core/registry.rs

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::core::coordinator::ScanHandle;
use crate::core::models::{ScanId, ScanSnapshot};

/// Scans known to the caller, keyed by id.
///
/// Owned by whoever serves status queries and handed to the coordinator;
/// nothing in the engine reaches for a global.
#[derive(Debug, Default)]
pub struct ScanRegistry {
    scans: RwLock<HashMap<ScanId, ScanHandle>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: ScanHandle) {
        debug!(scan_id = %handle.id(), "Registering scan.");
        self.write().insert(handle.id(), handle);
    }

    pub fn get(&self, id: ScanId) -> Option<ScanHandle> {
        self.read().get(&id).cloned()
    }

    pub fn snapshot(&self, id: ScanId) -> Option<ScanSnapshot> {
        // Clone the handle first so the map lock is not held while the
        // snapshot is assembled.
        self.get(id).map(|handle| handle.snapshot())
    }

    /// Requests cancellation. Returns `false` for unknown ids.
    pub fn cancel(&self, id: ScanId) -> bool {
        match self.get(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: ScanId) -> Option<ScanHandle> {
        self.write().remove(&id)
    }

    /// Drops every scan that reached a terminal phase and returns their ids.
    pub fn prune_finished(&self) -> Vec<ScanId> {
        let mut scans = self.write();
        let finished: Vec<ScanId> = scans
            .iter()
            .filter(|(_, handle)| handle.phase().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            scans.remove(id);
        }
        finished
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ScanId, ScanHandle>> {
        self.scans.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ScanId, ScanHandle>> {
        self.scans.write().unwrap_or_else(|p| p.into_inner())
    }
}
