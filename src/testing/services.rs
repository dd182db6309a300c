//! Fake media library and background-task host

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{DualCamError, Result};
use crate::graph::AuthorizationStatus;
use crate::recording::{BackgroundTaskHost, BackgroundTaskId, MediaLibrary, ResourceKind};

/// Records saved paths; can be denied or made to fail.
#[derive(Debug)]
pub struct FakeMediaLibrary {
    authorization: AuthorizationStatus,
    fail_saves: bool,
    saved: Mutex<Vec<PathBuf>>,
}

impl Default for FakeMediaLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaLibrary {
    pub fn new() -> Self {
        Self {
            authorization: AuthorizationStatus::Authorized,
            fail_saves: false,
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn with_authorization(mut self, status: AuthorizationStatus) -> Self {
        self.authorization = status;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().expect("lock poisoned").clone()
    }
}

impl MediaLibrary for FakeMediaLibrary {
    fn authorization(&self) -> AuthorizationStatus {
        self.authorization
    }

    fn save(&self, path: &Path, _kind: ResourceKind) -> Result<()> {
        if self.fail_saves {
            return Err(DualCamError::MediaLibrary(format!(
                "library rejected {}",
                path.display()
            )));
        }
        self.saved
            .lock()
            .expect("lock poisoned")
            .push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TaskLedger {
    next: u64,
    active: BTreeSet<u64>,
    begun: u32,
    ended: u32,
}

/// Hands out background-task ids and tracks which are still open.
#[derive(Debug, Default)]
pub struct FakeBackgroundTaskHost {
    refuse: bool,
    ledger: Mutex<TaskLedger>,
}

impl FakeBackgroundTaskHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that never grants background time.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn active_count(&self) -> usize {
        self.ledger.lock().expect("lock poisoned").active.len()
    }

    pub fn begun(&self) -> u32 {
        self.ledger.lock().expect("lock poisoned").begun
    }

    pub fn ended(&self) -> u32 {
        self.ledger.lock().expect("lock poisoned").ended
    }
}

impl BackgroundTaskHost for FakeBackgroundTaskHost {
    fn begin(&self) -> Option<BackgroundTaskId> {
        if self.refuse {
            return None;
        }
        let mut ledger = self.ledger.lock().expect("lock poisoned");
        ledger.next += 1;
        let id = ledger.next;
        ledger.active.insert(id);
        ledger.begun += 1;
        Some(BackgroundTaskId(id))
    }

    fn end(&self, id: BackgroundTaskId) {
        let mut ledger = self.ledger.lock().expect("lock poisoned");
        if ledger.active.remove(&id.0) {
            ledger.ended += 1;
        } else {
            log::warn!("Background task {:?} ended twice or never began", id);
        }
    }
}
