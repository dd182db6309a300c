//! Hand-off of finished recordings to the media library
//!
//! A background-task token is taken when recording starts and must be
//! released exactly once, after the save completes or fails.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{DualCamError, Result};
use crate::graph::AuthorizationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
}

/// Destination for finished movie files.
pub trait MediaLibrary: Send + Sync {
    fn authorization(&self) -> AuthorizationStatus;
    /// Copy or move `path` into the library.
    fn save(&self, path: &Path, kind: ResourceKind) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackgroundTaskId(pub u64);

/// Lets in-flight work finish after the app is backgrounded.
pub trait BackgroundTaskHost: Send + Sync {
    /// `None` when the host refuses more background time.
    fn begin(&self) -> Option<BackgroundTaskId>;
    fn end(&self, id: BackgroundTaskId);
}

/// Scoped background-task token; ends the task on drop.
pub struct BackgroundTaskGuard {
    host: Arc<dyn BackgroundTaskHost>,
    id: Option<BackgroundTaskId>,
}

impl BackgroundTaskGuard {
    pub fn begin(host: Arc<dyn BackgroundTaskHost>) -> Self {
        let id = host.begin();
        if id.is_none() {
            log::warn!("Background task refused; recording may be cut short if backgrounded");
        }
        Self { host, id }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// End the task now. Further calls, and the eventual drop, do nothing.
    pub fn end(&mut self) {
        if let Some(id) = self.id.take() {
            self.host.end(id);
        }
    }
}

impl Drop for BackgroundTaskGuard {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for BackgroundTaskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTaskGuard")
            .field("id", &self.id)
            .finish()
    }
}

/// Save a finished recording and release its background task.
///
/// On success the temporary file is removed. When the library is not
/// authorized or the save fails the file is kept so nothing is lost.
pub fn save_recording(
    library: &dyn MediaLibrary,
    path: &Path,
    mut guard: BackgroundTaskGuard,
) -> Result<()> {
    let result = save_and_clean_up(library, path);
    guard.end();
    result
}

fn save_and_clean_up(library: &dyn MediaLibrary, path: &Path) -> Result<()> {
    match library.authorization() {
        AuthorizationStatus::Authorized => {}
        status => {
            log::warn!(
                "Media library not authorized ({:?}); keeping {:?}",
                status,
                path
            );
            return Err(DualCamError::MediaLibrary(format!(
                "not authorized to save to the media library; recording kept at {}",
                path.display()
            )));
        }
    }

    if let Err(e) = library.save(path, ResourceKind::Video) {
        log::error!("Could not save movie to media library: {}", e);
        return Err(DualCamError::MediaLibrary(format!(
            "{}; recording kept at {}",
            e,
            path.display()
        )));
    }

    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("Could not remove temporary recording {:?}: {}", path, e);
    }
    log::info!("Saved recording {:?} to media library", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingHost {
        ended: Mutex<Vec<BackgroundTaskId>>,
    }

    impl BackgroundTaskHost for CountingHost {
        fn begin(&self) -> Option<BackgroundTaskId> {
            Some(BackgroundTaskId(7))
        }

        fn end(&self, id: BackgroundTaskId) {
            self.ended.lock().unwrap().push(id);
        }
    }

    #[test]
    fn test_guard_ends_once() {
        let host = Arc::new(CountingHost::default());
        let mut guard = BackgroundTaskGuard::begin(host.clone());
        assert!(guard.is_active());
        guard.end();
        guard.end();
        drop(guard);
        assert_eq!(*host.ended.lock().unwrap(), vec![BackgroundTaskId(7)]);
    }

    #[test]
    fn test_guard_ends_on_drop() {
        let host = Arc::new(CountingHost::default());
        {
            let _guard = BackgroundTaskGuard::begin(host.clone());
        }
        assert_eq!(host.ended.lock().unwrap().len(), 1);
    }
}
