// src/storage/fs.rs

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::storage::TempStorage;
use crate::types::BoxFuture;

/// Temp storage on the local filesystem.
///
/// Each write gets its own directory: `<root>/<uuid>/script<ext>`.
#[derive(Debug, Clone)]
pub struct FsTempStorage {
    root: PathBuf,
}

impl FsTempStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<system temp>/scriptrunner`.
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("scriptrunner")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_under_root(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path != self.root
    }

    /// Remove per-execution directories last modified more than `max_age`
    /// ago. Returns how many were removed.
    pub fn sweep_orphans(&self, max_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(root = %self.root.display(), error = %err, "temp root not readable; nothing to sweep");
                return 0;
            }
        };
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if !path.is_dir() || !stale {
                continue;
            }
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove orphaned temp directory"),
            }
        }
        if removed > 0 {
            info!(removed, root = %self.root.display(), "swept orphaned temp directories");
        }
        removed
    }
}

impl Default for FsTempStorage {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

impl TempStorage for FsTempStorage {
    fn write<'a>(&'a self, content: &'a str, extension: &'a str) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let dir = self.root.join(Uuid::new_v4().to_string());
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(format!("script{extension}"));
            tokio::fs::write(&path, content).await?;
            debug!(path = %path.display(), "script materialised");
            Ok(path)
        })
    }

    fn delete(&self, path: &Path) {
        if path.is_dir() {
            if !self.is_under_root(path) {
                warn!(path = %path.display(), "refusing to delete directory outside temp root");
                return;
            }
            if let Err(err) = std::fs::remove_dir_all(path) {
                warn!(path = %path.display(), error = %err, "failed to delete temp directory");
            }
            return;
        }

        if path.is_file() {
            if let Err(err) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %err, "failed to delete temp script");
            }
        }

        // The per-write directory goes too, but only inside our root.
        if let Some(parent) = path.parent().filter(|p| self.is_under_root(p) && p.is_dir()) {
            if let Err(err) = std::fs::remove_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to delete temp directory");
            }
        }
    }
}
