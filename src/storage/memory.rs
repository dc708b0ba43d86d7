// src/storage/memory.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::Result;
use crate::storage::TempStorage;
use crate::types::BoxFuture;

/// In-memory temp storage that records every write and delete.
#[derive(Debug, Clone, Default)]
pub struct MemoryTempStorage {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next: u64,
    files: HashMap<PathBuf, String>,
    deleted: Vec<PathBuf>,
}

impl MemoryTempStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// Paths still present.
    pub fn live_paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    /// Every delete call, in order, including repeats.
    pub fn deleted(&self) -> Vec<PathBuf> {
        self.lock().deleted.clone()
    }
}

impl TempStorage for MemoryTempStorage {
    fn write<'a>(&'a self, content: &'a str, extension: &'a str) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.next += 1;
            let path = PathBuf::from(format!("/mem/{}/script{extension}", state.next));
            state.files.insert(path.clone(), content.to_string());
            Ok(path)
        })
    }

    fn delete(&self, path: &Path) {
        let mut state = self.lock();
        state.files.remove(path);
        state.deleted.push(path.to_path_buf());
    }
}
