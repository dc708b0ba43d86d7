// src/storage/mod.rs

//! Short-lived on-disk copies of scripts handed to executors.

pub mod fs;
pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::types::BoxFuture;

pub use fs::FsTempStorage;
pub use memory::MemoryTempStorage;

/// Materialises script text as a uniquely named file and removes it again.
pub trait TempStorage: Send + Sync + fmt::Debug {
    /// Write `content` to a fresh file ending in `extension` (e.g. `.ps1`).
    fn write<'a>(&'a self, content: &'a str, extension: &'a str) -> BoxFuture<'a, Result<PathBuf>>;

    /// Remove a file written by [`write`](Self::write) along with its
    /// private directory. Missing paths are ignored and errors are logged,
    /// never returned.
    fn delete(&self, path: &Path);
}
