// src/repository/mod.rs

//! Script repositories: where script descriptors and their text come from.

pub mod cache;
pub mod git;
pub mod memory;
pub mod process;
pub mod provider;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::metadata::ScriptMetadata;
use crate::types::BoxFuture;

pub use cache::TtlCache;
pub use git::{GitClient, GitRemote};
pub use memory::InMemoryScriptRepository;
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use provider::GitScriptRepository;

/// Every parseable script currently in the repository.
pub type Inventory = Arc<Vec<ScriptMetadata>>;

pub trait ScriptRepository: Send + Sync {
    /// All scripts whose metadata parses. Unparseable files are skipped.
    fn list_scripts<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Inventory>>;

    /// Full script text, or an empty string for an unknown id.
    fn get_content<'a>(
        &'a self,
        id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>>;

    /// Descriptor for `id` (case-insensitive), if listed.
    fn get_metadata<'a>(
        &'a self,
        id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<ScriptMetadata>>> {
        Box::pin(async move {
            let scripts = self.list_scripts(cancel).await?;
            Ok(scripts.iter().find(|m| m.matches_id(id)).cloned())
        })
    }
}
