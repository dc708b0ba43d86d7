// src/repository/memory.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::Result;
use crate::metadata::{self, ScriptMetadata};
use crate::repository::{Inventory, ScriptRepository};
use crate::types::BoxFuture;

/// Fixed set of scripts held in memory. Useful for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct InMemoryScriptRepository {
    scripts: Inventory,
    contents: Arc<Vec<(String, String)>>,
}

impl InMemoryScriptRepository {
    /// Build from `(path, text)` pairs; files whose metadata does not parse
    /// are skipped, as the git repository does.
    pub fn from_files<I, P, T>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        let mut scripts = Vec::new();
        let mut contents = Vec::new();
        for (path, text) in files {
            let (path, text) = (path.into(), text.into());
            match metadata::parse(&text) {
                Ok(meta) => {
                    contents.push((meta.id.to_ascii_lowercase(), text));
                    scripts.push(meta.with_source_path(path));
                }
                Err(err) => warn!(path = %path, error = %err, "skipping script with unusable metadata"),
            }
        }
        Self {
            scripts: Arc::new(scripts),
            contents: Arc::new(contents),
        }
    }

    pub fn scripts(&self) -> &[ScriptMetadata] {
        &self.scripts
    }
}

impl ScriptRepository for InMemoryScriptRepository {
    fn list_scripts<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Inventory>> {
        Box::pin(async move { Ok(self.scripts.clone()) })
    }

    fn get_content<'a>(
        &'a self,
        id: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let key = id.to_ascii_lowercase();
            Ok(self
                .contents
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, text)| text.clone())
                .unwrap_or_default())
        })
    }
}
