// src/repository/provider.rs

//! Git-backed repository. Every fetch is a fresh shallow, blob-less clone
//! into a throwaway directory; results are cached for a short TTL.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{Result, RunnerError};
use crate::metadata::{self, ScriptMetadata};
use crate::repository::cache::TtlCache;
use crate::repository::git::GitClient;
use crate::repository::{Inventory, ScriptRepository};
use crate::types::{BoxFuture, ScriptKind};

/// Scratch clone directory, removed when dropped.
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %err, "could not remove clone directory");
        }
    }
}

#[derive(Debug)]
pub struct GitScriptRepository {
    git: GitClient,
    work_root: PathBuf,
    inventory: TtlCache<(), Inventory>,
    contents: TtlCache<String, String>,
}

impl GitScriptRepository {
    pub fn new(git: GitClient, ttl: Duration) -> Self {
        Self::with_work_root(git, ttl, std::env::temp_dir().join("scriptrunner-git"))
    }

    pub fn with_work_root(git: GitClient, ttl: Duration, work_root: PathBuf) -> Self {
        Self {
            git,
            work_root,
            inventory: TtlCache::new(ttl),
            contents: TtlCache::new(ttl),
        }
    }

    /// Drop every cached listing and script body.
    pub fn invalidate(&self) {
        self.inventory.clear();
        self.contents.clear();
    }

    async fn clone_into(&self, dir: &Path, cancel: &CancellationToken) -> Result<String> {
        let remote = self.git.remote();
        self.git
            .run_checked(
                &[
                    "clone",
                    "--depth=1",
                    "--no-checkout",
                    "--filter=blob:none",
                    "--branch",
                    remote.branch.as_str(),
                    remote.url.as_str(),
                    ".",
                ],
                dir,
                cancel,
            )
            .await?;

        let commit = self
            .git
            .run_checked(&["rev-parse", remote.branch.as_str()], dir, cancel)
            .await?;
        Ok(commit.trim().to_string())
    }

    async fn show(
        &self,
        dir: &Path,
        commit: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let object = format!("{commit}:{path}");
        self.git.run_checked(&["show", object.as_str()], dir, cancel).await
    }

    async fn fetch_inventory(&self, cancel: &CancellationToken) -> Result<Vec<ScriptMetadata>> {
        let workdir = WorkDir::create(&self.work_root)?;
        let dir = workdir.path();
        let commit = self.clone_into(dir, cancel).await?;

        let tree = self
            .git
            .run_checked(&["ls-tree", "-r", "-z", "--name-only", commit.as_str()], dir, cancel)
            .await?;

        let mut scripts = Vec::new();
        for path in tree
            .split('\0')
            .filter(|p| !p.is_empty() && ScriptKind::from_path(p).is_some())
        {
            let text = match self.show(dir, &commit, path, cancel).await {
                Ok(text) => text,
                Err(RunnerError::Cancelled) => return Err(RunnerError::Cancelled),
                Err(err) => {
                    warn!(path, error = %err, "skipping script that could not be fetched");
                    continue;
                }
            };
            match metadata::parse(&text) {
                Ok(meta) => scripts.push(meta.with_source_path(path)),
                Err(err) => warn!(path, error = %err, "skipping script with unusable metadata"),
            }
        }

        info!(count = scripts.len(), commit = %commit, "repository listing fetched");
        Ok(scripts)
    }

    async fn fetch_content(&self, path: &str, cancel: &CancellationToken) -> Result<String> {
        let workdir = WorkDir::create(&self.work_root)?;
        let commit = self.clone_into(workdir.path(), cancel).await?;
        self.show(workdir.path(), &commit, path, cancel).await
    }
}

impl ScriptRepository for GitScriptRepository {
    fn list_scripts<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Inventory>> {
        Box::pin(async move {
            if let Some(hit) = self.inventory.get(&()) {
                debug!("repository listing served from cache");
                return Ok(hit);
            }
            let scripts: Inventory = Arc::new(self.fetch_inventory(cancel).await?);
            self.inventory.insert((), scripts.clone());
            Ok(scripts)
        })
    }

    fn get_content<'a>(
        &'a self,
        id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let key = id.to_ascii_lowercase();
            if let Some(hit) = self.contents.get(&key) {
                debug!(id, "script content served from cache");
                return Ok(hit);
            }

            let Some(path) = self
                .get_metadata(id, cancel)
                .await?
                .and_then(|m| m.source_path)
            else {
                return Ok(String::new());
            };

            let text = self.fetch_content(&path, cancel).await?;
            self.contents.insert(key, text.clone());
            Ok(text)
        })
    }
}
