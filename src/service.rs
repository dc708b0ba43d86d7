// src/service.rs

//! Front door used by the CLI: look up, validate, materialise and submit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ConfigFile;
use crate::engine::{Dispatcher, ExecutionRequest};
use crate::errors::{Result, RunnerError};
use crate::exec::{DatabaseExecutor, ExecutorRouter, ShellExecutor};
use crate::history::{ExecutionId, ExecutionRecord, HistoryStore, InMemoryHistoryStore};
use crate::metadata::ScriptMetadata;
use crate::notify::LogNotifier;
use crate::params::{ParameterBag, validate};
use crate::repository::{
    GitClient, GitScriptRepository, Inventory, ProcessRunner, ScriptRepository, TokioProcessRunner,
};
use crate::storage::{FsTempStorage, TempStorage};

pub struct ScriptRunner {
    repository: Arc<dyn ScriptRepository>,
    storage: Arc<dyn TempStorage>,
    history: Arc<dyn HistoryStore>,
    dispatcher: Dispatcher,
}

impl ScriptRunner {
    pub fn new(
        repository: Arc<dyn ScriptRepository>,
        storage: Arc<dyn TempStorage>,
        history: Arc<dyn HistoryStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            repository,
            storage,
            history,
            dispatcher,
        }
    }

    /// Production wiring: git repository, filesystem temp storage, shell and
    /// database executors behind the router, in-memory history.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let storage: Arc<dyn TempStorage> = Arc::new(FsTempStorage::new(cfg.storage.temp_root()));
        let processes: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);

        let git = GitClient::new(
            cfg.repository.git_path.clone(),
            cfg.repository.active_remote().to_git_remote(),
            Arc::clone(&processes),
        );
        let repository = Arc::new(GitScriptRepository::new(git, cfg.repository.cache_ttl()));

        let shell = Arc::new(ShellExecutor::new(
            cfg.shell_options(),
            processes,
            Arc::clone(&storage),
        ));
        let database = Arc::new(DatabaseExecutor::new(
            cfg.database.connections.clone(),
            Arc::clone(&storage),
        ));
        let executor = Arc::new(ExecutorRouter::new(shell, database));

        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let dispatcher = Dispatcher::new(
            executor,
            Arc::clone(&history),
            Arc::new(LogNotifier),
            Arc::clone(&storage),
            cfg.dispatcher_options(),
        );

        Self::new(repository, storage, history, dispatcher)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Inventory> {
        self.repository.list_scripts(cancel).await
    }

    pub async fn metadata(&self, id: &str, cancel: &CancellationToken) -> Result<ScriptMetadata> {
        self.repository
            .get_metadata(id, cancel)
            .await?
            .ok_or_else(|| RunnerError::ScriptNotFound(id.to_string()))
    }

    pub async fn content(&self, id: &str, cancel: &CancellationToken) -> Result<String> {
        let text = self.repository.get_content(id, cancel).await?;
        if text.is_empty() {
            return Err(RunnerError::ScriptNotFound(id.to_string()));
        }
        Ok(text)
    }

    /// Validate `parameters` against the script, write it to temp storage
    /// and hand it to the dispatcher.
    pub async fn submit(
        &self,
        id: &str,
        mut parameters: ParameterBag,
        ran_by: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionId> {
        let metadata = self.metadata(id, cancel).await?;
        validate(&metadata, &mut parameters)?;
        let text = self.content(&metadata.id, cancel).await?;

        let script_path = self.storage.write(&text, metadata.kind().extension()).await?;
        info!(script = %metadata.id, path = %script_path.display(), "script materialised for execution");

        self.dispatcher
            .submit(ExecutionRequest {
                metadata,
                script_path,
                parameters,
                ran_by: ran_by.to_string(),
            })
            .await
    }

    pub async fn record(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>> {
        self.history.get(id).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.history.query(limit).await
    }
}
