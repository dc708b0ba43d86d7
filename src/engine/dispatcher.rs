// src/engine/dispatcher.rs

//! Bounded-concurrency execution dispatcher.
//!
//! `submit` records the run as `Queued` and returns immediately. A worker
//! task then waits for one of `max_concurrent` slots, marks the run
//! `Running`, hands it to the executor, and writes the terminal record.
//! Slots are handed out first-come first-served.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::engine::output::truncate_output;
use crate::errors::{Result, RunnerError};
use crate::exec::{ExecutionContext, ExecutionResult, ScriptExecutor};
use crate::history::{ExecutionId, ExecutionRecord, HistoryStore};
use crate::metadata::ScriptMetadata;
use crate::notify::Notifier;
use crate::params::{ParameterBag, bag_to_json};
use crate::storage::TempStorage;
use crate::types::ExecutionStatus;

/// Stderr of runs cancelled while still waiting for a slot.
pub const CANCELLED_BEFORE_ADMISSION: &str = "execution cancelled before admission";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Upper bound on simultaneously running executions (at least 1).
    pub max_concurrent: usize,
    /// Stdout/stderr are cut to this many characters before recording.
    pub output_truncation: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            output_truncation: 10_000,
        }
    }
}

/// One validated run waiting to be dispatched.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub metadata: ScriptMetadata,
    /// Materialised script; owned by the run from here on.
    pub script_path: PathBuf,
    pub parameters: ParameterBag,
    pub ran_by: String,
}

/// Cheap to clone; all clones share the same slots and workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    executor: Arc<dyn ScriptExecutor>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
    storage: Arc<dyn TempStorage>,
    slots: Arc<Semaphore>,
    options: DispatcherOptions,
    tracker: TaskTracker,
    stop: CancellationToken,
    active: Mutex<HashMap<ExecutionId, CancellationToken>>,
}

/// Removes a run from the cancellation registry however its worker exits.
struct ActiveEntry {
    inner: Arc<Inner>,
    id: ExecutionId,
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        self.inner.active_runs().remove(&self.id);
    }
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn ScriptExecutor>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn TempStorage>,
        options: DispatcherOptions,
    ) -> Self {
        let options = DispatcherOptions {
            max_concurrent: options.max_concurrent.max(1),
            ..options
        };
        Self {
            inner: Arc::new(Inner {
                executor,
                history,
                notifier,
                storage,
                slots: Arc::new(Semaphore::new(options.max_concurrent)),
                options,
                tracker: TaskTracker::new(),
                stop: CancellationToken::new(),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn options(&self) -> DispatcherOptions {
        self.inner.options
    }

    /// Record the run as `Queued` and schedule it. Returns once the record
    /// is stored; execution happens in the background.
    ///
    /// Fails only if the queued record cannot be stored or the dispatcher
    /// is shutting down. In both cases the materialised script is removed.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionId> {
        let inner = &self.inner;
        if inner.tracker.is_closed() {
            inner.storage.delete(&request.script_path);
            return Err(RunnerError::ShuttingDown);
        }

        let parameters_json = match bag_to_json(&request.parameters) {
            Ok(json) => json,
            Err(err) => {
                inner.storage.delete(&request.script_path);
                return Err(err.into());
            }
        };
        let record = ExecutionRecord::queued(
            &request.metadata.id,
            &request.metadata.name,
            parameters_json,
            &request.ran_by,
        );
        if let Err(err) = inner.history.store(&record).await {
            inner.storage.delete(&request.script_path);
            return Err(err);
        }

        let id = record.execution_id;
        let cancel = inner.stop.child_token();
        inner.active_runs().insert(id, cancel.clone());
        info!(
            execution = %id,
            script = %record.script_id,
            user = %record.ran_by_user,
            "execution queued"
        );

        let worker = Arc::clone(inner);
        inner
            .tracker
            .spawn(async move { worker.run(record, request, cancel).await });
        Ok(id)
    }

    /// Cancel a queued or running execution. Returns `false` if it is
    /// unknown or already finished.
    pub fn cancel(&self, id: ExecutionId) -> bool {
        match self.inner.active_runs().get(&id) {
            Some(token) => {
                info!(execution = %id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs that are queued or running.
    pub fn in_flight(&self) -> usize {
        self.inner.active_runs().len()
    }

    /// Slots not currently held by a running execution.
    pub fn available_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Stop accepting work and wait for every submitted run to finish.
    pub async fn shutdown(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("dispatcher drained");
    }

    /// Stop accepting work, cancel everything in flight, and wait for the
    /// workers to record their outcome.
    pub async fn abandon(&self) {
        self.inner.tracker.close();
        self.inner.stop.cancel();
        self.inner.tracker.wait().await;
        debug!("dispatcher abandoned in-flight work");
    }
}

impl Inner {
    fn active_runs(&self) -> MutexGuard<'_, HashMap<ExecutionId, CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn persist(&self, record: &ExecutionRecord) {
        if let Err(err) = self.history.update(record).await {
            error!(execution = %record.execution_id, status = %record.status, error = %err, "failed to record execution state");
        }
    }

    async fn notify(&self, record: &ExecutionRecord) {
        if self.notifier.send_results(record).await {
            self.persist(&record.with_email_sent()).await;
        }
    }

    async fn run(self: Arc<Self>, record: ExecutionRecord, request: ExecutionRequest, cancel: CancellationToken) {
        let id = record.execution_id;
        let entry = ActiveEntry {
            inner: Arc::clone(&self),
            id,
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            info!(execution = %id, "execution cancelled before admission");
            self.storage.delete(&request.script_path);
            let failed = record.finished(ExecutionStatus::Failed, -1, "", CANCELLED_BEFORE_ADMISSION);
            self.persist(&failed).await;
            drop(entry);
            self.notify(&failed).await;
            return;
        };

        let running = record.running();
        self.persist(&running).await;
        info!(execution = %id, script = %running.script_id, "execution started");

        let ExecutionRequest {
            metadata,
            script_path,
            parameters,
            ..
        } = request;
        let ctx = ExecutionContext {
            script_path: script_path.clone(),
            parameters,
            cancel,
        };
        let executor = Arc::clone(&self.executor);
        let result = match tokio::spawn(async move { executor.execute(&metadata, &ctx).await }).await {
            Ok(result) => result,
            Err(err) => {
                error!(execution = %id, error = %err, "executor crashed");
                self.storage.delete(&script_path);
                ExecutionResult::error(format!("executor crashed: {err}"))
            }
        };

        let limit = self.options.output_truncation;
        let finished = running.finished(
            result.status,
            result.exit_code,
            truncate_output(&result.stdout, limit),
            truncate_output(&result.stderr, limit),
        );
        self.persist(&finished).await;
        // Terminal from here on; nothing left to cancel.
        drop(entry);
        drop(permit);

        match finished.status {
            ExecutionStatus::Succeeded => info!(execution = %id, "execution succeeded"),
            _ => warn!(execution = %id, exit_code = finished.exit_code, "execution failed"),
        }
        self.notify(&finished).await;
    }
}
