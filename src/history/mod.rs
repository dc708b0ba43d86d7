// src/history/mod.rs

//! Execution history: one record per submitted run, rewritten as the run
//! moves through its lifecycle.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::types::{BoxFuture, ExecutionStatus};

pub use memory::InMemoryHistoryStore;

pub type ExecutionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub script_id: String,
    pub script_name: String,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: Option<DateTime<Utc>>,
    /// The validated parameter bag as a JSON object.
    pub parameters_json: String,
    pub status: ExecutionStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub ran_by_user: String,
    pub email_sent: bool,
}

impl ExecutionRecord {
    /// Fresh `Queued` record with a new id.
    pub fn queued(
        script_id: impl Into<String>,
        script_name: impl Into<String>,
        parameters_json: impl Into<String>,
        ran_by_user: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            script_id: script_id.into(),
            script_name: script_name.into(),
            started_at_utc: Utc::now(),
            finished_at_utc: None,
            parameters_json: parameters_json.into(),
            status: ExecutionStatus::Queued,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            ran_by_user: ran_by_user.into(),
            email_sent: false,
        }
    }

    pub fn running(&self) -> Self {
        Self {
            status: ExecutionStatus::Running,
            ..self.clone()
        }
    }

    /// Terminal copy stamped with the finish time.
    pub fn finished(
        &self,
        status: ExecutionStatus,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            status,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            finished_at_utc: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn with_email_sent(&self) -> Self {
        Self {
            email_sent: true,
            ..self.clone()
        }
    }
}

/// Durable-ish store of execution records.
pub trait HistoryStore: Send + Sync {
    /// Persist a new record (upsert by id).
    fn store<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, Result<()>>;

    /// Rewrite an existing record (upsert by id). Status regressions are
    /// refused.
    fn update<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, Result<()>>;

    fn get<'a>(&'a self, id: ExecutionId) -> BoxFuture<'a, Result<Option<ExecutionRecord>>>;

    /// Up to `limit` records, most recent start first.
    fn query<'a>(&'a self, limit: usize) -> BoxFuture<'a, Result<Vec<ExecutionRecord>>>;
}
