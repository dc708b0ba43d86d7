// src/exec/backend.rs

//! Executor abstraction.
//!
//! The dispatcher talks to a `ScriptExecutor` instead of a concrete runner,
//! so tests can plug in a fake that records concurrency without spawning
//! anything.

use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::metadata::ScriptMetadata;
use crate::params::ParameterBag;
use crate::types::{BoxFuture, ExecutionStatus};

/// Everything an executor needs besides the script descriptor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Materialised copy of the script; executors delete it when done.
    pub script_path: PathBuf,
    pub parameters: ParameterBag,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(script_path: impl Into<PathBuf>, parameters: ParameterBag) -> Self {
        Self {
            script_path: script_path.into(),
            parameters,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of one attempt. `status` is always terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    /// Succeeded iff `exit_code == 0`.
    pub fn from_exit(exit_code: i32, stdout: String, stderr: String) -> Self {
        let status = if exit_code == 0 {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        };
        Self {
            exit_code,
            stdout,
            stderr,
            status,
        }
    }

    pub fn succeeded(stdout: String) -> Self {
        Self::from_exit(0, stdout, String::new())
    }

    /// Failure that never reached a normal exit: exit code -1, message on
    /// stderr.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: message.into(),
            status: ExecutionStatus::Failed,
        }
    }
}

/// Runs one materialised script to completion.
///
/// Implementations never fail: every error becomes a `Failed` result.
pub trait ScriptExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        metadata: &'a ScriptMetadata,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult>;
}
