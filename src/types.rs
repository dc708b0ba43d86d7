// src/types.rs

//! Small shared enums and aliases used across the crate.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Boxed, sendable future used at the trait seams (executors, stores,
/// process runners) so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// File extension of shell-interpreter scripts.
pub const SHELL_SCRIPT_EXTENSION: &str = ".ps1";

/// File extension of database scripts.
pub const DATABASE_SCRIPT_EXTENSION: &str = ".sql";

/// Parameter names starting with this prefix are internal and never rendered
/// into a shell invocation.
pub const RESERVED_PARAM_PREFIX: &str = "__";

/// Which executor a script is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Shell,
    Database,
}

impl ScriptKind {
    /// Extension used when materialising a script of this kind on disk.
    pub fn extension(self) -> &'static str {
        match self {
            ScriptKind::Shell => SHELL_SCRIPT_EXTENSION,
            ScriptKind::Database => DATABASE_SCRIPT_EXTENSION,
        }
    }

    /// Classify a repository path by extension (case-insensitive).
    ///
    /// Returns `None` for files that are not scripts.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(SHELL_SCRIPT_EXTENSION) {
            Some(ScriptKind::Shell)
        } else if lower.ends_with(DATABASE_SCRIPT_EXTENSION) {
            Some(ScriptKind::Database)
        } else {
            None
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Shell => f.write_str("shell"),
            ScriptKind::Database => f.write_str("database"),
        }
    }
}

/// Declared type of a script parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamType {
    #[default]
    String,
    Int,
    Decimal,
    Bool,
    DateTime,
    Enum,
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(ParamType::String),
            "int" => Ok(ParamType::Int),
            "decimal" => Ok(ParamType::Decimal),
            "bool" => Ok(ParamType::Bool),
            "datetime" => Ok(ParamType::DateTime),
            "enum" => Ok(ParamType::Enum),
            other => Err(format!("unknown parameter type: {other}")),
        }
    }
}

/// Lifecycle state of one execution.
///
/// Transitions only move forward: `Queued -> Running -> {Succeeded | Failed}`.
/// `Queued -> Failed` is allowed for jobs cancelled before admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Queued => 0,
            ExecutionStatus::Running => 1,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed => 2,
        }
    }

    /// Whether a record in `self` may be rewritten with status `next`.
    ///
    /// Re-writing the same status is allowed (e.g. flipping the notification
    /// flag on a terminal record); terminal states never change.
    pub fn can_advance_to(self, next: ExecutionStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Queued => "Queued",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Shape of the remote the repository is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoProvider {
    /// Plain git remote (GitHub or any https remote).
    #[default]
    #[serde(alias = "GitHub")]
    Github,
    /// Managed DevOps remote.
    #[serde(alias = "AzureDevOps")]
    AzureDevops,
}

impl FromStr for RepoProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "git" => Ok(RepoProvider::Github),
            "azure_devops" | "azuredevops" => Ok(RepoProvider::AzureDevops),
            other => Err(format!(
                "invalid repository provider: {other} (expected \"github\" or \"azure_devops\")"
            )),
        }
    }
}
