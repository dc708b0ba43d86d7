// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

/// A script's metadata block is absent or incomplete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("metadata block missing")]
    MissingBlock,

    #[error("mandatory metadata fields missing: {0}")]
    MissingFields(String),
}

/// A caller-supplied parameter bag does not satisfy the script's contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter {0}")]
    MissingRequired(String),

    #[error("parameter {name} too long ({len} characters, max {max})")]
    TooLong { name: String, len: usize, max: usize },

    #[error("parameter {name} value conversion failed: {cause}")]
    Conversion { name: String, cause: String },

    #[error("invalid enum value '{value}' for {name}")]
    InvalidEnum { name: String, value: String },
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Metadata parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("git {command} exited with code {code}: {stderr}")]
    GitCommand {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("git {command} failed after {attempts} attempts: {last_error}")]
    GitRetriesExhausted {
        command: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("History store error: {0}")]
    History(String),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunnerError>;
