// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RunnerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunnerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_execution(cfg)?;
    validate_repository(cfg)?;
    validate_connections(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> RunnerError {
    RunnerError::ConfigError(msg.into())
}

fn validate_execution(cfg: &RawConfigFile) -> Result<()> {
    if cfg.execution.max_concurrent == 0 {
        return Err(config_error("[execution].max_concurrent must be >= 1 (got 0)"));
    }
    if cfg.execution.output_truncation == 0 {
        return Err(config_error("[execution].output_truncation must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_repository(cfg: &RawConfigFile) -> Result<()> {
    let repo = &cfg.repository;
    if repo.cache_ttl_secs == 0 {
        return Err(config_error("[repository].cache_ttl_secs must be >= 1 (got 0)"));
    }

    let remote = repo.active_remote();
    if remote.url.trim().is_empty() {
        return Err(config_error(format!(
            "[repository] provider {:?} selected but its url is empty",
            repo.provider
        )));
    }
    if remote.branch.trim().is_empty() {
        return Err(config_error("[repository] branch must not be empty"));
    }
    if let Some(var) = remote
        .token
        .as_deref()
        .and_then(|t| t.trim().strip_prefix("env:"))
    {
        if var.trim().is_empty() {
            return Err(config_error("[repository] token \"env:\" needs a variable name"));
        }
    }
    Ok(())
}

fn validate_connections(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for conn in &cfg.database.connections {
        if conn.name.trim().is_empty() {
            return Err(config_error("[[database.connections]] entry without a name"));
        }
        if conn.connection_string.trim().is_empty() {
            return Err(config_error(format!(
                "database connection '{}' has an empty connection_string",
                conn.name
            )));
        }
        if !seen.insert(conn.name.to_ascii_lowercase()) {
            return Err(config_error(format!(
                "duplicate database connection name '{}'",
                conn.name
            )));
        }
    }
    Ok(())
}
