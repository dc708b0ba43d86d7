// src/exec/interpreter.rs

//! Locating the shell interpreter.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::errors::{Result, RunnerError};

/// Executable name of the cross-platform interpreter.
pub fn modern_interpreter_name() -> String {
    format!("pwsh{}", std::env::consts::EXE_SUFFIX)
}

/// Search `path_var` (a PATH-style list) for `exe`.
pub fn find_on_path(exe: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(path_var)
        .map(|dir| dir.join(exe))
        .find(|candidate| candidate.is_file())
}

/// Inputs to interpreter resolution, split out so it can be tested without
/// touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct InterpreterSearch<'a> {
    pub configured: Option<&'a Path>,
    pub path_var: Option<&'a OsStr>,
    pub allow_legacy: bool,
    /// `%SystemRoot%`, for the legacy Windows install location.
    pub system_root: Option<&'a Path>,
}

impl InterpreterSearch<'_> {
    /// Configured path, then the modern interpreter on PATH, then (Windows
    /// only, when allowed) the legacy interpreter.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self.configured.filter(|p| p.is_file()) {
            return Ok(path.to_path_buf());
        }

        if let Some(found) = find_on_path(&modern_interpreter_name(), self.path_var) {
            return Ok(found);
        }

        if cfg!(windows) && self.allow_legacy {
            if let Some(found) = find_on_path("powershell.exe", self.path_var) {
                return Ok(found);
            }
            if let Some(root) = self.system_root {
                let legacy = root
                    .join("System32")
                    .join("WindowsPowerShell")
                    .join("v1.0")
                    .join("powershell.exe");
                if legacy.is_file() {
                    return Ok(legacy);
                }
            }
        }

        Err(RunnerError::Resolution(
            "no shell interpreter found; install pwsh or set execution.shell_path".to_string(),
        ))
    }
}

/// Resolve against the live process environment.
pub fn resolve_interpreter(configured: Option<&Path>, allow_legacy: bool) -> Result<PathBuf> {
    let path_var = std::env::var_os("PATH");
    let system_root = std::env::var_os("SystemRoot").map(PathBuf::from);
    InterpreterSearch {
        configured,
        path_var: path_var.as_deref(),
        allow_legacy,
        system_root: system_root.as_deref(),
    }
    .resolve()
}
