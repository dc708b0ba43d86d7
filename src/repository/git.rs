// src/repository/git.rs

//! Thin git command wrapper: executable resolution, non-interactive
//! environment, credential injection and retry with linear backoff.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{Result, RunnerError};
use crate::repository::process::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Attempts per git command before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff after failed attempt `n` is `n * BACKOFF_STEP`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(200);

/// Environment variable the credential helper reads the token from.
pub const TOKEN_ENV: &str = "SCRIPTRUNNER_GIT_TOKEN";

// Reads the token from the environment at fetch time so it never appears in
// argv or in logged command lines.
const CREDENTIAL_HELPER: &str =
    "!f() { echo username=scriptrunner; echo \"password=${SCRIPTRUNNER_GIT_TOKEN}\"; }; f";

/// Locations searched, relative to the running program's directory, when no
/// explicit git path is configured.
pub fn bundled_git_candidates(exe_dir: &Path) -> Vec<PathBuf> {
    let exe = format!("git{}", std::env::consts::EXE_SUFFIX);
    vec![
        exe_dir.join(&exe),
        exe_dir.join("tools").join("mingit").join("cmd").join(&exe),
        exe_dir.join("tools").join("mingit").join(&exe),
        exe_dir.join("tools").join("portablegit").join("cmd").join(&exe),
    ]
}

/// Pick the git executable: explicit path first, then bundled locations.
///
/// No PATH lookup; a missing git is fatal.
pub fn resolve_git_path(configured: Option<&Path>, exe_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!(path = %path.display(), "configured git executable does not exist");
    }

    if let Some(dir) = exe_dir {
        if let Some(found) = bundled_git_candidates(dir).into_iter().find(|p| p.is_file()) {
            return Ok(found);
        }
    }

    Err(RunnerError::Resolution(
        "git executable not found; set repository.git_path or bundle git next to the program"
            .to_string(),
    ))
}

/// Settings for one remote.
#[derive(Debug, Clone, Default)]
pub struct GitRemote {
    pub url: String,
    pub branch: String,
    pub token: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitClient {
    configured_path: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
    remote: GitRemote,
    runner: Arc<dyn ProcessRunner>,
}

impl GitClient {
    pub fn new(
        configured_path: Option<PathBuf>,
        remote: GitRemote,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self {
            configured_path,
            exe_dir,
            remote,
            runner,
        }
    }

    pub fn remote(&self) -> &GitRemote {
        &self.remote
    }

    fn environment(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            ("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()),
        ];
        if let Some(token) = self.remote.token.as_deref().filter(|t| !t.is_empty()) {
            env.push(("GIT_CONFIG_COUNT".to_string(), "1".to_string()));
            env.push(("GIT_CONFIG_KEY_0".to_string(), "credential.helper".to_string()));
            env.push(("GIT_CONFIG_VALUE_0".to_string(), CREDENTIAL_HELPER.to_string()));
            env.push((TOKEN_ENV.to_string(), token.to_string()));
        }
        if let Some(proxy) = self.remote.proxy.as_deref().filter(|p| !p.is_empty()) {
            env.push(("HTTPS_PROXY".to_string(), proxy.to_string()));
            env.push(("HTTP_PROXY".to_string(), proxy.to_string()));
        }
        env
    }

    /// Run `git <args>` in `working_dir`, retrying execution-level failures.
    ///
    /// A non-zero exit is returned as-is and is not retried.
    pub async fn run(
        &self,
        args: &[&str],
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let git = resolve_git_path(self.configured_path.as_deref(), self.exe_dir.as_deref())?;
        let spec = ProcessSpec {
            program: git,
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: working_dir.to_path_buf(),
            env: self.environment(),
        };
        let command = args.join(" ");
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }
            let token_set = self.remote.token.as_deref().is_some_and(|t| !t.is_empty());
            info!(attempt, command = %command, token_set, "running git");

            match self.runner.run(&spec, cancel).await {
                Ok(output) => {
                    if !output.success() {
                        warn!(
                            command = %command,
                            exit_code = output.exit_code,
                            stderr = %output.stderr.trim(),
                            "git exited with failure"
                        );
                    }
                    return Ok(output);
                }
                Err(err) => {
                    if cancel.is_cancelled() {
                        return Err(RunnerError::Cancelled);
                    }
                    warn!(attempt, command = %command, error = %err, "git attempt failed");
                    last_error = format!("{err:#}");
                    if attempt < MAX_ATTEMPTS {
                        tokio::select! {
                            _ = tokio::time::sleep(BACKOFF_STEP * attempt) => {}
                            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
                        }
                    }
                }
            }
        }

        Err(RunnerError::GitRetriesExhausted {
            command,
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    /// Like [`run`](Self::run) but a non-zero exit becomes an error and the
    /// stdout is returned.
    pub async fn run_checked(
        &self,
        args: &[&str],
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let output = self.run(args, working_dir, cancel).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(RunnerError::GitCommand {
                command: args.first().copied().unwrap_or_default().to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}
