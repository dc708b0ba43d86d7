// src/repository/process.rs

//! Child-process execution with full output capture and process-tree
//! termination on cancellation.
//!
//! Both the git client and the shell executor go through [`ProcessRunner`],
//! so tests can swap in a fake that never spawns anything.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::BoxFuture;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Extra environment variables. Values may be secret; never log them.
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments only; safe to log.
    pub fn display_command(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a process to completion.
///
/// `Err` means the process could not be run or waited on, or it was
/// cancelled. A non-zero exit is a normal `Ok` outcome.
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ProcessOutput>>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ProcessOutput>> {
        Box::pin(run_process(spec, cancel))
    }
}

async fn run_process(spec: &ProcessSpec, cancel: &CancellationToken) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so the whole subtree can be signalled at once.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {}", spec.program.display()))?;
    let pid = child.id();
    debug!(pid, program = %spec.program.display(), "process started");

    let stdout = tokio::spawn(read_all(child.stdout.take()));
    let stderr = tokio::spawn(read_all(child.stderr.take()));

    let status = tokio::select! {
        status = child.wait() => status.with_context(|| format!("waiting for {}", spec.program.display()))?,
        _ = cancel.cancelled() => {
            warn!(pid, program = %spec.program.display(), "cancellation requested, killing process tree");
            if let Some(pid) = pid {
                kill_process_tree(pid).await;
            }
            let _ = child.kill().await;
            stdout.abort();
            stderr.abort();
            bail!("{} cancelled", spec.program.display());
        }
    };

    let stdout = stdout.await.context("joining stdout reader")?;
    let stderr = stderr.await.context("joining stderr reader")?;

    Ok(ProcessOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

async fn read_all<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = stream.read_to_end(&mut buf).await {
        warn!(error = %err, "failed reading process output");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
async fn kill_process_tree(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: plain signal send to the process group created at spawn.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(windows)]
async fn kill_process_tree(pid: u32) {
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(err) = result {
        debug!(pid, error = %err, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_process_tree(_pid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let spec = ProcessSpec::new("sh", std::env::temp_dir())
            .args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let out = TokioProcessRunner
            .run(&spec, &CancellationToken::new())
            .await
            .expect("run");
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn passes_environment() {
        let spec = ProcessSpec::new("sh", std::env::temp_dir())
            .args(["-c", "printf %s \"$SR_PROBE\""])
            .env("SR_PROBE", "value");
        let out = TokioProcessRunner
            .run(&spec, &CancellationToken::new())
            .await
            .expect("run");
        assert_eq!(out.stdout, "value");
    }

    #[tokio::test]
    async fn cancellation_kills_the_subtree() {
        let spec = ProcessSpec::new("sh", std::env::temp_dir())
            .args(["-c", "sleep 30 & sleep 30; wait"]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = TokioProcessRunner.run(&spec, &cancel).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let spec = ProcessSpec::new("/definitely/not/a/program", std::env::temp_dir());
        assert!(TokioProcessRunner.run(&spec, &CancellationToken::new()).await.is_err());
    }
}
