use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scriptrunner::repository::{ProcessOutput, ProcessRunner, ProcessSpec};
use scriptrunner::types::BoxFuture;
use tokio_util::sync::CancellationToken;

pub const FAKE_COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

/// Stands in for the git executable.
///
/// Serves a fixed tree for `clone`, `rev-parse`, `ls-tree` and `show`,
/// counts clones, and can fail the first N spawns to exercise retries.
#[derive(Debug, Clone, Default)]
pub struct FakeGitRunner {
    files: Arc<Mutex<BTreeMap<String, String>>>,
    clones: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<ProcessSpec>>>,
    spawn_failures: Arc<AtomicUsize>,
    failing_show: Arc<Mutex<Vec<String>>>,
}

impl FakeGitRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// The next `n` invocations fail as if the process could not start.
    pub fn fail_spawns(self, n: usize) -> Self {
        self.spawn_failures.store(n, Ordering::SeqCst);
        self
    }

    /// `git show` for `path` exits non-zero.
    pub fn fail_show_for(self, path: &str) -> Self {
        self.failing_show.lock().unwrap().push(path.to_string());
        self
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, args: &[String]) -> ProcessOutput {
        let ok = |stdout: String| ProcessOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        };
        match args.first().map(String::as_str) {
            Some("clone") => {
                self.clones.fetch_add(1, Ordering::SeqCst);
                ok(String::new())
            }
            Some("rev-parse") => ok(format!("{FAKE_COMMIT}\n")),
            Some("ls-tree") => {
                let files = self.files.lock().unwrap();
                let mut listing = String::new();
                for path in files.keys() {
                    listing.push_str(path);
                    listing.push('\0');
                }
                ok(listing)
            }
            Some("show") => {
                let object = args.get(1).cloned().unwrap_or_default();
                let path = object.split_once(':').map(|(_, p)| p).unwrap_or_default();
                let failing = self.failing_show.lock().unwrap().iter().any(|p| p == path);
                match self.files.lock().unwrap().get(path) {
                    Some(text) if !failing => ok(text.clone()),
                    _ => ProcessOutput {
                        exit_code: 128,
                        stdout: String::new(),
                        stderr: format!("fatal: path '{path}' does not exist"),
                    },
                }
            }
            _ => ProcessOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "unsupported fake git command".to_string(),
            },
        }
    }
}

impl ProcessRunner for FakeGitRunner {
    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<ProcessOutput>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(spec.clone());
            if cancel.is_cancelled() {
                anyhow::bail!("git cancelled");
            }
            let pending = self.spawn_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.spawn_failures.store(pending - 1, Ordering::SeqCst);
                anyhow::bail!("simulated spawn failure");
            }
            Ok(self.respond(&spec.args))
        })
    }
}
