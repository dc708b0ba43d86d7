use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scriptrunner::exec::{ExecutionContext, ExecutionResult, ScriptExecutor};
use scriptrunner::metadata::ScriptMetadata;
use scriptrunner::types::BoxFuture;
use tokio_util::sync::CancellationToken;

/// A fake executor that:
/// - records which scripts were run, in start order
/// - tracks how many runs overlap (current and peak)
/// - optionally holds every run until `release()` is called
/// - returns a fixed exit code and stdout.
#[derive(Clone)]
pub struct FakeExecutor {
    started: Arc<Mutex<Vec<String>>>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
    gate: Option<CancellationToken>,
    exit_code: i32,
    stdout: String,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            started: Arc::new(Mutex::new(Vec::new())),
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            gate: None,
            exit_code: 0,
            stdout: "ok".to_string(),
        }
    }

    /// Each run sleeps this long before finishing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs block until [`release`](Self::release) or cancellation.
    pub fn gated(mut self) -> Self {
        self.gate = Some(CancellationToken::new());
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.cancel();
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor for FakeExecutor {
    fn execute<'a>(
        &'a self,
        metadata: &'a ScriptMetadata,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            self.started.lock().unwrap().push(metadata.id.clone());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let cancelled = tokio::select! {
                _ = ctx.cancel.cancelled() => true,
                _ = async {
                    tokio::time::sleep(self.delay).await;
                    if let Some(gate) = &self.gate {
                        gate.cancelled().await;
                    }
                } => false,
            };

            self.current.fetch_sub(1, Ordering::SeqCst);
            if cancelled {
                return ExecutionResult::error("execution cancelled");
            }
            ExecutionResult::from_exit(self.exit_code, self.stdout.clone(), String::new())
        })
    }
}
