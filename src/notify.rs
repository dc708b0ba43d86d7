// src/notify.rs

//! Completion notifications.

use tracing::info;

use crate::history::ExecutionRecord;
use crate::types::BoxFuture;

/// Told about every terminal execution. Returns whether a notification
/// actually went out; failures are reported as `false`, never raised.
pub trait Notifier: Send + Sync {
    fn send_results<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, bool>;
}

/// Logs the outcome and reports that nothing was sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_results<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            info!(
                execution = %record.execution_id,
                script = %record.script_id,
                status = %record.status,
                exit_code = record.exit_code,
                user = %record.ran_by_user,
                "execution finished"
            );
            false
        })
    }
}
