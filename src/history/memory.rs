// src/history/memory.rs

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::engine::output::truncate_output;
use crate::history::{ExecutionId, ExecutionRecord, HistoryStore};
use crate::types::BoxFuture;

/// Longest stdout/stderr kept per record, in characters.
pub const MAX_STORED_OUTPUT: usize = 20_000;

/// Records older than this are purged on every write.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<HashMap<ExecutionId, ExecutionRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, record: &ExecutionRecord) {
        let mut stored = record.clone();
        stored.stdout = truncate_output(&stored.stdout, MAX_STORED_OUTPUT);
        stored.stderr = truncate_output(&stored.stderr, MAX_STORED_OUTPUT);

        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = records.get(&record.execution_id) {
            if !existing.status.can_advance_to(record.status) {
                warn!(
                    execution = %record.execution_id,
                    from = %existing.status,
                    to = %record.status,
                    "ignoring status regression"
                );
                return;
            }
        }
        records.insert(record.execution_id, stored);

        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let before = records.len();
        records.retain(|_, r| r.started_at_utc >= cutoff);
        if records.len() < before {
            debug!(purged = before - records.len(), "purged expired history records");
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn store<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.upsert(record);
            Ok(())
        })
    }

    fn update<'a>(&'a self, record: &'a ExecutionRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.upsert(record);
            Ok(())
        })
    }

    fn get<'a>(&'a self, id: ExecutionId) -> BoxFuture<'a, Result<Option<ExecutionRecord>>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            Ok(records.get(&id).cloned())
        })
    }

    fn query<'a>(&'a self, limit: usize) -> BoxFuture<'a, Result<Vec<ExecutionRecord>>> {
        Box::pin(async move {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            let mut all: Vec<ExecutionRecord> = records.values().cloned().collect();
            all.sort_by(|a, b| b.started_at_utc.cmp(&a.started_at_utc));
            all.truncate(limit);
            Ok(all)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;

    #[tokio::test]
    async fn stores_and_rewrites_by_id() {
        let store = InMemoryHistoryStore::new();
        let queued = ExecutionRecord::queued("s", "S", "{}", "alice");
        store.store(&queued).await.expect("store");
        store.update(&queued.running()).await.expect("update");

        let got = store.get(queued.execution_id).await.expect("get").expect("present");
        assert_eq!(got.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn refuses_status_regressions() {
        let store = InMemoryHistoryStore::new();
        let queued = ExecutionRecord::queued("s", "S", "{}", "alice");
        let done = queued.running().finished(ExecutionStatus::Succeeded, 0, "ok", "");
        store.store(&done).await.expect("store");
        store.update(&queued.running()).await.expect("update");

        let got = store.get(queued.execution_id).await.expect("get").expect("present");
        assert_eq!(got.status, ExecutionStatus::Succeeded);

        store.update(&done.with_email_sent()).await.expect("update");
        let got = store.get(queued.execution_id).await.expect("get").expect("present");
        assert!(got.email_sent);
    }

    #[tokio::test]
    async fn caps_stored_output() {
        let store = InMemoryHistoryStore::new();
        let rec = ExecutionRecord::queued("s", "S", "{}", "a")
            .running()
            .finished(ExecutionStatus::Failed, 1, "x".repeat(MAX_STORED_OUTPUT + 50), "");
        store.store(&rec).await.expect("store");
        let got = store.get(rec.execution_id).await.expect("get").expect("present");
        assert!(got.stdout.chars().count() < MAX_STORED_OUTPUT + 50);
        assert!(got.stdout.starts_with(&"x".repeat(MAX_STORED_OUTPUT)));
    }

    #[tokio::test]
    async fn query_is_newest_first_and_purges_old_records() {
        let store = InMemoryHistoryStore::new();
        let mut old = ExecutionRecord::queued("old", "Old", "{}", "a");
        old.started_at_utc = Utc::now() - Duration::days(RETENTION_DAYS + 1);
        let mut earlier = ExecutionRecord::queued("earlier", "E", "{}", "a");
        earlier.started_at_utc = Utc::now() - Duration::minutes(5);
        let latest = ExecutionRecord::queued("latest", "L", "{}", "a");

        store.store(&old).await.expect("store");
        store.store(&earlier).await.expect("store");
        store.store(&latest).await.expect("store");

        let rows = store.query(10).await.expect("query");
        let ids: Vec<_> = rows.iter().map(|r| r.script_id.as_str()).collect();
        assert_eq!(ids, ["latest", "earlier"]);
        assert_eq!(store.query(1).await.expect("query").len(), 1);
    }
}
