// tests/dispatcher.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scriptrunner::engine::{CANCELLED_BEFORE_ADMISSION, Dispatcher, DispatcherOptions, ExecutionRequest};
use scriptrunner::errors::RunnerError;
use scriptrunner::exec::{ExecutionContext, ExecutionResult, ScriptExecutor};
use scriptrunner::history::{ExecutionRecord, HistoryStore, InMemoryHistoryStore};
use scriptrunner::metadata::ScriptMetadata;
use scriptrunner::notify::{LogNotifier, Notifier};
use scriptrunner::params::{ParamValue, ParameterBag};
use scriptrunner::storage::{MemoryTempStorage, TempStorage};
use scriptrunner::types::{BoxFuture, ExecutionStatus};
use scriptrunner_test_utils::builders::MetadataBuilder;
use scriptrunner_test_utils::fake_executor::FakeExecutor;
use scriptrunner_test_utils::{init_tracing, wait_for_terminal, with_timeout};

struct Harness {
    dispatcher: Dispatcher,
    history: Arc<InMemoryHistoryStore>,
    storage: Arc<MemoryTempStorage>,
}

fn harness(
    executor: Arc<dyn ScriptExecutor>,
    notifier: Arc<dyn Notifier>,
    options: DispatcherOptions,
) -> Harness {
    let history = Arc::new(InMemoryHistoryStore::new());
    let storage = Arc::new(MemoryTempStorage::new());
    let dispatcher = Dispatcher::new(
        executor,
        history.clone(),
        notifier,
        storage.clone(),
        options,
    );
    Harness {
        dispatcher,
        history,
        storage,
    }
}

async fn request(storage: &MemoryTempStorage, id: &str) -> ExecutionRequest {
    let script_path = storage.write("Write-Output 'hi'", ".ps1").await.unwrap();
    let mut parameters = ParameterBag::new();
    parameters.insert("Name".to_string(), ParamValue::from("World"));
    ExecutionRequest {
        metadata: MetadataBuilder::new(id)
            .source_path(&format!("{id}.ps1"))
            .build(),
        script_path,
        parameters,
        ran_by: "alice".to_string(),
    }
}

#[tokio::test]
async fn test_concurrency_never_exceeds_slots() {
    init_tracing();
    let fake = FakeExecutor::new().with_delay(Duration::from_millis(30));
    let h = harness(
        Arc::new(fake.clone()),
        Arc::new(LogNotifier),
        DispatcherOptions {
            max_concurrent: 2,
            ..Default::default()
        },
    );

    let mut ids = Vec::new();
    for i in 0..6 {
        let req = request(&h.storage, &format!("job-{i}")).await;
        ids.push(h.dispatcher.submit(req).await.unwrap());
    }
    with_timeout(h.dispatcher.shutdown()).await;

    assert_eq!(fake.started().len(), 6);
    assert!(fake.peak() <= 2, "peak was {}", fake.peak());
    assert_eq!(h.dispatcher.available_slots(), 2);
    assert_eq!(h.dispatcher.in_flight(), 0);
    for id in ids {
        let record = h.history.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.stdout, "ok");
        assert_eq!(record.parameters_json, r#"{"Name":"World"}"#);
        assert!(record.finished_at_utc.is_some());
    }
}

#[tokio::test]
async fn test_submit_returns_queued_record_immediately() {
    init_tracing();
    let fake = FakeExecutor::new().gated();
    let h = harness(
        Arc::new(fake.clone()),
        Arc::new(LogNotifier),
        DispatcherOptions::default(),
    );

    let req = request(&h.storage, "slow").await;
    let id = h.dispatcher.submit(req).await.unwrap();
    let record = h.history.get(id).await.unwrap().unwrap();
    assert!(matches!(
        record.status,
        ExecutionStatus::Queued | ExecutionStatus::Running
    ));
    assert_eq!(record.ran_by_user, "alice");

    fake.release();
    let done = wait_for_terminal(h.history.as_ref(), id).await;
    assert_eq!(done.status, ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_a_slot() {
    init_tracing();
    let fake = FakeExecutor::new().gated();
    let h = harness(
        Arc::new(fake.clone()),
        Arc::new(LogNotifier),
        DispatcherOptions {
            max_concurrent: 1,
            ..Default::default()
        },
    );

    let running = h.dispatcher.submit(request(&h.storage, "first").await).await.unwrap();
    let waiting_req = request(&h.storage, "second").await;
    let waiting_path = waiting_req.script_path.clone();
    let waiting = h.dispatcher.submit(waiting_req).await.unwrap();

    with_timeout(async {
        while fake.current() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(h.dispatcher.cancel(waiting));

    let record = wait_for_terminal(h.history.as_ref(), waiting).await;
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.exit_code, -1);
    assert_eq!(record.stderr, CANCELLED_BEFORE_ADMISSION);
    assert!(h.storage.deleted().contains(&waiting_path));
    assert_eq!(fake.started(), ["first"]);

    fake.release();
    let first = wait_for_terminal(h.history.as_ref(), running).await;
    assert_eq!(first.status, ExecutionStatus::Succeeded);
    with_timeout(h.dispatcher.shutdown()).await;
    assert_eq!(h.dispatcher.available_slots(), 1);
    assert!(!h.dispatcher.cancel(waiting));
}

#[tokio::test]
async fn test_cancel_running_execution() {
    init_tracing();
    let fake = FakeExecutor::new().gated();
    let h = harness(
        Arc::new(fake.clone()),
        Arc::new(LogNotifier),
        DispatcherOptions::default(),
    );

    let id = h.dispatcher.submit(request(&h.storage, "stuck").await).await.unwrap();
    with_timeout(async {
        while fake.current() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    with_timeout(h.dispatcher.abandon()).await;
    let record = h.history.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.exit_code, -1);
    assert_eq!(h.dispatcher.available_slots(), 2);
}

#[tokio::test]
async fn test_output_is_truncated_before_recording() {
    init_tracing();
    let fake = FakeExecutor::new().with_stdout("x".repeat(50));
    let h = harness(
        Arc::new(fake),
        Arc::new(LogNotifier),
        DispatcherOptions {
            max_concurrent: 1,
            output_truncation: 10,
        },
    );

    let id = h.dispatcher.submit(request(&h.storage, "chatty").await).await.unwrap();
    let record = wait_for_terminal(h.history.as_ref(), id).await;
    assert_eq!(record.stdout, format!("{}\n...[truncated]", "x".repeat(10)));
}

#[tokio::test]
async fn test_non_zero_exit_is_failed() {
    init_tracing();
    let fake = FakeExecutor::new().with_exit_code(3);
    let h = harness(Arc::new(fake), Arc::new(LogNotifier), DispatcherOptions::default());

    let id = h.dispatcher.submit(request(&h.storage, "bad").await).await.unwrap();
    let record = wait_for_terminal(h.history.as_ref(), id).await;
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.exit_code, 3);
}

struct PanickingExecutor;

impl ScriptExecutor for PanickingExecutor {
    fn execute<'a>(
        &'a self,
        _metadata: &'a ScriptMetadata,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move { panic!("executor blew up") })
    }
}

#[tokio::test]
async fn test_executor_panic_is_recorded_as_failure() {
    init_tracing();
    let h = harness(
        Arc::new(PanickingExecutor),
        Arc::new(LogNotifier),
        DispatcherOptions::default(),
    );

    let req = request(&h.storage, "boom").await;
    let path = req.script_path.clone();
    let id = h.dispatcher.submit(req).await.unwrap();
    let record = wait_for_terminal(h.history.as_ref(), id).await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.exit_code, -1);
    assert!(record.stderr.contains("executor crashed"));
    assert!(h.storage.deleted().contains(&path));
    with_timeout(h.dispatcher.shutdown()).await;
    assert_eq!(h.dispatcher.available_slots(), 2);
}

#[derive(Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn send_results<'a>(&'a self, _record: &'a ExecutionRecord) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        })
    }
}

#[tokio::test]
async fn test_delivered_notification_marks_record() {
    init_tracing();
    let notifier = Arc::new(CountingNotifier::default());
    let h = harness(
        Arc::new(FakeExecutor::new()),
        notifier.clone(),
        DispatcherOptions::default(),
    );

    let id = h.dispatcher.submit(request(&h.storage, "mail").await).await.unwrap();
    with_timeout(h.dispatcher.shutdown()).await;

    let record = h.history.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    assert!(record.email_sent);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    init_tracing();
    let h = harness(
        Arc::new(FakeExecutor::new()),
        Arc::new(LogNotifier),
        DispatcherOptions::default(),
    );
    with_timeout(h.dispatcher.shutdown()).await;

    let req = request(&h.storage, "late").await;
    let path = req.script_path.clone();
    let result = h.dispatcher.submit(req).await;

    assert!(matches!(result, Err(RunnerError::ShuttingDown)));
    assert!(h.storage.deleted().contains(&path));
    assert!(h.history.query(10).await.unwrap().is_empty());
}

/// Holds every notification until released.
#[derive(Default)]
struct HeldNotifier {
    entered: CancellationToken,
    release: CancellationToken,
}

impl Notifier for HeldNotifier {
    fn send_results<'a>(&'a self, _record: &'a ExecutionRecord) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.entered.cancel();
            self.release.cancelled().await;
            false
        })
    }
}

#[tokio::test]
async fn test_finished_run_is_not_cancellable_while_notifying() {
    init_tracing();
    let notifier = Arc::new(HeldNotifier::default());
    let h = harness(
        Arc::new(FakeExecutor::new()),
        notifier.clone(),
        DispatcherOptions::default(),
    );

    let id = h.dispatcher.submit(request(&h.storage, "quick").await).await.unwrap();
    with_timeout(notifier.entered.cancelled()).await;

    let record = h.history.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    assert!(!h.dispatcher.cancel(id));
    assert_eq!(h.dispatcher.in_flight(), 0);

    notifier.release.cancel();
    with_timeout(h.dispatcher.shutdown()).await;
}
