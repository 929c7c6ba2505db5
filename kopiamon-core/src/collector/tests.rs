use super::*;
use crate::error::KopiaError;
use crate::runner::CommandOutput;
use async_trait::async_trait;
use chrono::TimeZone;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Runner answering each command line with a canned response.
#[derive(Default)]
struct ScriptedRunner {
    responses: Mutex<HashMap<String, std::result::Result<CommandOutput, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn reply(self, command: &str, stdout: &str) -> Self {
        let output = CommandOutput { stdout: stdout.as_bytes().to_vec(), exit_code: Some(0), ..Default::default() };
        self.responses.lock().unwrap().insert(command.to_string(), Ok(output));
        self
    }

    fn fail(self, command: &str, reason: &str) -> Self {
        self.responses.lock().unwrap().insert(command.to_string(), Err(reason.to_string()));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &KopiaCommand) -> Result<CommandOutput> {
        let line = command.to_string();
        self.calls.lock().unwrap().push(line.clone());
        match self.responses.lock().unwrap().get(&line) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(reason)) => Err(KopiaError::CommandFailed { command: line, reason: reason.clone() }),
            None => Err(KopiaError::CommandFailed { command: line, reason: "no script".into() }),
        }
    }
}

const VERSION: &str = "kopia version --json";
const SNAPSHOTS: &str = "kopia snapshot list --json";
const REPOSITORY: &str = "kopia repository status --json";
const VALIDATION: &str = "kopia snapshot verify --all --json";

fn healthy_runner() -> ScriptedRunner {
    ScriptedRunner::default()
        .reply(VERSION, r#"{"version": "0.17.0", "buildInfo": {"buildVersion": "abc123"}}"#)
        .reply(
            SNAPSHOTS,
            r#"[
                {"id": "newest", "startTime": "2024-01-01T00:00:00.000000Z", "stats": {"totalSize": 300, "totalFiles": 30}},
                {"id": "older", "startTime": "2023-12-31T00:00:00.000000Z", "stats": {"totalSize": 100, "totalFiles": 10}}
            ]"#,
        )
        .reply(REPOSITORY, r#"{"size": 5000, "blob": {"count": 42}}"#)
        .reply(VALIDATION, r#"{"success": true}"#)
}

fn failed(report: &CycleReport, query: Query) -> bool {
    report.failures.iter().any(|(q, _)| *q == query)
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
}

fn collector(runner: ScriptedRunner) -> (Collector, Arc<ScriptedRunner>, Arc<MemorySink>) {
    let runner = Arc::new(runner);
    let sink = Arc::new(MemorySink::new());
    (Collector::new(runner.clone(), sink.clone()), runner, sink)
}

#[tokio::test]
async fn test_full_cycle_publishes_everything() {
    let (collector, runner, sink) = collector(healthy_runner());

    let report = collector.collect_at(now()).await;
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(runner.calls(), vec![VERSION, SNAPSHOTS, REPOSITORY, VALIDATION]);

    assert_eq!(
        sink.info(names::KOPIA_INFO),
        Some(vec![("version", "0.17.0".to_string()), ("build", "abc123".to_string())])
    );
    // The newest snapshot is listed first; sorting still selects it.
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), Some(300.0));
    assert_eq!(sink.gauge(names::BACKUP_FILES_TOTAL), Some(30.0));
    assert_eq!(sink.gauge(names::BACKUP_AGE_SECONDS), Some(3600.0));
    assert_eq!(sink.gauge(names::BACKUP_LAST_TIMESTAMP_SECONDS), Some(1_704_067_200.0));
    assert_eq!(sink.gauge(names::BACKUP_STATUS), Some(1.0));
    assert_eq!(sink.gauge(names::BACKUP_DURATION_SECONDS), None, "no endTime listed");
    assert_eq!(sink.gauge(names::REPOSITORY_SIZE_BYTES), Some(5000.0));
    assert_eq!(sink.gauge(names::REPOSITORY_BLOBS_TOTAL), Some(42.0));
    assert_eq!(sink.gauge(names::REPOSITORY_STATUS), Some(1.0));
    assert_eq!(sink.gauge(names::BACKUP_VALIDATION), Some(1.0));
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 0);
}

#[tokio::test]
async fn test_empty_snapshot_list_keeps_previous_values() {
    let (collector, _, sink) = collector(healthy_runner());
    collector.collect_at(now()).await;

    let (collector, _, _) = collector_with_sink(healthy_runner().reply(SNAPSHOTS, "[]"), sink.clone());
    let later = now() + chrono::Duration::hours(5);
    let report = collector.collect_at(later).await;

    assert!(report.is_clean());
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), Some(300.0));
    assert_eq!(sink.gauge(names::BACKUP_FILES_TOTAL), Some(30.0));
    assert_eq!(sink.gauge(names::BACKUP_AGE_SECONDS), Some(3600.0));
}

#[tokio::test]
async fn test_bad_start_time_leaves_snapshot_gauges_untouched() {
    let (collector, _, sink) = collector(healthy_runner());
    collector.collect_at(now()).await;

    let broken = healthy_runner().reply(
        SNAPSHOTS,
        r#"[{"id": "x", "startTime": "01/02/2024 10:00", "stats": {"totalSize": 999, "totalFiles": 9}}]"#,
    );
    let (collector, _, _) = collector_with_sink(broken, sink.clone());
    let report = collector.collect_at(now()).await;

    assert!(failed(&report, Query::Snapshots));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), Some(300.0));
    assert_eq!(sink.gauge(names::BACKUP_FILES_TOTAL), Some(30.0));
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 1);
}

#[tokio::test]
async fn test_duration_and_status_of_latest_snapshot() {
    let listing = r#"[
        {"id": "ok", "startTime": "2023-12-31T00:00:00Z", "endTime": "2023-12-31T00:10:00Z"},
        {"id": "cut", "startTime": "2024-01-01T00:00:00Z", "endTime": "2024-01-01T00:01:30.5Z",
         "incomplete": true, "stats": {"totalSize": 10}}
    ]"#;
    let (collector, _, sink) = collector(healthy_runner().reply(SNAPSHOTS, listing));
    collector.collect_at(now()).await;

    assert_eq!(sink.gauge(names::BACKUP_DURATION_SECONDS), Some(90.5));
    assert_eq!(sink.gauge(names::BACKUP_STATUS), Some(0.0));
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), Some(10.0));

    let listing = r#"[{"id": "e", "startTime": "2024-01-01T00:00:00Z", "error": "permission denied"}]"#;
    let (collector, _, sink) = self::collector(healthy_runner().reply(SNAPSHOTS, listing));
    collector.collect_at(now()).await;
    assert_eq!(sink.gauge(names::BACKUP_STATUS), Some(0.0));
}

#[tokio::test]
async fn test_bad_end_time_leaves_snapshot_gauges_untouched() {
    let listing = r#"[{"id": "x", "startTime": "2024-01-01T00:00:00Z", "endTime": "soon", "stats": {"totalSize": 7}}]"#;
    let (collector, _, sink) = collector(healthy_runner().reply(SNAPSHOTS, listing));
    let report = collector.collect_at(now()).await;

    assert!(failed(&report, Query::Snapshots));
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), None);
    assert_eq!(sink.gauge(names::BACKUP_STATUS), None);
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 1);
}

#[tokio::test]
async fn test_missing_start_time_is_counted() {
    let runner = healthy_runner().reply(SNAPSHOTS, r#"[{"id": "x", "stats": {"totalSize": 1}}]"#);
    let (collector, _, sink) = collector(runner);
    let report = collector.collect_at(now()).await;

    assert!(failed(&report, Query::Snapshots));
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), None);
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 1);
}

#[tokio::test]
async fn test_failures_are_isolated_per_query() {
    let runner = healthy_runner()
        .fail(VERSION, "container not running")
        .reply(REPOSITORY, "Error: repository not connected");
    let (collector, runner, sink) = collector(runner);

    let report = collector.collect_at(now()).await;

    assert_eq!(runner.calls().len(), 4, "every query must still run");
    assert!(failed(&report, Query::Version));
    assert!(failed(&report, Query::Repository));
    assert!(!failed(&report, Query::Snapshots));
    assert!(!failed(&report, Query::Validation));

    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 2);
    assert_eq!(sink.info(names::KOPIA_INFO), None);
    assert_eq!(sink.gauge(names::REPOSITORY_SIZE_BYTES), None);
    assert_eq!(sink.gauge(names::REPOSITORY_STATUS), Some(0.0));
    assert_eq!(sink.gauge(names::BACKUP_SIZE_BYTES), Some(300.0));
    assert_eq!(sink.gauge(names::BACKUP_VALIDATION), Some(1.0));
}

#[tokio::test]
async fn test_validation_gauge_is_zero_unless_success_true() {
    for body in [r#"{"success": false}"#, r#"{"errors": ["bad blob"]}"#, r#"{"success": "yes"}"#, "{}"] {
        let (collector, _, sink) = collector(healthy_runner().reply(VALIDATION, body));
        let report = collector.collect_at(now()).await;
        assert!(report.is_clean());
        assert_eq!(sink.gauge(names::BACKUP_VALIDATION), Some(0.0), "body: {}", body);
    }
}

#[tokio::test]
async fn test_version_defaults_to_unknown() {
    let (collector, _, sink) = collector(healthy_runner().reply(VERSION, r#"{"version": "0.18.1"}"#));
    collector.collect_at(now()).await;
    assert_eq!(
        sink.info(names::KOPIA_INFO),
        Some(vec![("version", "0.18.1".to_string()), ("build", "unknown".to_string())])
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_repeats_until_shutdown() {
    let (collector, runner, sink) = collector(healthy_runner().fail(VALIDATION, "timeout"));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        collector.run(Duration::from_secs(15), async move { let _ = rx.await; }).await;
    });

    // Two full cycles fit into 20 seconds of paused time: t=0 and t=15.
    tokio::time::sleep(Duration::from_secs(20)).await;
    tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(runner.calls().len(), 8);
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 2);
}

/// Runner that panics on every call.
struct PanickingRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandRunner for PanickingRunner {
    async fn run(&self, command: &KopiaCommand) -> Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("runner blew up on {}", command);
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_cycle_is_counted_and_loop_continues() {
    let runner = Arc::new(PanickingRunner { calls: AtomicUsize::new(0) });
    let sink = Arc::new(MemorySink::new());
    let collector = Collector::new(runner.clone(), sink.clone());

    // Cycles start at t=0, 15 and 30.
    collector.run(Duration::from_secs(15), tokio::time::sleep(Duration::from_secs(35))).await;

    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 3);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
}

/// Runner whose calls never finish; records when a call is dropped.
struct HangingRunner {
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandRunner for HangingRunner {
    async fn run(&self, _command: &KopiaCommand) -> Result<CommandOutput> {
        let _guard = SetOnDrop(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(CommandOutput::default())
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_running_cycle() {
    let dropped = Arc::new(AtomicBool::new(false));
    let sink = Arc::new(MemorySink::new());
    let runner = Arc::new(HangingRunner { dropped: dropped.clone() });
    let collector = Collector::new(runner, sink.clone());

    collector.run(Duration::from_secs(15), tokio::time::sleep(Duration::from_secs(5))).await;

    assert!(dropped.load(Ordering::SeqCst), "in-flight command must be cancelled before run returns");
    assert_eq!(sink.counter(names::BACKUP_ERRORS_TOTAL), 0);
}

fn collector_with_sink(
    runner: ScriptedRunner,
    sink: Arc<MemorySink>,
) -> (Collector, Arc<ScriptedRunner>, Arc<MemorySink>) {
    let runner = Arc::new(runner);
    (Collector::new(runner.clone(), sink.clone()), runner, sink)
}
