//! Integration tests for PreflightCheckSuite on the default thread pool
//!
//! These tests verify:
//! - Cancelling a suite whose checks are all running
//! - Status sequences and pool error reporting for failing checks
//! - The dependency check wired to PreflightStateManager

use camino::Utf8PathBuf;
use farmtask::models::{
    PreflightCheckExecutionStatus, PreflightCheckResult, PreflightCheckResultSeverity,
};
use farmtask::preflight::{
    DependencyCheck, FinishedCallback, PreflightCheck, PreflightCheckSuite, ResultListener,
    StatusListener,
};
use farmtask::state::{PreflightChange, PreflightStateManager};
use farmtask::threading::{
    CountDownLatch, DefaultThreadPool, Interruptible, StdWaitCondition, SyncFactory, Task,
    TaskBase, TaskResult, ThreadPool,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use PreflightCheckExecutionStatus::*;

type Latch = Arc<CountDownLatch<StdWaitCondition<usize>>>;
type StatusLog = Arc<Mutex<Vec<(String, PreflightCheckExecutionStatus)>>>;

/// Publishes one result, reports that it is running, then works until interrupted
struct LongRunningCheck {
    base: TaskBase,
    running: Latch,
    publish: ResultListener,
}

impl Interruptible for LongRunningCheck {
    fn task_base(&self) -> &TaskBase {
        &self.base
    }
}

impl Task for LongRunningCheck {
    fn run(&self) -> TaskResult<()> {
        (self.publish)(PreflightCheckResult::new(
            self.task_name(),
            PreflightCheckResultSeverity::Info,
            "started",
        ));
        self.running.decrease();

        for _ in 0..10_000 {
            self.check_interrupted()?;
            thread::sleep(Duration::from_millis(1));
        }

        (self.publish)(PreflightCheckResult::new(
            self.task_name(),
            PreflightCheckResultSeverity::Error,
            "finished without being cancelled",
        ));
        Ok(())
    }
}

impl PreflightCheck for LongRunningCheck {
    fn preflight_name(&self) -> &str {
        self.task_name()
    }

    fn preflight_description(&self) -> &str {
        "Runs until cancelled"
    }
}

/// Fails immediately
struct BrokenCheck {
    base: TaskBase,
}

impl Interruptible for BrokenCheck {
    fn task_base(&self) -> &TaskBase {
        &self.base
    }
}

impl Task for BrokenCheck {
    fn run(&self) -> TaskResult<()> {
        Err(anyhow::anyhow!("renderer not found").into())
    }
}

impl PreflightCheck for BrokenCheck {
    fn preflight_name(&self) -> &str {
        "Broken Check"
    }

    fn preflight_description(&self) -> &str {
        "Always fails"
    }
}

fn recording_listener() -> (StatusListener, StatusLog) {
    let log: StatusLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let listener: StatusListener = Arc::new(move |check, status| {
        sink.lock()
            .unwrap()
            .push((check.preflight_name().to_string(), status));
    });
    (listener, log)
}

fn statuses_of(log: &StatusLog, name: &str) -> Vec<PreflightCheckExecutionStatus> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(check, _)| check == name)
        .map(|(_, status)| *status)
        .collect()
}

fn finished_latch(pool: &DefaultThreadPool) -> (FinishedCallback, Latch) {
    let latch: Latch = Arc::new(CountDownLatch::new(pool.create_wait_condition(1)));
    let sink = Arc::clone(&latch);
    (Arc::new(move || sink.decrease()), latch)
}

#[test]
fn test_cancel_running_suite() {
    let pool = Arc::new(DefaultThreadPool::new(Some(4)).unwrap());
    let board = Arc::new(PreflightStateManager::new());
    let running: Latch = Arc::new(CountDownLatch::new(pool.create_wait_condition(4)));
    let (listener, log) = recording_listener();
    let (finished, finished_latch) = finished_latch(&pool);

    let checks: Vec<Arc<dyn PreflightCheck>> = (0..4)
        .map(|index| {
            Arc::new(LongRunningCheck {
                base: TaskBase::named(format!("check-{}", index)),
                running: Arc::clone(&running),
                publish: board.result_listener(),
            }) as Arc<dyn PreflightCheck>
        })
        .collect();

    let suite = PreflightCheckSuite::new(Arc::clone(&pool), checks, listener, Some(finished));
    suite.start().unwrap();

    assert!(running.wait_timeout(Duration::from_secs(5)));
    assert_eq!(suite.cancel(), 4);
    assert!(finished_latch.wait_timeout(Duration::from_secs(5)));

    let state = board.snapshot();
    for index in 0..4 {
        let name = format!("check-{}", index);
        assert_eq!(statuses_of(&log, &name), vec![Pending, Running, Cancelled]);

        let descriptions: Vec<_> = state
            .results_of(&name)
            .iter()
            .map(|result| result.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["started"]);
    }
    assert!(suite.is_finished());
}

#[test]
fn test_failing_check_reports_errored_and_reaches_pool_handler() {
    let pool_errors = Arc::new(Mutex::new(Vec::new()));
    let pool_errors_clone = Arc::clone(&pool_errors);
    let pool = Arc::new(
        DefaultThreadPool::builder()
            .concurrency_level(Some(2))
            .error_handler(move |name, err, _trace| {
                pool_errors_clone
                    .lock()
                    .unwrap()
                    .push((name.to_string(), err.to_string()));
            })
            .build()
            .unwrap(),
    );
    let (listener, log) = recording_listener();
    let (finished, finished_latch) = finished_latch(&pool);

    let checks: Vec<Arc<dyn PreflightCheck>> = vec![Arc::new(BrokenCheck {
        base: TaskBase::named("Broken Check"),
    })];
    let suite = PreflightCheckSuite::new(Arc::clone(&pool), checks, listener, Some(finished));
    suite.start().unwrap();

    assert!(finished_latch.wait_timeout(Duration::from_secs(5)));
    pool.shutdown(true);

    assert_eq!(statuses_of(&log, "Broken Check"), vec![Pending, Running, Errored]);
    assert_eq!(
        *pool_errors.lock().unwrap(),
        vec![("Broken Check".to_string(), "renderer not found".to_string())]
    );
}

#[test]
fn test_dependency_check_through_state_manager() {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let scene = root.join("shot010.blend");
    std::fs::write(&scene, b"BLENDER").unwrap();
    let texture = root.join("wall.png");

    let pool = Arc::new(DefaultThreadPool::new(Some(2)).unwrap());
    let board = Arc::new(PreflightStateManager::new());
    let mut events = board.subscribe();
    let (_, finished_latch) = finished_latch(&pool);
    let finished_sink = Arc::clone(&finished_latch);
    let mark_finished = board.finished_callback();
    let on_finished: FinishedCallback = Arc::new(move || {
        mark_finished();
        finished_sink.decrease();
    });

    let checks: Vec<Arc<dyn PreflightCheck>> = vec![Arc::new(DependencyCheck::new(
        vec![scene.clone(), texture.clone()],
        board.result_listener(),
    ))];
    let suite = PreflightCheckSuite::new(
        Arc::clone(&pool),
        checks,
        board.status_listener(),
        Some(on_finished),
    );
    suite.start().unwrap();
    assert!(finished_latch.wait_timeout(Duration::from_secs(5)));

    let state = board.snapshot();
    assert!(state.finished);
    assert_eq!(state.status_of("Dependency Check"), Some(Completed));
    assert_eq!(state.worst_severity(), Some(PreflightCheckResultSeverity::Warning));
    let results = state.results_of("Dependency Check");
    assert_eq!(results[0].description, format!("File {} exists", scene));
    assert_eq!(results[1].description, format!("File {} doesn't exist", texture));
    assert_eq!(
        state.checks["Dependency Check"].description,
        "Checks if detected file dependencies exist."
    );

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(matches!(
        received.first(),
        Some(PreflightChange::StatusChanged { status: Pending, .. })
    ));
    assert!(matches!(
        received.last(),
        Some(PreflightChange::ChecksFinished {
            completed: 1,
            errored: 0,
            cancelled: 0
        })
    ));
    assert_eq!(
        received
            .iter()
            .filter(|event| matches!(event, PreflightChange::ResultPublished { .. }))
            .count(),
        2
    );
}
