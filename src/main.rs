//! farmtask - headless preflight host
//!
//! Runs the dependency preflight over the paths given on the command line, the
//! way a render-farm submitter plugin runs it before a job is sent.
//!
//! # Execution Flow
//!
//! 1. Load settings from `farmtask-data/farmtask.yaml` and `FARMTASK__*` variables
//! 2. Initialize logging → logs/farmtask.<date>
//! 3. Build the worker pool and a main-thread executor bound to this thread
//! 4. Start a [`PreflightCheckSuite`] with a [`DependencyCheck`] whose results are
//!    published on the main thread, like a GUI host would
//! 5. Pump the main-thread queue until the suite finishes
//! 6. Print the collected results as YAML and shut the pool down
//!
//! # Usage
//!
//! ```text
//! farmtask scenes/shot010.blend textures/wall.png
//! ```

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use farmtask::logging::setup_logging_from_settings;
use farmtask::preflight::ResultListener;
use farmtask::threading::MainThreadCaller;
use farmtask::{
    APP_NAME, ConfigManager, DefaultThreadPool, DependencyCheck, MainThreadExecutor,
    PreflightCheck, PreflightCheckSuite, PreflightStateManager, ThreadPool, ThreadingMetrics,
    VERSION,
};
use std::sync::Arc;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("farmtask-data")?;
    let settings = config_manager.load_settings()?;

    let _log_guard = setup_logging_from_settings(&settings.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let paths: Vec<Utf8PathBuf> = std::env::args().skip(1).map(Utf8PathBuf::from).collect();
    if paths.is_empty() {
        tracing::warn!("No dependency paths given, nothing to check");
    }

    let metrics = Arc::new(ThreadingMetrics::new());
    let pool = Arc::new(
        DefaultThreadPool::builder()
            .concurrency_level(settings.threading.concurrency_level)
            .metrics(Arc::clone(&metrics))
            .error_handler(|task, err, trace| {
                tracing::error!("Task {} failed: {}\n{}", task, err, trace);
            })
            .build()
            .context("Failed to start the worker pool")?,
    );
    tracing::info!("Worker pool started with {} threads", pool.concurrency_level());

    let executor = Arc::new(
        MainThreadExecutor::new(Arc::clone(&pool))
            .with_poll_interval(settings.threading.main_thread_poll_interval())
            .with_metrics(Arc::clone(&metrics)),
    );

    let board = Arc::new(PreflightStateManager::new());
    let publish_on_main_thread: ResultListener = {
        let caller = MainThreadCaller::new(Arc::clone(&executor));
        let publish = board.result_listener();
        Arc::new(move |result| {
            let publish = Arc::clone(&publish);
            if let Err(err) = caller.run_on_main_thread(move || {
                publish(result);
                Ok(())
            }) {
                tracing::warn!("Failed to publish preflight result: {}", err);
            }
        })
    };

    let checks: Vec<Arc<dyn PreflightCheck>> =
        vec![Arc::new(DependencyCheck::new(paths, publish_on_main_thread))];
    let suite = PreflightCheckSuite::new(
        Arc::clone(&pool),
        checks,
        board.status_listener(),
        Some(board.finished_callback()),
    );

    suite.start()?;
    let executed = executor.pump_while(|| !suite.is_finished())?;
    tracing::debug!("Executed {} main-thread actions", executed);

    let state = board.snapshot();
    let report = serde_yaml_ng::to_string(&state).context("Failed to render preflight results")?;
    println!("{}", report);

    if let Some(worst) = state.worst_severity() {
        tracing::info!("Preflight finished, worst severity: {:?}", worst);
    }

    if !settings.threading.shutdown_wait {
        for name in pool.outstanding_task_names() {
            tracing::warn!(task = %name, "Task still outstanding, not waiting for it");
        }
    }
    pool.shutdown(settings.threading.shutdown_wait);
    metrics.log_summary();
    tracing::info!("Shutdown complete");

    Ok(())
}
