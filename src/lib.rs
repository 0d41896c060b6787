// farmtask - Cooperative tasks, main-thread marshalling and preflight checks
//
// This is the library crate containing the threading framework, the preflight
// suite and the ambient plumbing (settings, logging, state, metrics).
// The binary crate (main.rs) is a headless host that runs a dependency preflight.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod preflight;
pub mod state;
pub mod threading;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::ThreadingMetrics;
pub use models::{PreflightCheckResult, PreflightState, Settings};
pub use preflight::{DependencyCheck, PreflightCheck, PreflightCheckSuite};
pub use state::{PreflightChange, PreflightStateManager};
pub use threading::{
    AsyncCaller, DefaultThreadPool, Interruptible, MainThreadExecutor, Task, TaskBase, TaskError,
    TaskResult, ThreadPool,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
