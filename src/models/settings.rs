use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings, persisted as `farmtask.yaml`
///
/// Every field has a default, so a partial or missing file is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub threading: ThreadingSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingSettings {
    /// Worker threads in the default pool. `None` uses the host CPU count.
    #[serde(default)]
    pub concurrency_level: Option<usize>,

    /// How often a worker waiting on the main thread re-checks interruption
    #[serde(default = "default_poll_interval_ms")]
    pub main_thread_poll_interval_ms: u64,

    /// Whether shutdown waits for queued and running tasks
    #[serde(default = "default_true")]
    pub shutdown_wait: bool,
}

impl ThreadingSettings {
    pub fn main_thread_poll_interval(&self) -> Duration {
        Duration::from_millis(self.main_thread_poll_interval_ms.max(1))
    }
}

impl Default for ThreadingSettings {
    fn default() -> Self {
        Self {
            concurrency_level: None,
            main_thread_poll_interval_ms: default_poll_interval_ms(),
            shutdown_wait: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: String,

    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            prefix: default_log_prefix(),
            debug: false,
            console: true,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "farmtask".to_string()
}
