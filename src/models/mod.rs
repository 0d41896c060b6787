//! Data models for farmtask.
//!
//! - [`PreflightState`]: snapshot of a preflight run, one [`CheckRecord`] per check
//! - [`PreflightCheckResult`], [`PreflightCheckResultSeverity`] and
//!   [`PreflightCheckExecutionStatus`]: what checks publish and where they are
//!   in their lifecycle
//! - [`Settings`]: pool, executor and logging settings loaded from `farmtask.yaml`
//!
//! All models derive `Serialize`/`Deserialize` for YAML output and persistence.

pub mod preflight;
pub mod settings;

pub use preflight::{
    CheckRecord, PreflightCheckExecutionStatus, PreflightCheckResult, PreflightCheckResultSeverity,
    PreflightState,
};
pub use settings::{LoggingSettings, Settings, ThreadingSettings};
