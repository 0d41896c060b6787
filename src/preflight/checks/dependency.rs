use crate::models::{PreflightCheckResult, PreflightCheckResultSeverity};
use crate::preflight::check::{PreflightCheck, ResultListener};
use crate::threading::{Interruptible, Task, TaskBase, TaskResult};
use camino::Utf8PathBuf;

pub const DEPENDENCY_CHECK_NAME: &str = "Dependency Check";
const DEPENDENCY_CHECK_DESCRIPTION: &str = "Checks if detected file dependencies exist.";

/// Publishes one result per dependency path: success when the file exists,
/// a warning when it doesn't.
pub struct DependencyCheck {
    base: TaskBase,
    file_paths: Vec<Utf8PathBuf>,
    publish_result: ResultListener,
}

impl DependencyCheck {
    pub fn new(file_paths: Vec<Utf8PathBuf>, publish_result: ResultListener) -> Self {
        Self {
            base: TaskBase::named(DEPENDENCY_CHECK_NAME),
            file_paths,
            publish_result,
        }
    }

    pub fn file_paths(&self) -> &[Utf8PathBuf] {
        &self.file_paths
    }
}

impl Interruptible for DependencyCheck {
    fn task_base(&self) -> &TaskBase {
        &self.base
    }
}

impl Task for DependencyCheck {
    fn run(&self) -> TaskResult<()> {
        for path in &self.file_paths {
            self.check_interrupted()?;

            let result = if path.exists() {
                PreflightCheckResult::new(
                    DEPENDENCY_CHECK_NAME,
                    PreflightCheckResultSeverity::Success,
                    format!("File {} exists", path),
                )
            } else {
                PreflightCheckResult::new(
                    DEPENDENCY_CHECK_NAME,
                    PreflightCheckResultSeverity::Warning,
                    format!("File {} doesn't exist", path),
                )
            };
            (self.publish_result)(result);
        }

        tracing::debug!("Checked {} dependencies", self.file_paths.len());
        Ok(())
    }
}

impl PreflightCheck for DependencyCheck {
    fn preflight_name(&self) -> &str {
        DEPENDENCY_CHECK_NAME
    }

    fn preflight_description(&self) -> &str {
        DEPENDENCY_CHECK_DESCRIPTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn collecting_listener() -> (ResultListener, Arc<Mutex<Vec<PreflightCheckResult>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let listener: ResultListener = Arc::new(move |result| sink.lock().unwrap().push(result));
        (listener, results)
    }

    #[test]
    fn test_reports_existing_and_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let present = root.join("present.abc");
        std::fs::write(&present, b"Alembic").unwrap();
        let missing = root.join("missing.abc");

        let (listener, results) = collecting_listener();
        let check = DependencyCheck::new(vec![present.clone(), missing.clone()], listener);
        check.run().unwrap();

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].severity, PreflightCheckResultSeverity::Success);
        assert_eq!(results[0].description, format!("File {} exists", present));
        assert_eq!(results[1].severity, PreflightCheckResultSeverity::Warning);
        assert_eq!(results[1].description, format!("File {} doesn't exist", missing));
        assert!(results.iter().all(|r| r.name == "Dependency Check"));
    }

    #[test]
    fn test_interrupted_check_publishes_nothing() {
        let (listener, results) = collecting_listener();
        let check = DependencyCheck::new(vec![Utf8PathBuf::from("a"), Utf8PathBuf::from("b")], listener);
        check.interrupt();

        assert!(check.run().unwrap_err().is_interrupted());
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn test_names() {
        let (listener, _) = collecting_listener();
        let check = DependencyCheck::new(Vec::new(), listener);
        assert_eq!(check.preflight_name(), "Dependency Check");
        assert_eq!(check.task_name(), "Dependency Check");
        assert_eq!(
            check.preflight_description(),
            "Checks if detected file dependencies exist."
        );
    }
}
