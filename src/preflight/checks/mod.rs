// Built-in preflight checks

pub mod dependency;

pub use dependency::{DEPENDENCY_CHECK_NAME, DependencyCheck};
