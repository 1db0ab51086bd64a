//! Task-level error types
//!
//! Every phase of a deploy task either returns normally or surfaces one of
//! these variants. The orchestrator catches them at the top and maps them to
//! the summary status and the process exit code.

use thiserror::Error;

/// Errors that can end a deploy task.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Pre-flight checks failed. Carries every accumulated problem so the
    /// operator sees the full list in one run.
    #[error("Configuration invalid:\n{}", format_errors(.0))]
    Configuration(Vec<String>),

    /// A manifest template failed to parse or validate.
    #[error("Invalid template: {file}: {reason}")]
    InvalidTemplate { file: String, reason: String },

    /// An apply/replace/create invocation failed, or a resource reported a
    /// hard failure after deploy.
    #[error("{0}")]
    FatalDeployment(String),

    /// The watcher deadline elapsed and every non-succeeded resource is
    /// merely timed-out (no hard failures).
    #[error("Deployment timed out")]
    DeploymentTimeout,
}

impl TaskError {
    /// Wrap any displayable error as a fatal deployment failure.
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        TaskError::FatalDeployment(err.to_string())
    }
}

fn format_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
