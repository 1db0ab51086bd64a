//! Pre-flight configuration checks
//!
//! A closed list of checks runs before any deploy work starts. Errors
//! accumulate rather than short-circuiting, so one run reports every problem
//! at once. The check list for the global task is the namespaced task's list
//! minus the namespace-existence check.

use std::path::PathBuf;

use crate::config::task_config::{TaskConfig, validate_selector};
use crate::error::TaskError;
use crate::kube::discovery::{ClusterApi, ClusterDiscovery};

pub struct ConfigValidator<'a> {
    config: &'a TaskConfig,
    template_paths: &'a [PathBuf],
}

impl<'a> ConfigValidator<'a> {
    pub fn new(config: &'a TaskConfig, template_paths: &'a [PathBuf]) -> Self {
        Self {
            config,
            template_paths,
        }
    }

    /// Run every check; on success, return the discovery results so the task
    /// can classify resources without a second round trip.
    pub async fn validate(&self, api: &dyn ClusterApi) -> Result<ClusterDiscovery, TaskError> {
        let mut errors: Vec<String> = Vec::new();

        if self.config.context.trim().is_empty() {
            errors.push("No context was provided".to_string());
        }

        if let Some(selector) = &self.config.selector {
            if let Err(e) = validate_selector(selector) {
                errors.push(format!("Selector '{selector}' is invalid: {e}"));
            }
        }

        if self.config.max_watch_seconds == 0 {
            errors.push("max-watch-seconds must be greater than zero".to_string());
        }

        if self.template_paths.is_empty() {
            errors.push("No template paths were provided".to_string());
        }
        for path in self.template_paths {
            if !path.exists() {
                errors.push(format!("Template path does not exist: {}", path.display()));
            }
        }

        // API reachability doubles as the context-liveness check: discovery
        // only answers if the context points at a working API server.
        let discovery = match api.discover().await {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                errors.push(format!(
                    "Failed to reach the API server for context '{}': {e:#}",
                    self.config.context
                ));
                None
            }
        };

        if errors.is_empty() {
            // discovery is present whenever errors is empty
            Ok(discovery.unwrap_or_default())
        } else {
            Err(TaskError::Configuration(errors))
        }
    }
}
