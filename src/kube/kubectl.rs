//! External kubectl invocation
//!
//! The deploy pipeline mutates the cluster exclusively through `kubectl
//! apply`/`replace`/`create`. Invocations go through the [`KubectlRunner`]
//! trait so tests can substitute a recording stub for the real binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Captured output of a finished kubectl invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, success: bool) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            success,
        }
    }
}

/// Runs kubectl verbs against the task's context.
///
/// `args` is the verb-first argument vector (`["apply", "-f", ...]`); the
/// implementation is responsible for the binary path and context flags. When
/// `log_failure` is false the caller is handling sensitive output and stderr
/// must not be echoed into the logs.
#[async_trait]
pub trait KubectlRunner: Send + Sync {
    async fn run(&self, args: &[String], log_failure: bool) -> Result<CommandOutput>;
}

/// Production runner that shells out to the kubectl binary.
///
/// The global deploy task constructs this without a namespace: cluster-scoped
/// resources never carry one, so `-n` is never passed.
pub struct Kubectl {
    binary: PathBuf,
    context: String,
    namespace: Option<String>,
}

impl Kubectl {
    /// Runner for cluster-scoped work: no `-n` flag, ever.
    pub fn global(context: impl Into<String>) -> Self {
        Self {
            binary: kubectl_binary(),
            context: context.into(),
            namespace: None,
        }
    }

    pub fn namespaced(context: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            binary: kubectl_binary(),
            context: context.into(),
            namespace: Some(namespace.into()),
        }
    }

    fn full_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        full.push("--context".to_string());
        full.push(self.context.clone());
        if let Some(ns) = &self.namespace {
            full.push("-n".to_string());
            full.push(ns.clone());
        }
        full
    }
}

#[async_trait]
impl KubectlRunner for Kubectl {
    async fn run(&self, args: &[String], log_failure: bool) -> Result<CommandOutput> {
        let full = self.full_args(args);
        tracing::debug!("Running kubectl {}", shell_join(&full));

        let output = Command::new(&self.binary)
            .args(&full)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.binary.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let success = output.status.success();

        if !success {
            if log_failure {
                tracing::warn!(
                    "kubectl {} exited with {}: {}",
                    shell_join(args),
                    output.status,
                    stderr.trim()
                );
            } else {
                tracing::warn!(
                    "kubectl {} failed; output suppressed (sensitive resource)",
                    args.first().map(String::as_str).unwrap_or("")
                );
            }
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            success,
        })
    }
}

/// Resolve the kubectl binary: `KUBECTL_BINARY` override, else `$PATH`.
fn kubectl_binary() -> PathBuf {
    std::env::var_os("KUBECTL_BINARY")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("kubectl"))
}

/// Join an argument vector for display, quoting arguments with whitespace.
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(char::is_whitespace) {
                format!("\"{a}\"")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
