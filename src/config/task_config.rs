//! Per-task configuration
//!
//! A `TaskConfig` is assembled once at the CLI boundary and then treated as
//! read-only by every phase. The one exception is `global_kinds`, which is
//! filled in at the boundary between discovery and status sync and is frozen
//! before the deploy phase starts.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, bail};

/// Default watch deadline for the verify phase.
pub const DEFAULT_MAX_WATCH_SECONDS: u64 = 300;

/// Cluster-scoped types eligible for pruning, as `group/version/Kind`.
///
/// Pruning is gated on this list so that `kubectl apply --prune` can never
/// delete object types the deploy engine does not manage.
pub const DEFAULT_PRUNE_WHITELIST: &[&str] = &[
    "rbac.authorization.k8s.io/v1/ClusterRole",
    "rbac.authorization.k8s.io/v1/ClusterRoleBinding",
    "apiextensions.k8s.io/v1/CustomResourceDefinition",
    "scheduling.k8s.io/v1/PriorityClass",
    "storage.k8s.io/v1/StorageClass",
];

/// Configuration for a single global deploy task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Kubeconfig context the task deploys to.
    pub context: String,

    /// Raw label selector (`k=v,k2=v2`) restricting prune eligibility.
    /// Validated during the pre-flight phase; passed to kubectl verbatim.
    pub selector: Option<String>,

    /// `group/version/Kind` entries eligible for pruning, in the order they
    /// are handed to kubectl.
    pub prune_whitelist: Vec<String>,

    /// Global deadline for the verify phase.
    pub max_watch_seconds: u64,

    /// Cluster-scoped kinds known to the API server. Empty until discovery
    /// has run; immutable once the validate phase completes.
    pub global_kinds: BTreeSet<String>,
}

impl TaskConfig {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            selector: None,
            prune_whitelist: DEFAULT_PRUNE_WHITELIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_watch_seconds: DEFAULT_MAX_WATCH_SECONDS,
            global_kinds: BTreeSet::new(),
        }
    }

    pub fn max_watch(&self) -> Duration {
        Duration::from_secs(self.max_watch_seconds)
    }

    /// True when `kind` appears in the prune whitelist (the trailing segment
    /// of each `group/version/Kind` entry).
    pub fn kind_is_prunable(&self, kind: &str) -> bool {
        self.prune_whitelist
            .iter()
            .any(|entry| entry.rsplit('/').next() == Some(kind))
    }

    /// True when `kind` is a cluster-scoped kind per discovery.
    pub fn kind_is_global(&self, kind: &str) -> bool {
        self.global_kinds.contains(kind)
    }
}

/// Validate a label selector expression of the form `k=v[,k=v...]`.
///
/// kubectl accepts richer set-based expressions, but the deploy pipeline only
/// ever passes equality selectors, so anything else is rejected up front
/// rather than failing mid-apply.
pub fn validate_selector(selector: &str) -> Result<()> {
    if selector.trim().is_empty() {
        bail!("selector must not be empty");
    }
    for pair in selector.split(',') {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {}
            _ => bail!("'{pair}' is not a key=value pair"),
        }
    }
    Ok(())
}
