//! Per-kind deploy behavior
//!
//! This module provides a centralized behavior table for resource kinds.
//! This eliminates hardcoded strings throughout the codebase: strategy,
//! timeout, and sensitivity decisions all come from one place.

use std::time::Duration;

/// How a resource is sent to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStrategy {
    /// Bulk `kubectl apply` via the shared temp directory. The default.
    Apply,
    /// `kubectl replace -f`, falling back to `create` when absent.
    Replace,
    /// `kubectl replace --force --cascade -f`, same fallback.
    ReplaceForce,
}

/// Closed set of kinds with specialized deploy behavior. Kinds not listed
/// here get the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindBehavior {
    Default,
    CronJob,
    CustomResourceDefinition,
    Secret,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const CRON_JOB_TIMEOUT: Duration = Duration::from_secs(30);
const SYNC_INTERVAL: Duration = Duration::from_secs(3);

impl KindBehavior {
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "CronJob" => KindBehavior::CronJob,
            "CustomResourceDefinition" => KindBehavior::CustomResourceDefinition,
            "Secret" => KindBehavior::Secret,
            _ => KindBehavior::Default,
        }
    }

    /// CRD schema changes are not always apply-mergeable, so CRDs are
    /// replaced individually rather than joining the bulk apply.
    pub fn deploy_strategy(&self) -> DeployStrategy {
        match self {
            KindBehavior::CustomResourceDefinition => DeployStrategy::Replace,
            _ => DeployStrategy::Apply,
        }
    }

    /// How long a resource of this kind may take to reach its desired state
    /// before its own predicate declares it timed out.
    pub fn timeout(&self) -> Duration {
        match self {
            KindBehavior::CronJob => CRON_JOB_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// Pause between watcher iterations while this kind is still pending.
    pub fn sync_interval(&self) -> Duration {
        SYNC_INTERVAL
    }

    /// Extra kinds the cache should list before this kind syncs.
    pub fn prefetch_kinds_on_sync(&self) -> &'static [&'static str] {
        match self {
            KindBehavior::CronJob => &["Pod"],
            _ => &[],
        }
    }

    /// Sensitive kinds must never have manifest content or stderr echoed
    /// unless server-side dry-run has cleared them.
    pub fn sensitive(&self) -> bool {
        matches!(self, KindBehavior::Secret)
    }
}
