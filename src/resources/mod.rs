//! Resource model
//!
//! In-memory representation of a single Kubernetes object on its way to the
//! cluster: identity, file origin, classification, deploy strategy, and the
//! status predicates the watcher polls. Behavior that varies by kind lives in
//! [`kind::KindBehavior`]; the `Resource` struct itself is kind-agnostic.

pub mod kind;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::TaskConfig;
use crate::kube::cache::ResourceCache;
use crate::kube::kubectl::KubectlRunner;
use crate::template::ParsedTemplate;

pub use kind::{DeployStrategy, KindBehavior};

/// Whether a resource is cluster-scoped or bound to a namespace.
///
/// The global deploy task refuses namespaced resources before any apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Global,
    Namespaced,
}

/// Mutable status portion of a resource, populated by sync and the deployer.
#[derive(Debug, Clone, Default)]
pub struct ResourceStatus {
    /// Last observed API object, if the resource exists on the cluster.
    pub observed: Option<Value>,
    /// Set exactly once, immediately before the first mutation command.
    pub deploy_started_at: Option<Instant>,
    /// Most recent human-readable condition message.
    pub last_message: Option<String>,
    /// Set by the watcher when the global deadline elapses.
    forced_timeout: bool,
}

/// A single Kubernetes object described by a manifest template.
#[derive(Debug, Clone)]
pub struct Resource {
    kind: String,
    name: String,
    api_version: String,
    file_path: PathBuf,
    raw_manifest: String,
    labels: BTreeMap<String, String>,
    behavior: KindBehavior,
    classification: Classification,
    deploy_strategy: DeployStrategy,
    prunable: bool,
    sensitive: bool,
    timeout: Duration,
    server_dry_run_validated: bool,
    pub status: ResourceStatus,
}

impl Resource {
    /// Build a resource from a parsed template, classifying it against the
    /// discovered global kind set and the configured prune whitelist.
    pub fn from_template(template: &ParsedTemplate, config: &TaskConfig) -> Self {
        let behavior = KindBehavior::for_kind(&template.kind);
        let classification = if config.kind_is_global(&template.kind) {
            Classification::Global
        } else {
            Classification::Namespaced
        };
        Self {
            kind: template.kind.clone(),
            name: template.name.clone(),
            api_version: template.api_version.clone(),
            file_path: template.file_path.clone(),
            raw_manifest: template.content.clone(),
            labels: template.labels.clone(),
            behavior,
            classification,
            deploy_strategy: behavior.deploy_strategy(),
            prunable: config.kind_is_prunable(&template.kind),
            sensitive: behavior.sensitive(),
            timeout: behavior.timeout(),
            server_dry_run_validated: false,
            status: ResourceStatus::default(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn raw_manifest(&self) -> &str {
        &self.raw_manifest
    }

    pub fn behavior(&self) -> KindBehavior {
        self.behavior
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn deploy_strategy(&self) -> DeployStrategy {
        self.deploy_strategy
    }

    pub fn prunable(&self) -> bool {
        self.prunable
    }

    pub fn sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn server_dry_run_validated(&self) -> bool {
        self.server_dry_run_validated
    }

    /// True when logging paths must suppress this resource's content and any
    /// stderr it may have leaked into.
    pub fn sensitive_output(&self) -> bool {
        self.sensitive && !self.server_dry_run_validated
    }

    /// Record the start of deployment. Idempotent: the timestamp is taken on
    /// the first mutation command only.
    pub fn mark_deploy_started(&mut self) {
        if self.status.deploy_started_at.is_none() {
            self.status.deploy_started_at = Some(Instant::now());
        }
    }

    /// Force the timed-out predicate; used by the watcher when the global
    /// deadline elapses.
    pub fn mark_timed_out(&mut self) {
        self.status.forced_timeout = true;
    }

    /// Refresh this resource's observed state from the cache.
    pub async fn sync(&mut self, cache: &ResourceCache) {
        self.status.observed = cache.get_instance(&self.kind, None, &self.name).await;
        self.status.last_message = self
            .status
            .observed
            .as_ref()
            .and_then(|obj| first_condition_message(obj));
    }

    pub fn deploy_succeeded(&self) -> bool {
        match self.behavior {
            KindBehavior::CustomResourceDefinition => self
                .status
                .observed
                .as_ref()
                .and_then(|obj| condition_status(obj, "Established"))
                .unwrap_or(false),
            // Everything else in the global set is ready once it exists;
            // CronJob in particular has no rollout to wait for.
            _ => self.status.observed.is_some(),
        }
    }

    pub fn deploy_failed(&self) -> bool {
        match self.behavior {
            KindBehavior::CustomResourceDefinition => self
                .status
                .observed
                .as_ref()
                .and_then(|obj| condition_status(obj, "NamesAccepted"))
                .map(|accepted| !accepted)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn deploy_timed_out(&self) -> bool {
        if self.status.forced_timeout {
            return true;
        }
        match self.status.deploy_started_at {
            Some(started) => {
                started.elapsed() > self.timeout
                    && !self.deploy_succeeded()
                    && !self.deploy_failed()
            }
            None => false,
        }
    }

    /// A resource is terminal once any predicate has fired. Callers that need
    /// an ordering apply failed > timed_out > succeeded.
    pub fn terminal(&self) -> bool {
        self.deploy_failed() || self.deploy_timed_out() || self.deploy_succeeded()
    }

    pub fn pretty_status(&self) -> String {
        let state = if self.deploy_failed() {
            match &self.status.last_message {
                Some(msg) => format!("Failed ({msg})"),
                None => "Failed".to_string(),
            }
        } else if self.deploy_timed_out() {
            "Timed out".to_string()
        } else if self.deploy_succeeded() {
            "Available".to_string()
        } else if self.status.observed.is_some() {
            "Pending".to_string()
        } else {
            "Not Found".to_string()
        };
        format!("{}: {}", self, state)
    }

    pub fn timeout_message(&self) -> String {
        format!(
            "{} did not reach its desired state within {}s",
            self,
            self.timeout.as_secs()
        )
    }

    /// Validate this resource's definition against the API server with a
    /// server-side dry run, and check it against the prune selector.
    ///
    /// Success clears the resource for error reporting
    /// (`server_dry_run_validated`). The returned error string may contain
    /// raw stderr; callers must route it through the sensitivity-aware
    /// reporter rather than logging it directly.
    pub async fn validate_definition(
        &mut self,
        kubectl: &dyn KubectlRunner,
        selector: Option<&str>,
    ) -> Result<(), String> {
        if let Some(selector) = selector {
            for pair in selector.split(',') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                if self.labels.get(key).map(String::as_str) != Some(value) {
                    return Err(format!(
                        "selector '{selector}' does not match labels on {}; \
                         it would be pruned by its own deploy",
                        self
                    ));
                }
            }
        }

        let args = vec![
            "apply".to_string(),
            "--dry-run=server".to_string(),
            "--output=name".to_string(),
            "-f".to_string(),
            self.file_path.display().to_string(),
        ];
        let output = kubectl
            .run(&args, !self.sensitive_output())
            .await
            .map_err(|e| format!("{e:#}"))?;
        if output.success {
            self.server_dry_run_validated = true;
            Ok(())
        } else {
            Err(output.stderr.trim().to_string())
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// Lets the sync fan-out run over both owned slices and borrowed working sets.
impl AsMut<Resource> for Resource {
    fn as_mut(&mut self) -> &mut Resource {
        self
    }
}

/// Read the boolean status of a typed condition from an object's
/// `status.conditions` array.
fn condition_status(obj: &Value, cond_type: &str) -> Option<bool> {
    let conditions = obj.get("status")?.get("conditions")?.as_array()?;
    for condition in conditions {
        if condition.get("type").and_then(|t| t.as_str()) == Some(cond_type) {
            return condition
                .get("status")
                .and_then(|s| s.as_str())
                .map(|s| s == "True");
        }
    }
    None
}

fn first_condition_message(obj: &Value) -> Option<String> {
    let conditions = obj.get("status")?.get("conditions")?.as_array()?;
    conditions
        .iter()
        .find_map(|c| c.get("message").and_then(|m| m.as_str()))
        .map(|m| m.to_string())
}
