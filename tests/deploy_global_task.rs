//! End-to-end task tests
//!
//! Runs the whole orchestrated pipeline — initialize, validate, initial
//! status, deploy, verify — against stub kubectl and API implementations.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use cluster_deploy::config::TaskConfig;
use cluster_deploy::deploy::DeployOptions;
use cluster_deploy::kube::discovery::{ClusterApi, ClusterDiscovery};
use cluster_deploy::kube::kubectl::{CommandOutput, KubectlRunner};
use cluster_deploy::summary::TaskStatus;
use cluster_deploy::task::DeployGlobalTask;

struct StubKubectl {
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubKubectl {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that would mutate the cluster (dry-run validation excluded).
    fn mutation_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| !c.iter().any(|a| a == "--dry-run=server"))
            .collect()
    }
}

#[async_trait]
impl KubectlRunner for StubKubectl {
    async fn run(&self, args: &[String], _log_failure: bool) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        Ok(CommandOutput::new("", "", true))
    }
}

struct StubApi {
    objects: Vec<Value>,
}

#[async_trait]
impl ClusterApi for StubApi {
    async fn discover(&self) -> Result<ClusterDiscovery> {
        let kinds: BTreeSet<String> = ["ClusterRole", "StorageClass", "CustomResourceDefinition"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Ok(ClusterDiscovery::from_parts(kinds, Vec::new()))
    }

    async fn list(&self, kind: &str, _namespace: Option<&str>) -> Result<Vec<Value>> {
        Ok(self
            .objects
            .iter()
            .filter(|o| o.get("kind").and_then(|k| k.as_str()) == Some(kind))
            .cloned()
            .collect())
    }
}

const STORAGE_CLASS: &str = "\
apiVersion: storage.k8s.io/v1
kind: StorageClass
metadata:
  name: sc-a
  labels:
    app: web
provisioner: kubernetes.io/no-provisioner
";

const CLUSTER_ROLE: &str = "\
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: cr-b
  labels:
    app: web
rules: []
";

const CONFIG_MAP: &str = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  key: value
";

fn write_templates(dir: &tempfile::TempDir, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, content)| {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

fn task(
    paths: Vec<PathBuf>,
    kubectl: Arc<StubKubectl>,
    objects: Vec<Value>,
    configure: impl FnOnce(&mut TaskConfig),
) -> DeployGlobalTask {
    let mut config = TaskConfig::new("test-context");
    configure(&mut config);
    DeployGlobalTask::new(config, paths, kubectl, Arc::new(StubApi { objects }))
}

#[tokio::test]
async fn test_happy_deploy_reaches_success() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(&dir, &[("sc-a.yaml", STORAGE_CLASS), ("cr-b.yaml", CLUSTER_ROLE)]);
    let kubectl = StubKubectl::ok();
    let objects = vec![
        json!({ "kind": "StorageClass", "metadata": { "name": "sc-a" } }),
        json!({ "kind": "ClusterRole", "metadata": { "name": "cr-b" } }),
    ];
    let mut task = task(paths, kubectl.clone(), objects, |c| {
        c.max_watch_seconds = 10;
    });
    let summary = task.summary();

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Success);

    let mutations = kubectl.mutation_calls();
    assert_eq!(mutations.len(), 1, "one bulk apply expected: {mutations:?}");
    assert_eq!(mutations[0][0], "apply");
    assert!(mutations[0].contains(&"--prune".to_string()));

    let actions = summary.actions();
    assert!(actions.contains(&"successfully deployed StorageClass/sc-a".to_string()));
    assert!(actions.contains(&"successfully deployed ClusterRole/cr-b".to_string()));
}

#[tokio::test]
async fn test_namespaced_resource_is_rejected_before_any_command() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(&dir, &[("settings.yaml", CONFIG_MAP)]);
    let kubectl = StubKubectl::ok();
    let mut task = task(paths, kubectl.clone(), vec![], |_| {});
    let summary = task.summary();

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Failure);
    assert!(
        kubectl.calls().is_empty(),
        "no kubectl command may run for a namespaced input: {:?}",
        kubectl.calls()
    );
    assert!(
        summary
            .paragraphs()
            .iter()
            .any(|p| p == "Deploying namespaced resource is not allowed from this command."),
        "{:?}",
        summary.paragraphs()
    );
}

#[tokio::test]
async fn test_resources_never_appearing_classify_as_timed_out() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(&dir, &[("sc-a.yaml", STORAGE_CLASS)]);
    let kubectl = StubKubectl::ok();
    // The cluster never reports the StorageClass
    let mut task = task(paths, kubectl, vec![], |c| {
        c.max_watch_seconds = 1;
    });
    let summary = task.summary();

    let status = task.run().await;
    assert_eq!(status, TaskStatus::TimedOut);
    assert!(
        summary
            .actions()
            .contains(&"timed out waiting for StorageClass/sc-a".to_string()),
        "{:?}",
        summary.actions()
    );
}

#[tokio::test]
async fn test_selector_mismatch_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    // cr-unlabeled has no labels, so the selector would prune it
    let unlabeled = "\
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: cr-unlabeled
rules: []
";
    let paths = write_templates(&dir, &[("cr.yaml", unlabeled)]);
    let kubectl = StubKubectl::ok();
    let mut task = task(paths, kubectl.clone(), vec![], |c| {
        c.selector = Some("app=web".to_string());
    });
    let summary = task.summary();

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Failure);
    assert!(
        kubectl.mutation_calls().is_empty(),
        "validation failure must abort before deploy: {:?}",
        kubectl.calls()
    );
    assert!(
        summary
            .paragraphs()
            .iter()
            .any(|p| p.contains("does not match labels")),
        "{:?}",
        summary.paragraphs()
    );
}

#[tokio::test]
async fn test_malformed_selector_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(&dir, &[("sc-a.yaml", STORAGE_CLASS)]);
    let kubectl = StubKubectl::ok();
    let mut task = task(paths, kubectl.clone(), vec![], |c| {
        c.selector = Some("not a selector".to_string());
    });
    let summary = task.summary();

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Failure);
    assert!(kubectl.calls().is_empty());
    assert!(
        summary
            .paragraphs()
            .iter()
            .any(|p| p.contains("Configuration invalid")),
        "{:?}",
        summary.paragraphs()
    );
}

#[tokio::test]
async fn test_duplicate_identities_abort_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(
        &dir,
        &[("one.yaml", STORAGE_CLASS), ("two.yaml", STORAGE_CLASS)],
    );
    let kubectl = StubKubectl::ok();
    let mut task = task(paths, kubectl.clone(), vec![], |_| {});

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Failure);
    assert!(kubectl.calls().is_empty());
}

#[tokio::test]
async fn test_verification_can_be_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_templates(&dir, &[("sc-a.yaml", STORAGE_CLASS)]);
    let kubectl = StubKubectl::ok();
    // No objects on the cluster, but verification is off
    let mut task = task(paths, kubectl, vec![], |_| {}).with_options(DeployOptions {
        verify: false,
        prune: true,
        record_summary: true,
    });

    let status = task.run().await;
    assert_eq!(status, TaskStatus::Success);
}
