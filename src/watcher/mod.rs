//! Resource watcher
//!
//! Owns the post-apply verification loop: resync everything that is not yet
//! terminal against a fresh cache, classify, and repeat until the working
//! set drains or the global deadline elapses. Also provides the bounded
//! fan-out helper both the watcher and the initial-status phase use.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::kube::cache::ResourceCache;
use crate::kube::discovery::ClusterApi;
use crate::resources::Resource;
use crate::summary::{DeploySummary, Tone};

/// Upper bound on concurrent sync workers.
pub const MAX_SYNC_WORKERS: usize = 8;

/// Split `resources` into at most [`MAX_SYNC_WORKERS`] disjoint chunks and
/// sync them concurrently. Joins before returning; workers share nothing but
/// the cache, which serves reads only.
pub async fn sync_resources<R>(resources: &mut [R], cache: &ResourceCache)
where
    R: AsMut<Resource>,
{
    if resources.is_empty() {
        return;
    }
    let chunk_size = resources.len().div_ceil(MAX_SYNC_WORKERS);
    let workers = resources.chunks_mut(chunk_size).map(|chunk| async move {
        for resource in chunk {
            resource.as_mut().sync(cache).await;
        }
    });
    futures::future::join_all(workers).await;
}

pub struct ResourceWatcher {
    api: Arc<dyn ClusterApi>,
    config: TaskConfig,
    summary: Arc<DeploySummary>,
    record_summary: bool,
}

impl ResourceWatcher {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: TaskConfig,
        summary: Arc<DeploySummary>,
        record_summary: bool,
    ) -> Self {
        Self {
            api,
            config,
            summary,
            record_summary,
        }
    }

    /// Watch until every resource is terminal or the global deadline
    /// elapses. Resources left non-terminal at the deadline are marked
    /// timed-out. Status is reported in resource-list order each iteration.
    pub async fn run(&self, resources: &mut [Resource]) -> Result<(), TaskError> {
        let deadline = Instant::now() + self.config.max_watch();
        tracing::info!(
            "Waiting for {} resource(s) (deadline {}s)",
            resources.len(),
            self.config.max_watch_seconds
        );

        loop {
            {
                // Fresh cache each iteration: the whole point is new state
                let cache = ResourceCache::new(self.api.clone());
                let mut pending: Vec<&mut Resource> = resources
                    .iter_mut()
                    .filter(|r| !r.terminal())
                    .collect();
                if pending.is_empty() {
                    break;
                }
                cache.prefetch(pending.iter().map(|r| &**r)).await;
                sync_resources(&mut pending, &cache).await;
            }

            for resource in resources.iter() {
                tracing::debug!("{}", resource.pretty_status());
            }

            let pending: Vec<&Resource> =
                resources.iter().filter(|r| !r.terminal()).collect();
            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Global watch deadline of {}s elapsed with {} resource(s) pending",
                    self.config.max_watch_seconds,
                    pending.len()
                );
                drop(pending);
                for resource in resources.iter_mut().filter(|r| !r.terminal()) {
                    resource.mark_timed_out();
                }
                break;
            }

            let interval = pending
                .iter()
                .map(|r| r.behavior().sync_interval())
                .min()
                .unwrap_or(Duration::from_secs(3));
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(interval.min(remaining)).await;
        }

        self.finish(resources)
    }

    /// Classify the final state of every resource and turn it into the
    /// watcher's verdict. Precedence when predicates overlap:
    /// failed > timed_out > succeeded.
    fn finish(&self, resources: &[Resource]) -> Result<(), TaskError> {
        let mut failed: Vec<&Resource> = Vec::new();
        let mut timed_out: Vec<&Resource> = Vec::new();

        for resource in resources {
            if resource.deploy_failed() {
                failed.push(resource);
            } else if resource.deploy_timed_out() {
                timed_out.push(resource);
            }
        }

        if self.record_summary {
            for resource in resources {
                if resource.deploy_failed() {
                    let detail = resource
                        .status
                        .last_message
                        .clone()
                        .unwrap_or_else(|| "no failure message reported".to_string());
                    self.summary
                        .add_action(format!("failed to deploy {resource}: {detail}"));
                } else if resource.deploy_timed_out() {
                    self.summary
                        .add_action(format!("timed out waiting for {resource}"));
                    self.summary
                        .add_paragraph(resource.timeout_message(), Tone::Warning);
                } else {
                    self.summary
                        .add_action(format!("successfully deployed {resource}"));
                }
            }
        }

        if !failed.is_empty() {
            let names = failed
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(TaskError::FatalDeployment(format!(
                "The following resources failed to deploy: {names}"
            )))
        } else if !timed_out.is_empty() {
            Err(TaskError::DeploymentTimeout)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::kube::discovery::ClusterDiscovery;
    use crate::template::ParsedTemplate;

    struct FixedApi {
        objects: Vec<Value>,
    }

    #[async_trait]
    impl ClusterApi for FixedApi {
        async fn discover(&self) -> Result<ClusterDiscovery> {
            Ok(ClusterDiscovery::default())
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

    fn global_resource(kind: &str, name: &str) -> Resource {
        let mut config = TaskConfig::new("test-context");
        config.global_kinds.insert(kind.to_string());
        let template = ParsedTemplate {
            file_path: PathBuf::from(format!("/templates/{name}.yaml")),
            kind: kind.to_string(),
            name: name.to_string(),
            api_version: "v1".to_string(),
            labels: BTreeMap::new(),
            content: format!("kind: {kind}\n"),
        };
        Resource::from_template(&template, &config)
    }

    #[tokio::test]
    async fn test_sync_fan_out_joins_all_chunks() {
        let api = Arc::new(FixedApi {
            objects: (0..20)
                .map(|i| json!({ "kind": "ClusterRole", "metadata": { "name": format!("role-{i}") } }))
                .collect(),
        });
        let cache = ResourceCache::new(api);
        let mut resources: Vec<Resource> = (0..20)
            .map(|i| global_resource("ClusterRole", &format!("role-{i}")))
            .collect();

        sync_resources(&mut resources, &cache).await;
        assert!(
            resources.iter().all(|r| r.status.observed.is_some()),
            "every resource must be synced before the fan-out returns"
        );
    }

    #[tokio::test]
    async fn test_watcher_succeeds_when_all_resources_exist() {
        let api = Arc::new(FixedApi {
            objects: vec![
                json!({ "kind": "StorageClass", "metadata": { "name": "sc-a" } }),
                json!({ "kind": "ClusterRole", "metadata": { "name": "cr-b" } }),
            ],
        });
        let mut config = TaskConfig::new("test-context");
        config.max_watch_seconds = 5;
        let summary = Arc::new(DeploySummary::new());
        let watcher = ResourceWatcher::new(api, config, summary.clone(), true);

        let mut resources = vec![
            global_resource("StorageClass", "sc-a"),
            global_resource("ClusterRole", "cr-b"),
        ];
        for r in &mut resources {
            r.mark_deploy_started();
        }

        watcher.run(&mut resources).await.unwrap();
        let actions = summary.actions();
        assert_eq!(
            actions,
            vec![
                "successfully deployed StorageClass/sc-a",
                "successfully deployed ClusterRole/cr-b"
            ],
            "summary must report resources in input order"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_marks_missing_resources_timed_out_at_deadline() {
        let api = Arc::new(FixedApi { objects: vec![] });
        let mut config = TaskConfig::new("test-context");
        config.max_watch_seconds = 4;
        let summary = Arc::new(DeploySummary::new());
        let watcher = ResourceWatcher::new(api, config, summary.clone(), true);

        let mut resources = vec![global_resource("StorageClass", "never-arrives")];
        resources[0].mark_deploy_started();

        let err = watcher.run(&mut resources).await.unwrap_err();
        assert!(matches!(err, TaskError::DeploymentTimeout));
        assert!(resources[0].deploy_timed_out());
        assert!(
            summary
                .actions()
                .contains(&"timed out waiting for StorageClass/never-arrives".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_takes_precedence_over_timed_out() {
        let api = Arc::new(FixedApi {
            objects: vec![json!({
                "kind": "CustomResourceDefinition",
                "metadata": { "name": "widgets.example.com" },
                "status": { "conditions": [
                    { "type": "NamesAccepted", "status": "False", "message": "name conflict" }
                ]}
            })],
        });
        let mut config = TaskConfig::new("test-context");
        config.max_watch_seconds = 5;
        let summary = Arc::new(DeploySummary::new());
        let watcher = ResourceWatcher::new(api.clone(), config, summary.clone(), true);

        let mut resources = vec![global_resource("CustomResourceDefinition", "widgets.example.com")];
        resources[0].mark_deploy_started();
        // Overlap the predicates: the resource is both failed and timed out
        let cache = ResourceCache::new(api.clone());
        resources[0].sync(&cache).await;
        resources[0].mark_timed_out();
        assert!(resources[0].deploy_failed() && resources[0].deploy_timed_out());

        let err = watcher.run(&mut resources).await.unwrap_err();
        assert!(
            matches!(err, TaskError::FatalDeployment(_)),
            "failed must win over timed_out: {err}"
        );
        let actions = summary.actions();
        assert!(actions[0].starts_with("failed to deploy"), "{:?}", actions);
    }
}
