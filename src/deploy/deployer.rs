//! Resource deployer
//!
//! Dispatches resources to the cluster: replace/create for kinds that are
//! deployed individually, one bulk `kubectl apply` for everything else, with
//! optional pruning. Any unrecoverable condition surfaces as a fatal
//! deployment error; the only consumed failure is replace-not-found, which
//! falls back to create.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::TaskConfig;
use crate::deploy::error_report::{parse_pruned, record_apply_failure};
use crate::error::TaskError;
use crate::kube::discovery::ClusterApi;
use crate::kube::kubectl::{KubectlRunner, shell_join};
use crate::resources::{Classification, DeployStrategy, Resource};
use crate::summary::DeploySummary;
use crate::watcher::ResourceWatcher;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Watch resources until they converge (or fail, or time out).
    pub verify: bool,
    /// Delete previously-applied objects missing from the input set.
    pub prune: bool,
    /// Record per-resource outcomes in the summary.
    pub record_summary: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            verify: true,
            prune: true,
            record_summary: true,
        }
    }
}

pub struct ResourceDeployer {
    kubectl: Arc<dyn KubectlRunner>,
    api: Arc<dyn ClusterApi>,
    config: TaskConfig,
    summary: Arc<DeploySummary>,
}

impl ResourceDeployer {
    pub fn new(
        kubectl: Arc<dyn KubectlRunner>,
        api: Arc<dyn ClusterApi>,
        config: TaskConfig,
        summary: Arc<DeploySummary>,
    ) -> Self {
        Self {
            kubectl,
            api,
            config,
            summary,
        }
    }

    /// Deploy every resource in list order, then verify if asked.
    ///
    /// Preconditions: `resources` is non-empty and every entry is
    /// cluster-scoped. Both are enforced here even though the orchestrator
    /// checks earlier; no namespaced resource may ever reach kubectl.
    pub async fn deploy(
        &self,
        resources: &mut [Resource],
        options: &DeployOptions,
    ) -> Result<(), TaskError> {
        if resources.is_empty() {
            return Err(TaskError::FatalDeployment(
                "No resources to deploy".to_string(),
            ));
        }
        if resources
            .iter()
            .any(|r| r.classification() == Classification::Namespaced)
        {
            return Err(TaskError::FatalDeployment(
                "Deploying namespaced resource is not allowed from this command.".to_string(),
            ));
        }

        let mut applyable_idx: Vec<usize> = Vec::new();
        let mut individual_idx: Vec<usize> = Vec::new();
        for (i, resource) in resources.iter().enumerate() {
            if resource.deploy_strategy() == DeployStrategy::Apply {
                applyable_idx.push(i);
            } else {
                individual_idx.push(i);
                // Prune-whitelisted kinds must also be visible to the apply
                // pass, or --prune would delete what was just replaced.
                if resource.prunable() {
                    applyable_idx.push(i);
                }
            }
        }

        for &i in &individual_idx {
            self.deploy_individual(&mut resources[i]).await?;
        }

        self.apply_all(resources, &applyable_idx, options.prune)
            .await?;

        if options.verify {
            self.summary.phase_heading("Verifying deployment");
            let watcher = ResourceWatcher::new(
                self.api.clone(),
                self.config.clone(),
                self.summary.clone(),
                options.record_summary,
            );
            watcher.run(resources).await?;
        } else if options.record_summary {
            self.summary.add_action(format!(
                "deployed {} resource(s) (verification skipped)",
                resources.len()
            ));
        }
        Ok(())
    }

    /// Replace (or replace --force --cascade), falling back to create when
    /// the object does not exist yet. No retry beyond that fallback.
    async fn deploy_individual(&self, resource: &mut Resource) -> Result<(), TaskError> {
        let path = resource.file_path().display().to_string();
        let replace_args: Vec<String> = match resource.deploy_strategy() {
            DeployStrategy::Replace => vec![
                "replace".to_string(),
                "-f".to_string(),
                path.clone(),
            ],
            DeployStrategy::ReplaceForce => vec![
                "replace".to_string(),
                "--force".to_string(),
                "--cascade".to_string(),
                "-f".to_string(),
                path.clone(),
            ],
            // Apply-strategy resources are handled by the bulk pass
            DeployStrategy::Apply => return Ok(()),
        };

        resource.mark_deploy_started();
        tracing::info!("Deploying {resource} individually");

        // Replace failure is an expected condition (object absent), so its
        // stderr stays out of the logs.
        let replaced = self
            .kubectl
            .run(&replace_args, false)
            .await
            .map_err(TaskError::fatal)?;
        if replaced.success {
            return Ok(());
        }

        let create_args: Vec<String> =
            vec!["create".to_string(), "-f".to_string(), path.clone()];
        let created = self
            .kubectl
            .run(&create_args, false)
            .await
            .map_err(TaskError::fatal)?;
        if created.success {
            return Ok(());
        }

        let mut msg = format!("Failed to replace or create {resource}");
        if !resource.sensitive_output() {
            msg.push_str(&format!(": {}", created.stderr.trim()));
        }
        Err(TaskError::FatalDeployment(msg))
    }

    /// Bulk apply: stage exactly the applyable set into a fresh temp
    /// directory and hand the directory to `kubectl apply -f`, which is the
    /// only idempotent bulk path.
    async fn apply_all(
        &self,
        resources: &mut [Resource],
        applyable_idx: &[usize],
        prune: bool,
    ) -> Result<(), TaskError> {
        if applyable_idx.is_empty() {
            return Ok(());
        }

        // TempDir removes the staging directory on every exit path.
        let staging = tempfile::tempdir().map_err(|e| {
            TaskError::fatal(format!("Failed to create temporary apply directory: {e}"))
        })?;
        self.stage_applyables(staging.path(), resources, applyable_idx)?;

        for &i in applyable_idx {
            resources[i].mark_deploy_started();
        }

        let mut args = vec![
            "apply".to_string(),
            "-f".to_string(),
            staging.path().display().to_string(),
        ];
        if prune {
            args.push("--prune".to_string());
            match &self.config.selector {
                Some(selector) => {
                    args.push("--selector".to_string());
                    args.push(selector.clone());
                }
                // The apply CLI requires --all to prune without a selector
                None => args.push("--all".to_string()),
            }
            for entry in &self.config.prune_whitelist {
                args.push(format!("--prune-whitelist={entry}"));
            }
        }

        let output_is_sensitive = applyable_idx
            .iter()
            .any(|&i| resources[i].sensitive_output());
        let output = self
            .kubectl
            .run(&args, !output_is_sensitive)
            .await
            .map_err(TaskError::fatal)?;

        if output.success {
            tracing::info!("Applied {} resource(s)", applyable_idx.len());
            if prune {
                let pruned = parse_pruned(&output.stdout);
                for name in &pruned {
                    tracing::info!("Pruned {name}");
                }
                self.summary
                    .add_action(format!("pruned {} resource(s)", pruned.len()));
            }
            Ok(())
        } else {
            let attempted: Vec<&Resource> =
                applyable_idx.iter().map(|&i| &resources[i]).collect();
            record_apply_failure(&output.stderr, &attempted, &self.summary);
            Err(TaskError::FatalDeployment(format!(
                "Command failed: {}",
                shell_join(&args)
            )))
        }
    }

    /// One link per applyable, so the apply sees the intended set and
    /// nothing else. Multi-document files are staged once; basename
    /// collisions across directories get a numeric prefix.
    fn stage_applyables(
        &self,
        staging: &Path,
        resources: &[Resource],
        applyable_idx: &[usize],
    ) -> Result<(), TaskError> {
        let mut staged_sources: HashSet<std::path::PathBuf> = HashSet::new();
        let mut used_names: HashSet<String> = HashSet::new();

        for &i in applyable_idx {
            let source = resources[i].file_path();
            if !staged_sources.insert(source.to_path_buf()) {
                continue;
            }
            let base = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    TaskError::fatal(format!(
                        "Template path has no file name: {}",
                        source.display()
                    ))
                })?;
            let mut link_name = base.clone();
            let mut counter = 1;
            while !used_names.insert(link_name.clone()) {
                link_name = format!("{counter}-{base}");
                counter += 1;
            }
            stage_file(source, &staging.join(&link_name)).map_err(|e| {
                TaskError::fatal(format!(
                    "Failed to stage {} for apply: {e}",
                    source.display()
                ))
            })?;
        }
        Ok(())
    }
}

/// Symlink where supported, copy where not; either way the staged file
/// mirrors the source template exactly.
fn stage_file(source: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        match std::os::unix::fs::symlink(source, link) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    "symlink for {} failed ({e}); copying instead",
                    source.display()
                );
            }
        }
    }
    std::fs::copy(source, link).map(|_| ())
}
