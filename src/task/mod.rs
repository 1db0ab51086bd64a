//! Deploy task orchestration
//!
//! `DeployGlobalTask` wires the pipeline together and sequences its phases:
//! initialize, validate, initial status, deploy, verify. A failure in an
//! earlier phase aborts the later ones. The task owns the summary and the
//! metrics sink; the components below it only append.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigValidator, TaskConfig};
use crate::deploy::{DeployOptions, ResourceDeployer, record_invalid_template};
use crate::error::TaskError;
use crate::kube::cache::ResourceCache;
use crate::kube::discovery::ClusterApi;
use crate::kube::kubectl::KubectlRunner;
use crate::metrics::{AlertType, LogStats, StatsSink, measure, task_tags};
use crate::resources::Classification;
use crate::summary::{DeploySummary, TaskStatus, Tone};
use crate::template::TemplateSet;
use crate::watcher::sync_resources;

pub struct DeployGlobalTask {
    config: TaskConfig,
    template_paths: Vec<PathBuf>,
    kubectl: Arc<dyn KubectlRunner>,
    api: Arc<dyn ClusterApi>,
    summary: Arc<DeploySummary>,
    stats: Arc<dyn StatsSink>,
    options: DeployOptions,
}

impl DeployGlobalTask {
    pub fn new(
        config: TaskConfig,
        template_paths: Vec<PathBuf>,
        kubectl: Arc<dyn KubectlRunner>,
        api: Arc<dyn ClusterApi>,
    ) -> Self {
        Self {
            config,
            template_paths,
            kubectl,
            api,
            summary: Arc::new(DeploySummary::new()),
            stats: Arc::new(LogStats),
            options: DeployOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// The summary this task appends to; callers can inspect it after `run`.
    pub fn summary(&self) -> Arc<DeploySummary> {
        self.summary.clone()
    }

    /// Run the task to completion and classify the outcome.
    ///
    /// `Success` iff every resource succeeded; `TimedOut` iff every
    /// non-success resource merely timed out; `Failure` otherwise.
    pub async fn run(&mut self) -> TaskStatus {
        tracing::info!(
            "Deploy started at {} (context: {})",
            chrono::Utc::now().to_rfc3339(),
            self.config.context
        );
        let stats = self.stats.clone();
        let context = self.config.context.clone();
        let result = measure(stats.as_ref(), "task_duration", self.run_phases(), |result| {
            task_tags(&context, Some(status_of(result).metric_tag()))
        })
        .await;

        let status = status_of(&result);
        match &result {
            Ok(()) => tracing::info!("Deploy succeeded"),
            Err(e) => {
                tracing::error!("Deploy failed: {e}");
                self.summary.add_paragraph(e.to_string(), Tone::Failure);
            }
        }

        if status == TaskStatus::Failure {
            if let Err(e) = &result {
                let tags = task_tags(&self.config.context, Some(status.metric_tag()));
                self.stats
                    .event("Deploy failed", &e.to_string(), AlertType::Error, &tags);
            }
        }

        self.summary.print_summary(status);
        status
    }

    async fn run_phases(&mut self) -> Result<(), TaskError> {
        self.summary.phase_heading("Initializing deploy");
        let template_set = TemplateSet::discover(&self.template_paths)?;

        self.summary.phase_heading("Validating configuration");
        let validator = ConfigValidator::new(&self.config, &self.template_paths);
        let discovery = validator.validate(self.api.as_ref()).await?;
        // The global kind set is frozen here; later phases receive the
        // config by value and never write it.
        self.config.global_kinds = discovery.global_resource_kinds().clone();

        let mut resources = template_set.into_resources(&self.config);
        if resources.is_empty() {
            return Err(TaskError::FatalDeployment(
                "No deployable resources found in the template paths".to_string(),
            ));
        }
        if let Some(namespaced) = resources
            .iter()
            .find(|r| r.classification() == Classification::Namespaced)
        {
            tracing::error!("{namespaced} is not cluster-scoped");
            return Err(TaskError::FatalDeployment(
                "Deploying namespaced resource is not allowed from this command.".to_string(),
            ));
        }

        let mut invalid_count = 0;
        for resource in &mut resources {
            if let Err(err) = resource
                .validate_definition(self.kubectl.as_ref(), self.config.selector.as_deref())
                .await
            {
                record_invalid_template(&self.summary, resource, &err);
                invalid_count += 1;
            }
        }
        if invalid_count > 0 {
            return Err(TaskError::FatalDeployment(format!(
                "Template validation failed for {invalid_count} resource(s)"
            )));
        }

        self.summary.phase_heading("Checking initial resource statuses");
        let cache = ResourceCache::new(self.api.clone());
        cache.prefetch(resources.iter()).await;
        sync_resources(&mut resources, &cache).await;
        for resource in &resources {
            tracing::info!("{}", resource.pretty_status());
        }

        self.summary.phase_heading("Deploying all resources");
        let deployer = ResourceDeployer::new(
            self.kubectl.clone(),
            self.api.clone(),
            self.config.clone(),
            self.summary.clone(),
        );
        deployer.deploy(&mut resources, &self.options).await
    }
}

fn status_of(result: &Result<(), TaskError>) -> TaskStatus {
    match result {
        Ok(()) => TaskStatus::Success,
        Err(TaskError::DeploymentTimeout) => TaskStatus::TimedOut,
        Err(_) => TaskStatus::Failure,
    }
}
