//! cluster-deploy — cluster-scoped Kubernetes deploy engine
//!
//! Deploys a set of cluster-scoped (global) resources described by a
//! directory of manifest templates, then waits until every one of them has
//! reached its desired state — or fails fast with per-file diagnostics. It
//! is a deploy *engine* meant to be invoked from CI pipelines, not a
//! controller: one task, one exit code, no residency.
//!
//! # Library quick start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use cluster_deploy::config::TaskConfig;
//! use cluster_deploy::kube::{ApiServer, Kubectl};
//! use cluster_deploy::summary::TaskStatus;
//! use cluster_deploy::task::DeployGlobalTask;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = cluster_deploy::kube::client_for_context("production").await?;
//! let mut task = DeployGlobalTask::new(
//!     TaskConfig::new("production"),
//!     vec![PathBuf::from("/deploy/templates")],
//!     Arc::new(Kubectl::global("production")),
//!     Arc::new(ApiServer::new(client)),
//! );
//! assert_eq!(task.run().await, TaskStatus::Success);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod kube;
pub mod metrics;
pub mod resources;
pub mod summary;
pub mod task;
pub mod template;
pub mod watcher;

// Re-export the task entry point
pub use task::DeployGlobalTask;

// Re-export the pieces embedders wire together
pub use config::TaskConfig;
pub use deploy::{DeployOptions, ResourceDeployer};
pub use error::TaskError;
pub use kube::{ApiServer, ClusterApi, ClusterDiscovery, Kubectl, KubectlRunner, ResourceCache};
pub use resources::{Classification, DeployStrategy, Resource};
pub use summary::{DeploySummary, TaskStatus};
pub use template::TemplateSet;
pub use watcher::{ResourceWatcher, sync_resources};
