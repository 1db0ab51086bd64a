//! cluster-deploy — deploy cluster-scoped Kubernetes resources from manifest
//! templates and wait for them to converge.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};

use cluster_deploy::config::{DEFAULT_MAX_WATCH_SECONDS, TaskConfig};
use cluster_deploy::deploy::DeployOptions;
use cluster_deploy::kube::{ApiServer, Kubectl};
use cluster_deploy::summary::TaskStatus;
use cluster_deploy::task::DeployGlobalTask;

/// Deploy cluster-scoped Kubernetes resources and verify they converge
#[derive(Parser, Debug)]
#[command(name = "cluster-deploy")]
#[command(about = "Deploys cluster-scoped resources from manifest templates", long_about = None)]
struct Args {
    /// Kubeconfig context to deploy to
    #[arg(long)]
    context: String,

    /// Files or directories containing the manifest templates
    #[arg(long = "template-paths", required = true, num_args = 1..)]
    template_paths: Vec<PathBuf>,

    /// Label selector restricting prune eligibility (k=v,k2=v2)
    #[arg(long)]
    selector: Option<String>,

    /// Global deadline for the verification phase, in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_WATCH_SECONDS)]
    max_watch_seconds: u64,

    /// Wait for resources to reach their desired state
    #[arg(long = "verify-result", default_value_t = true, action = ArgAction::Set)]
    verify_result: bool,

    /// Delete previously-applied cluster-scoped objects missing from the set
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    prune: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cluster_deploy::cli::init_logging(args.verbose);

    let client = cluster_deploy::kube::client_for_context(&args.context).await?;

    let mut config = TaskConfig::new(&args.context);
    config.selector = args.selector;
    config.max_watch_seconds = args.max_watch_seconds;

    let mut task = DeployGlobalTask::new(
        config,
        args.template_paths,
        Arc::new(Kubectl::global(&args.context)),
        Arc::new(ApiServer::new(client)),
    )
    .with_options(DeployOptions {
        verify: args.verify_result,
        prune: args.prune,
        record_summary: true,
    });

    let status = task.run().await;
    if status != TaskStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
