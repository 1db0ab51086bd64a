//! Kubernetes client module
//!
//! Connects to the target cluster for the read side of the pipeline
//! (discovery and status listings). Mutations never go through this client;
//! they go through [`kubectl::Kubectl`].

pub mod cache;
pub mod discovery;
pub mod kubectl;

use anyhow::{Context as _, Result, bail};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

pub use cache::ResourceCache;
pub use discovery::{ApiServer, ClusterApi, ClusterDiscovery, CrdSummary};
pub use kubectl::{CommandOutput, Kubectl, KubectlRunner, shell_join};

/// The catalog of contexts the local kubeconfig knows about.
///
/// A deploy task targets exactly one context, named on the command line; the
/// catalog exists to reject a typo'd `--context` before anything dials the
/// network, and to put the real choices in the error.
pub struct KubeContexts {
    names: Vec<String>,
}

impl KubeContexts {
    /// Read the kubeconfig (KUBECONFIG, then the platform default path) and
    /// collect its context names.
    pub fn load() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().context("Failed to load kubeconfig")?;
        let names = kubeconfig
            .contexts
            .into_iter()
            .map(|ctx| ctx.name)
            .collect();
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, context: &str) -> bool {
        self.names.iter().any(|name| name == context)
    }

    /// Check that `context` is deployable-to, with an error that names the
    /// alternatives.
    pub fn require(&self, context: &str) -> Result<()> {
        if self.names.is_empty() {
            bail!("The kubeconfig defines no contexts");
        }
        if !self.contains(context) {
            bail!(
                "Context '{}' is not defined in the kubeconfig (choices: {})",
                context,
                self.names.join(", ")
            );
        }
        Ok(())
    }
}

/// Build a client pinned to the named context.
pub async fn client_for_context(context: &str) -> Result<Client> {
    KubeContexts::load()?.require(context)?;

    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let config = Config::from_kubeconfig(&options)
        .await
        .with_context(|| format!("Failed to build client configuration for context '{context}'"))?;
    let client = Client::try_from(config)
        .with_context(|| format!("Failed to create client for context '{context}'"))?;
    tracing::debug!("Kubernetes client ready for context: {context}");
    Ok(client)
}
