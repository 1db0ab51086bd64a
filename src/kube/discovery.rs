//! Cluster discovery
//!
//! One-shot queries answering two questions the deploy pipeline needs before
//! it can classify anything: which kinds are cluster-scoped, and which CRDs
//! exist. Results are fetched once and held for the task's lifetime.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::core::{ApiResource, DynamicObject};
use kube::discovery::Scope;
use kube::{Api, Client, Discovery};
use serde_json::Value;

/// The slice of a CustomResourceDefinition the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrdSummary {
    pub name: String,
    pub kind: String,
    pub group: String,
}

/// Memoized discovery results for one task.
#[derive(Debug, Clone, Default)]
pub struct ClusterDiscovery {
    global_kinds: BTreeSet<String>,
    crds: Vec<CrdSummary>,
    api_resources: HashMap<String, ApiResource>,
}

impl ClusterDiscovery {
    /// Run API discovery and list CRDs. Failure here means the API server is
    /// unreachable or refusing us; the validator surfaces it as fatal.
    pub async fn fetch(client: &Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .context("API discovery failed; is the API server reachable?")?;

        let mut global_kinds = BTreeSet::new();
        let mut api_resources = HashMap::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                // First registration wins; discovery lists preferred versions first
                api_resources.entry(ar.kind.clone()).or_insert(ar.clone());
                if caps.scope == Scope::Cluster {
                    global_kinds.insert(ar.kind.clone());
                }
            }
        }

        let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
        let crds = crd_api
            .list(&ListParams::default())
            .await
            .context("Failed to list CustomResourceDefinitions")?
            .items
            .into_iter()
            .map(|crd| CrdSummary {
                name: crd.metadata.name.unwrap_or_default(),
                kind: crd.spec.names.kind.clone(),
                group: crd.spec.group.clone(),
            })
            .collect();

        Ok(Self {
            global_kinds,
            crds,
            api_resources,
        })
    }

    /// Build from already-known parts. Used by tests and by callers that
    /// snapshot discovery out-of-band.
    pub fn from_parts(global_kinds: BTreeSet<String>, crds: Vec<CrdSummary>) -> Self {
        Self {
            global_kinds,
            crds,
            api_resources: HashMap::new(),
        }
    }

    /// All cluster-scoped kinds known to the API server.
    pub fn global_resource_kinds(&self) -> &BTreeSet<String> {
        &self.global_kinds
    }

    /// All CRDs installed on the cluster.
    pub fn crds(&self) -> &[CrdSummary] {
        &self.crds
    }

    pub fn api_resource(&self, kind: &str) -> Option<&ApiResource> {
        self.api_resources.get(kind)
    }
}

/// Narrow read interface to the API server.
///
/// The deploy core only ever needs discovery and list-by-kind; everything
/// else goes through kubectl. Keeping this a trait lets tests run the whole
/// pipeline against canned objects.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn discover(&self) -> Result<ClusterDiscovery>;

    /// List current objects of `kind`, as raw JSON. `namespace` is `None`
    /// for cluster-scoped kinds. Unknown kinds yield an empty list.
    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>>;
}

/// Production [`ClusterApi`] backed by a kube [`Client`].
pub struct ApiServer {
    client: Client,
    resolved: std::sync::RwLock<HashMap<String, ApiResource>>,
}

impl ApiServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resolved: std::sync::RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ClusterApi for ApiServer {
    async fn discover(&self) -> Result<ClusterDiscovery> {
        let discovery = ClusterDiscovery::fetch(&self.client).await?;
        let mut resolved = self.resolved.write().unwrap();
        *resolved = discovery.api_resources.clone();
        Ok(discovery)
    }

    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>> {
        let Some(ar) = self.resolved.read().unwrap().get(kind).cloned() else {
            // Kind not served by this cluster; callers treat missing as absent
            tracing::debug!("No API resource known for kind {kind}; returning empty list");
            return Ok(Vec::new());
        };

        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };

        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {kind} objects"))?;

        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(&obj).context("Failed to serialize listed object"))
            .collect()
    }
}
