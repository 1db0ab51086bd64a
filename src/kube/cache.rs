//! Per-task resource cache
//!
//! Status sync fans out over many resources; without a cache each one would
//! issue its own API call. The cache is keyed by `(kind, namespace)` and is
//! list-once/read-many: the first access for a key performs a single list,
//! everything after that is served from memory. `prefetch` batches the key
//! set up front so the fan-out workers only ever hit memory.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::kube::discovery::ClusterApi;
use crate::resources::Resource;

type CacheKey = (String, String);

pub struct ResourceCache {
    api: Arc<dyn ClusterApi>,
    store: Mutex<HashMap<CacheKey, HashMap<String, Value>>>,
}

impl ResourceCache {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self {
            api,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Populate the cache for every kind the given resources will touch
    /// during sync, including each kind's declared prefetch extras (for
    /// example CronJob pulls in Pod).
    pub async fn prefetch<'a>(&self, resources: impl IntoIterator<Item = &'a Resource>) {
        let mut keys: Vec<CacheKey> = Vec::new();
        for resource in resources {
            let key = (resource.kind().to_string(), String::new());
            if !keys.contains(&key) {
                keys.push(key);
            }
            for extra in resource.behavior().prefetch_kinds_on_sync() {
                let key = (extra.to_string(), String::new());
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        for (kind, namespace) in keys {
            self.ensure_fetched(&kind, &namespace).await;
        }
    }

    /// Look up a single object by name. `namespace` is `None` for
    /// cluster-scoped kinds.
    pub async fn get_instance(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<Value> {
        let ns = namespace.unwrap_or("");
        self.ensure_fetched(kind, ns).await;
        let store = self.store.lock().await;
        store
            .get(&(kind.to_string(), ns.to_string()))
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    /// All cached objects of a kind, in name order.
    pub async fn get_instances(&self, kind: &str, namespace: Option<&str>) -> Vec<Value> {
        let ns = namespace.unwrap_or("");
        self.ensure_fetched(kind, ns).await;
        let store = self.store.lock().await;
        let mut named: Vec<(&String, &Value)> = store
            .get(&(kind.to_string(), ns.to_string()))
            .map(|objects| objects.iter().collect())
            .unwrap_or_default();
        named.sort_by(|a, b| a.0.cmp(b.0));
        named.into_iter().map(|(_, v)| v.clone()).collect()
    }

    /// Seed a key directly. Lets tests (and snapshot tooling) run sync
    /// without an API server behind the cache.
    pub async fn seed(&self, kind: &str, namespace: Option<&str>, objects: Vec<Value>) {
        let ns = namespace.unwrap_or("").to_string();
        let mut store = self.store.lock().await;
        store.insert((kind.to_string(), ns), index_by_name(objects));
    }

    async fn ensure_fetched(&self, kind: &str, namespace: &str) {
        // The lock is held across the list call so each key is listed once
        // even when workers race on a miss.
        let mut store = self.store.lock().await;
        let key = (kind.to_string(), namespace.to_string());
        if store.contains_key(&key) {
            return;
        }
        let ns = (!namespace.is_empty()).then_some(namespace);
        let objects = match self.api.list(kind, ns).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!("Failed to list {kind}: {e:#}; treating as absent");
                Vec::new()
            }
        };
        store.insert(key, index_by_name(objects));
    }
}

fn index_by_name(objects: Vec<Value>) -> HashMap<String, Value> {
    objects
        .into_iter()
        .filter_map(|obj| {
            let name = obj
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|n| n.as_str())?
                .to_string();
            Some((name, obj))
        })
        .collect()
}
