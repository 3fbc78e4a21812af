//! Cluster access backed by a live `kube::Client`

use super::{ClusterApi, KubeObject, ResourceStore, RolloutEvents, RolloutFeed};
use crate::config::ConnectionSettings;
use crate::error::{ApiFailure, DeployError, Result};
use crate::models::{RolloutEvent, RolloutStatus};
use async_trait::async_trait;
use futures::{future, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DynamicObject, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

const CONTEXT_NAME: &str = "default";

/// Server-side watch lifetime, kept above the longest rollout timeout
const WATCH_TIMEOUT_SECS: u32 = 294;

/// Build a client from explicit connection settings
///
/// Assembles a single-context kubeconfig in memory so that token auth,
/// CA validation and insecure mode all go through kube's own config
/// loading.
pub async fn build_client(settings: &ConnectionSettings) -> Result<Client> {
    settings.validate()?;

    if settings.insecure_skip_tls_verify {
        warn!(server = %settings.server, "TLS verification disabled for cluster connection");
    }

    let kubeconfig = kubeconfig_for(settings)?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            DeployError::ConfigurationInvalid(format!("failed to load cluster config: {}", e))
        })?;

    Client::try_from(config).map_err(|e| {
        DeployError::ConfigurationInvalid(format!("failed to create cluster client: {}", e))
    })
}

fn kubeconfig_for(settings: &ConnectionSettings) -> Result<Kubeconfig> {
    let mut cluster = json!({ "server": settings.server });
    if settings.insecure_skip_tls_verify {
        cluster["insecure-skip-tls-verify"] = json!(true);
    } else if let Some(ca) = settings.ca.as_deref() {
        cluster["certificate-authority-data"] = json!(ca.trim());
    }

    let mut context = json!({ "cluster": CONTEXT_NAME, "user": CONTEXT_NAME });
    if let Some(namespace) = settings.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        context["namespace"] = json!(namespace);
    }

    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": CONTEXT_NAME, "cluster": cluster }],
        "users": [{ "name": CONTEXT_NAME, "user": { "token": settings.token } }],
        "contexts": [{ "name": CONTEXT_NAME, "context": context }],
        "current-context": CONTEXT_NAME,
    });

    serde_json::from_value(document).map_err(|e| {
        DeployError::ConfigurationInvalid(format!("failed to assemble kubeconfig: {}", e))
    })
}

#[async_trait]
impl<K> ResourceStore<K> for Api<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<K, ApiFailure> {
        Api::get(self, name).await.map_err(ApiFailure::from)
    }

    async fn create(&self, object: &K) -> Result<K, ApiFailure> {
        Api::create(self, &PostParams::default(), object)
            .await
            .map_err(ApiFailure::from)
    }

    async fn replace(&self, name: &str, object: &K) -> Result<K, ApiFailure> {
        Api::replace(self, name, &PostParams::default(), object)
            .await
            .map_err(ApiFailure::from)
    }
}

/// Deployment status source using the watch API
pub struct KubeRolloutFeed {
    api: Api<Deployment>,
}

impl KubeRolloutFeed {
    pub fn new(api: Api<Deployment>) -> Self {
        Self { api }
    }
}

fn watch_params(name: &str) -> WatchParams {
    WatchParams::default()
        .fields(&format!("metadata.name={}", name))
        .timeout(WATCH_TIMEOUT_SECS)
}

#[async_trait]
impl RolloutFeed for KubeRolloutFeed {
    async fn subscribe(&self, name: &str) -> Result<RolloutEvents, ApiFailure> {
        let events = self.api.watch(&watch_params(name), "0").await?;

        let events = events.filter_map(|event| {
            future::ready(match event {
                Ok(WatchEvent::Added(d)) | Ok(WatchEvent::Modified(d)) => {
                    Some(Ok(RolloutEvent::Observed(RolloutStatus::of(&d))))
                }
                Ok(WatchEvent::Deleted(_)) => Some(Ok(RolloutEvent::Deleted)),
                Ok(WatchEvent::Bookmark(_)) => {
                    debug!("Skipping watch bookmark");
                    None
                }
                Ok(WatchEvent::Error(e)) => Some(Err(ApiFailure::from(e))),
                Err(e) => Some(Err(ApiFailure::from(e))),
            })
        });

        Ok(events.boxed())
    }

    async fn snapshot(&self, name: &str) -> Result<RolloutStatus, ApiFailure> {
        let deployment = self.api.get(name).await?;
        Ok(RolloutStatus::of(&deployment))
    }
}

/// Live cluster behind the deployer's API seams
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ClusterApi for KubeCluster {
    fn typed<K: KubeObject>(&self, namespace: &str) -> Arc<dyn ResourceStore<K>> {
        Arc::new(Api::<K>::namespaced(self.client.clone(), namespace))
    }

    fn dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
    ) -> Arc<dyn ResourceStore<DynamicObject>> {
        Arc::new(Api::<DynamicObject>::namespaced_with(
            self.client.clone(),
            namespace,
            resource,
        ))
    }

    fn rollouts(&self, namespace: &str) -> Arc<dyn RolloutFeed> {
        Arc::new(KubeRolloutFeed::new(Api::namespaced(
            self.client.clone(),
            namespace,
        )))
    }
}
