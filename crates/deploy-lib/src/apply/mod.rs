//! Create-or-update of manifest resources
//!
//! Every kind goes through the same steps: look the object up, create it
//! when absent, otherwise replace it carrying the live concurrency token.
//! Kind-specific enrichment happens before the write.

mod enrich;
mod resolver;


pub use enrich::{
    merge_annotations, merge_config_map_entries, merge_secret_data, merge_service,
    read_config_map_source, ConfigMapEntries,
};
pub use resolver::{resolve, Identity};

use crate::cluster::{ClusterApi, ResourceStore};
use crate::error::{DeployError, Result};
use crate::observability::{ApplyAction, DeployLogger};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::Resource;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// An object as returned by the cluster after a write
#[derive(Debug, Clone)]
pub struct Applied<K> {
    pub object: K,
    pub action: ApplyAction,
}

/// Carry the live object's resource version onto the desired object
fn carry_resource_version<K: Resource>(mut desired: K, live: K) -> K {
    desired.meta_mut().resource_version = live.meta().resource_version.clone();
    desired
}

/// Writes resources into a single namespace
pub struct Applier<'a, C> {
    cluster: &'a C,
    logger: DeployLogger,
}

impl<'a, C: ClusterApi> Applier<'a, C> {
    pub fn new(cluster: &'a C, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            logger: DeployLogger::new(namespace),
        }
    }

    pub fn namespace(&self) -> &str {
        self.logger.namespace()
    }

    /// Shared create-or-update step
    ///
    /// `merge` builds the replacement from the desired and live objects.
    async fn create_or_update<K, F>(
        &self,
        store: &dyn ResourceStore<K>,
        kind: &str,
        mut desired: K,
        merge: F,
    ) -> Result<Applied<K>>
    where
        K: Resource,
        F: FnOnce(K, K) -> K,
    {
        desired.meta_mut().namespace = Some(self.namespace().to_string());
        let name = desired.meta().name.clone().unwrap_or_default();

        let (result, action) = match resolve(store, &name).await {
            Identity::QueryFailed(source) => {
                return Err(DeployError::IdentityQuery {
                    kind: kind.to_string(),
                    name,
                    source,
                });
            }
            Identity::Absent => {
                debug!(kind = %kind, name = %name, "Creating new resource");
                let created = store.create(&desired).await.map_err(|source| {
                    DeployError::Create {
                        kind: kind.to_string(),
                        name: name.clone(),
                        source,
                    }
                })?;
                (created, ApplyAction::Created)
            }
            Identity::Present(live) => {
                debug!(kind = %kind, name = %name, "Found existing resource, updating");
                let replacement = merge(desired, live);
                let updated = store.replace(&name, &replacement).await.map_err(|source| {
                    DeployError::Update {
                        kind: kind.to_string(),
                        name: name.clone(),
                        source,
                    }
                })?;
                (updated, ApplyAction::Updated)
            }
        };

        self.logger.log_applied(kind, &name, action);
        Ok(Applied {
            object: result,
            action,
        })
    }

    /// Apply a deployment, then its autoscaler when one is given
    pub async fn apply_deployment(
        &self,
        deployment: Deployment,
        autoscaler: Option<HorizontalPodAutoscaler>,
    ) -> Result<Applied<Deployment>> {
        let store = self.cluster.typed::<Deployment>(self.namespace());
        let applied = self
            .create_or_update(store.as_ref(), "Deployment", deployment, carry_resource_version)
            .await?;

        if let Some(hpa) = autoscaler {
            info!(
                name = %hpa.metadata.name.as_deref().unwrap_or_default(),
                "Applying autoscaler for deployment"
            );
            if let Err(e) = self.apply_autoscaler(hpa).await {
                return Err(DeployError::AutoscalerAfterDeployment {
                    deployment: applied.object.metadata.name.clone().unwrap_or_default(),
                    source: Box::new(e),
                });
            }
        }

        Ok(applied)
    }

    pub async fn apply_autoscaler(
        &self,
        hpa: HorizontalPodAutoscaler,
    ) -> Result<Applied<HorizontalPodAutoscaler>> {
        let store = self.cluster.typed::<HorizontalPodAutoscaler>(self.namespace());
        self.create_or_update(
            store.as_ref(),
            "HorizontalPodAutoscaler",
            hpa,
            carry_resource_version,
        )
        .await
    }

    /// Apply a config map, filling its data from `source` when given
    pub async fn apply_config_map(
        &self,
        mut config_map: ConfigMap,
        source: Option<&Path>,
    ) -> Result<Applied<ConfigMap>> {
        if let Some(path) = source {
            info!(path = %path.display(), "Reading config map contents");
            let entries = read_config_map_source(path)?;
            debug!(entries = entries.len(), "Read config map entries");
            merge_config_map_entries(&mut config_map, entries);
        }

        let store = self.cluster.typed::<ConfigMap>(self.namespace());
        self.create_or_update(store.as_ref(), "ConfigMap", config_map, carry_resource_version)
            .await
    }

    pub async fn apply_service(&self, service: Service) -> Result<Applied<Service>> {
        let store = self.cluster.typed::<Service>(self.namespace());
        self.create_or_update(store.as_ref(), "Service", service, merge_service)
            .await
    }

    pub async fn apply_ingress(
        &self,
        mut ingress: Ingress,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Applied<Ingress>> {
        merge_annotations(&mut ingress.metadata, annotations);

        let store = self.cluster.typed::<Ingress>(self.namespace());
        self.create_or_update(store.as_ref(), "Ingress", ingress, carry_resource_version)
            .await
    }

    /// Apply an ingress written against a legacy API group/version
    pub async fn apply_legacy_ingress(
        &self,
        resource: &ApiResource,
        mut ingress: DynamicObject,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Applied<DynamicObject>> {
        merge_annotations(&mut ingress.metadata, annotations);

        let store = self.cluster.dynamic(self.namespace(), resource);
        let kind = format!("{} ({})", resource.kind, resource.api_version);
        self.create_or_update(store.as_ref(), &kind, ingress, carry_resource_version)
            .await
    }

    pub async fn apply_secret(
        &self,
        mut secret: Secret,
        data: &BTreeMap<String, String>,
    ) -> Result<Applied<Secret>> {
        merge_secret_data(&mut secret, data);

        let store = self.cluster.typed::<Secret>(self.namespace());
        self.create_or_update(store.as_ref(), "Secret", secret, carry_resource_version)
            .await
    }
}
