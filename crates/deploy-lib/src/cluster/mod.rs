//! Access to the cluster API
//!
//! The apply and rollout logic only talks to the cluster through the
//! traits in this module. [`KubeCluster`] backs them with a live
//! `kube::Client`; tests swap in an in-memory fake.

mod live;

pub use live::{build_client, KubeCluster, KubeRolloutFeed};

use crate::error::ApiFailure;
use crate::models::{RolloutEvent, RolloutStatus};
use futures::stream::BoxStream;
use k8s_openapi::NamespaceResourceScope;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Statically typed, namespaced API objects the deployer can manage
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Point operations on one resource type within one namespace
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    async fn get(&self, name: &str) -> Result<K, ApiFailure>;

    async fn create(&self, object: &K) -> Result<K, ApiFailure>;

    async fn replace(&self, name: &str, object: &K) -> Result<K, ApiFailure>;
}

/// Stream of change notifications for one deployment
pub type RolloutEvents = BoxStream<'static, Result<RolloutEvent, ApiFailure>>;

/// Live status source for deployment rollouts
#[async_trait]
pub trait RolloutFeed: Send + Sync {
    /// Open a change subscription scoped to the named deployment
    async fn subscribe(&self, name: &str) -> Result<RolloutEvents, ApiFailure>;

    /// Read the deployment's current status once
    async fn snapshot(&self, name: &str) -> Result<RolloutStatus, ApiFailure>;
}

/// Factory for namespaced stores and feeds
pub trait ClusterApi: Send + Sync {
    fn typed<K: KubeObject>(&self, namespace: &str) -> Arc<dyn ResourceStore<K>>;

    fn dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
    ) -> Arc<dyn ResourceStore<DynamicObject>>;

    fn rollouts(&self, namespace: &str) -> Arc<dyn RolloutFeed>;
}
