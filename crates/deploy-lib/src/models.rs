//! Core data models for a deploy run

use crate::error::DeployError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::Resource;
use std::fmt;

/// Resource kind tag of a decoded manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    ConfigMap,
    Service,
    Ingress,
    LegacyIngress,
    Secret,
    HorizontalAutoscaler,
    Unsupported,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::LegacyIngress => "Ingress (v1beta1)",
            ResourceKind::Secret => "Secret",
            ResourceKind::HorizontalAutoscaler => "HorizontalPodAutoscaler",
            ResourceKind::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded manifest object
///
/// Closed set of the kinds the deployer knows how to apply. Legacy
/// ingresses carry their API resource so the client can address the
/// exact group/version the template was written against.
#[derive(Debug, Clone)]
pub enum DesiredResource {
    Deployment(Deployment),
    ConfigMap(ConfigMap),
    Service(Service),
    Ingress(Ingress),
    LegacyIngress {
        resource: ApiResource,
        object: DynamicObject,
    },
    Secret(Secret),
    HorizontalAutoscaler(HorizontalPodAutoscaler),
    Unsupported {
        api_version: String,
        kind: String,
        metadata: ObjectMeta,
    },
}

impl DesiredResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredResource::Deployment(_) => ResourceKind::Deployment,
            DesiredResource::ConfigMap(_) => ResourceKind::ConfigMap,
            DesiredResource::Service(_) => ResourceKind::Service,
            DesiredResource::Ingress(_) => ResourceKind::Ingress,
            DesiredResource::LegacyIngress { .. } => ResourceKind::LegacyIngress,
            DesiredResource::Secret(_) => ResourceKind::Secret,
            DesiredResource::HorizontalAutoscaler(_) => ResourceKind::HorizontalAutoscaler,
            DesiredResource::Unsupported { .. } => ResourceKind::Unsupported,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            DesiredResource::Deployment(o) => o.meta(),
            DesiredResource::ConfigMap(o) => o.meta(),
            DesiredResource::Service(o) => o.meta(),
            DesiredResource::Ingress(o) => o.meta(),
            DesiredResource::LegacyIngress { object, .. } => &object.metadata,
            DesiredResource::Secret(o) => o.meta(),
            DesiredResource::HorizontalAutoscaler(o) => o.meta(),
            DesiredResource::Unsupported { metadata, .. } => metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Namespace written on the manifest itself, if any
    pub fn namespace(&self) -> Option<&str> {
        self.metadata()
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
    }
}

/// Live rollout state of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RolloutStatus {
    pub unavailable_replicas: u32,
}

impl RolloutStatus {
    pub fn new(unavailable_replicas: u32) -> Self {
        Self {
            unavailable_replicas,
        }
    }

    /// Read the status block of a deployment; missing or negative counts read as zero
    pub fn of(deployment: &Deployment) -> Self {
        let unavailable = deployment
            .status
            .as_ref()
            .and_then(|s| s.unavailable_replicas)
            .unwrap_or(0)
            .max(0);
        Self::new(unavailable as u32)
    }

    pub fn is_stable(&self) -> bool {
        self.unavailable_replicas == 0
    }
}

/// A change notification for the watched deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    Observed(RolloutStatus),
    Deleted,
}

/// Terminal result of a deploy run
#[derive(Debug)]
pub enum Outcome {
    /// Object written, nothing to wait for
    Applied,
    /// Deployment written and its rollout settled
    AppliedAndStable,
    /// Deployment written but still unavailable when the deadline fired
    AppliedButUnstable(DeployError),
    Failed(DeployError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::AppliedAndStable)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn error(&self) -> Option<&DeployError> {
        match self {
            Outcome::AppliedButUnstable(err) | Outcome::Failed(err) => Some(err),
            Outcome::Applied | Outcome::AppliedAndStable => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AppliedAndStable => "applied and stable",
            Outcome::AppliedButUnstable(_) => "applied but unstable",
            Outcome::Failed(_) => "failed",
        }
    }
}
