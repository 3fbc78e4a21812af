//! Decoding rendered manifests into typed resources

use crate::error::{DeployError, Result};
use crate::models::DesiredResource;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DynamicObject, GroupVersionKind};
use kube::discovery::ApiResource;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

/// API versions still accepted for the legacy ingress shape
const LEGACY_INGRESS_VERSIONS: &[&str] = &["networking.k8s.io/v1beta1", "extensions/v1beta1"];

/// Decode one YAML document into a [`DesiredResource`]
///
/// Kinds outside the supported set decode to [`DesiredResource::Unsupported`]
/// so the caller can report them without touching the cluster.
pub fn decode(text: &str) -> Result<DesiredResource> {
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| DeployError::Decode(e.to_string()))?;

    if value.is_null() {
        return Err(DeployError::Decode("manifest is empty".to_string()));
    }

    let api_version = string_field(&value, "apiVersion")?;
    let kind = string_field(&value, "kind")?;

    let resource = match (api_version.as_str(), kind.as_str()) {
        ("apps/v1", "Deployment") => DesiredResource::Deployment(typed(value)?),
        ("v1", "ConfigMap") => DesiredResource::ConfigMap(typed(value)?),
        ("v1", "Service") => DesiredResource::Service(typed(value)?),
        ("v1", "Secret") => DesiredResource::Secret(typed(value)?),
        ("networking.k8s.io/v1", "Ingress") => DesiredResource::Ingress(typed(value)?),
        ("autoscaling/v1", "HorizontalPodAutoscaler") => {
            DesiredResource::HorizontalAutoscaler(typed(value)?)
        }
        (version, "Ingress") if LEGACY_INGRESS_VERSIONS.contains(&version) => {
            let (group, ver) = version.split_once('/').unwrap_or(("", version));
            let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, ver, "Ingress"));
            let object: DynamicObject = typed(value)?;
            DesiredResource::LegacyIngress { resource, object }
        }
        _ => {
            let metadata = match value.get("metadata") {
                Some(meta) => serde_yaml::from_value::<ObjectMeta>(meta.clone())
                    .map_err(|e| DeployError::Decode(e.to_string()))?,
                None => ObjectMeta::default(),
            };
            DesiredResource::Unsupported {
                api_version,
                kind,
                metadata,
            }
        }
    };

    if resource.name().is_empty() && !matches!(resource, DesiredResource::Unsupported { .. }) {
        return Err(DeployError::Decode(format!(
            "{} has no metadata.name",
            resource.kind()
        )));
    }

    Ok(resource)
}

/// Decode a document that must be a horizontal pod autoscaler
pub fn decode_autoscaler(text: &str) -> Result<HorizontalPodAutoscaler> {
    match decode(text)? {
        DesiredResource::HorizontalAutoscaler(hpa) => Ok(hpa),
        other => Err(DeployError::Decode(format!(
            "autoscaler template decoded to {}, expected autoscaling/v1 HorizontalPodAutoscaler",
            other.kind()
        ))),
    }
}

fn string_field(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DeployError::Decode(format!("manifest has no {}", field)))
}

fn typed<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_yaml::from_value(value).map_err(|e| DeployError::Decode(e.to_string()))
}
