//! Run configuration values handed to the core
//!
//! These are plain values built once at the process boundary. Nothing in
//! the core reads the environment itself.

use crate::error::{DeployError, Result};
use base64::Engine;
use k8s_openapi::api::autoscaling::v1::HorizontalPodAutoscaler;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix marking CI settings in the environment
pub const VARIABLE_PREFIX: &str = "PLUGIN_";

/// Variable key prefix marking values destined for a Secret
pub const SECRET_DATA_PREFIX: &str = "data_secret";

/// Rollout timeout used when none is configured
pub const DEFAULT_ROLLOUT_TIMEOUT_SECS: u64 = 120;

/// Longest rollout timeout accepted
///
/// API servers end a watch after at most 295s; the rollout deadline has to
/// fire before the subscription is closed from the server side.
pub const MAX_ROLLOUT_TIMEOUT_SECS: u64 = 290;

/// Namespace used when neither the run nor the manifest names one
pub const FALLBACK_NAMESPACE: &str = "default";

/// Connection parameters for the cluster API
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub server: String,
    pub token: String,
    /// Base64-encoded PEM bundle of the cluster CA
    pub ca: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub namespace: Option<String>,
}

impl ConnectionSettings {
    /// Check the settings before any remote call is made
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(DeployError::ConfigurationInvalid(
                "PLUGIN_SERVER is not defined".to_string(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(DeployError::ConfigurationInvalid(
                "PLUGIN_TOKEN is not defined".to_string(),
            ));
        }

        match self.ca.as_deref().filter(|ca| !ca.trim().is_empty()) {
            Some(ca) => {
                base64::engine::general_purpose::STANDARD
                    .decode(ca.trim())
                    .map_err(|e| {
                        DeployError::ConfigurationInvalid(format!(
                            "PLUGIN_CA is not valid base64: {}",
                            e
                        ))
                    })?;
            }
            None if self.insecure_skip_tls_verify => {}
            None => {
                return Err(DeployError::ConfigurationInvalid(
                    "PLUGIN_CA is not defined and PLUGIN_INSECURE_SKIP_TLS_VERIFY is not set"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Inputs that shape a single apply-and-watch run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Explicit target namespace; falls back to the manifest's own
    pub namespace: Option<String>,
    pub rollout_timeout: Duration,
    /// File or directory whose contents become ConfigMap data
    pub config_map_source: Option<PathBuf>,
    /// Merged into ingress annotations, winning on collision
    pub additional_annotations: BTreeMap<String, String>,
    /// Merged into a Secret's stringData
    pub secret_data: BTreeMap<String, String>,
    /// Applied right after a deployment when present
    pub autoscaler: Option<HorizontalPodAutoscaler>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            rollout_timeout: Duration::from_secs(DEFAULT_ROLLOUT_TIMEOUT_SECS),
            config_map_source: None,
            additional_annotations: BTreeMap::new(),
            secret_data: BTreeMap::new(),
            autoscaler: None,
        }
    }
}

impl RunConfig {
    /// Pick the namespace a resource is applied into
    pub fn resolve_namespace(&self, manifest_namespace: Option<&str>) -> String {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(manifest_namespace.filter(|ns| !ns.is_empty()))
            .unwrap_or(FALLBACK_NAMESPACE)
            .to_string()
    }
}

/// Collect template variables from `PLUGIN_*` entries
///
/// Keys lose the prefix and are lower-cased.
pub fn template_variables<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(VARIABLE_PREFIX)
                .filter(|rest| !rest.is_empty())
                .map(|rest| (rest.to_lowercase(), value))
        })
        .collect()
}

/// Extract Secret entries from template variables
///
/// `data_secret_db_password` becomes `db_password`.
pub fn secret_data(variables: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    variables
        .iter()
        .filter_map(|(key, value)| {
            let rest = key.strip_prefix(SECRET_DATA_PREFIX)?.trim_matches('_');
            if rest.is_empty() {
                None
            } else {
                Some((rest.to_string(), value.clone()))
            }
        })
        .collect()
}
