//! Step configuration
//!
//! The CI system hands step settings to the container as `PLUGIN_*`
//! environment variables.

use anyhow::Result;
use deploy_lib::config::{
    ConnectionSettings, RunConfig, DEFAULT_ROLLOUT_TIMEOUT_SECS, MAX_ROLLOUT_TIMEOUT_SECS,
};
use deploy_lib::DeployError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Step configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Cluster API endpoint
    #[serde(default)]
    pub server: String,

    /// Service account bearer token
    #[serde(default)]
    pub token: String,

    /// Base64-encoded CA bundle
    #[serde(default)]
    pub ca: Option<String>,

    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Target namespace override
    #[serde(default)]
    pub namespace: Option<String>,

    /// Path of the manifest template
    #[serde(default)]
    pub template: String,

    /// Path of an autoscaler template applied after a deployment
    #[serde(default)]
    pub hpa_template: Option<PathBuf>,

    /// File or directory loaded into ConfigMap data
    #[serde(default)]
    pub config_map_file: Option<PathBuf>,

    /// JSON object of annotations added to ingresses
    #[serde(default)]
    pub additional_annotations: Option<String>,

    /// Rollout timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_timeout() -> u64 {
    DEFAULT_ROLLOUT_TIMEOUT_SECS
}

impl PluginConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let source: config::Map<String, String> = vars.into_iter().collect();
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PLUGIN").source(Some(source)))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check every setting that can be checked without the cluster
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.template.trim().is_empty() {
            return Err(DeployError::ConfigurationInvalid(
                "PLUGIN_TEMPLATE is not defined".to_string(),
            ));
        }
        if self.timeout > MAX_ROLLOUT_TIMEOUT_SECS {
            return Err(DeployError::ConfigurationInvalid(format!(
                "PLUGIN_TIMEOUT is {}s, the maximum is {}s",
                self.timeout, MAX_ROLLOUT_TIMEOUT_SECS
            )));
        }
        self.connection_settings().validate()?;
        self.annotations()?;
        Ok(())
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            server: self.server.clone(),
            token: self.token.clone(),
            ca: non_empty(&self.ca),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            namespace: non_empty(&self.namespace),
        }
    }

    /// Parse the additional annotations setting
    pub fn annotations(&self) -> Result<BTreeMap<String, String>, DeployError> {
        match self.additional_annotations.as_deref().map(str::trim) {
            None | Some("") => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                DeployError::ConfigurationInvalid(format!(
                    "PLUGIN_ADDITIONAL_ANNOTATIONS is not a JSON object of strings: {}",
                    e
                ))
            }),
        }
    }

    /// Build the run inputs handed to the core
    ///
    /// The autoscaler is left unset; it comes from rendering `hpa_template`.
    pub fn run_config(
        &self,
        secret_data: BTreeMap<String, String>,
    ) -> Result<RunConfig, DeployError> {
        Ok(RunConfig {
            namespace: non_empty(&self.namespace),
            rollout_timeout: Duration::from_secs(self.timeout),
            config_map_source: self.config_map_file.clone(),
            additional_annotations: self.annotations()?,
            secret_data,
            autoscaler: None,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
