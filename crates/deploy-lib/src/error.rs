//! Error types for the deploy pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// HTTP status the API server uses for a missing object
pub const NOT_FOUND: u16 = 404;

/// A failed call against the cluster API
///
/// Carries the status code reported by the API server (when the failure
/// came from the server rather than the transport) so callers can classify
/// by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub code: Option<u16>,
    pub reason: String,
}

impl ApiFailure {
    pub fn status(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    /// Whether the server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.code == Some(NOT_FOUND)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (status {})", self.reason, code),
            None => f.write_str(&self.reason),
        }
    }
}

impl std::error::Error for ApiFailure {}

impl From<kube::Error> for ApiFailure {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => Self::from(response),
            other => Self::transport(other.to_string()),
        }
    }
}

impl From<kube::core::ErrorResponse> for ApiFailure {
    fn from(response: kube::core::ErrorResponse) -> Self {
        Self::status(response.code, response.message)
    }
}

/// Everything that can end a deploy run unsuccessfully
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("failed to decode manifest: {0}")]
    Decode(String),

    #[error("failed to look up {kind} '{name}': {source}")]
    IdentityQuery {
        kind: String,
        name: String,
        #[source]
        source: ApiFailure,
    },

    #[error("failed to create {kind} '{name}': {source}")]
    Create {
        kind: String,
        name: String,
        #[source]
        source: ApiFailure,
    },

    #[error("failed to update {kind} '{name}': {source}")]
    Update {
        kind: String,
        name: String,
        #[source]
        source: ApiFailure,
    },

    #[error("unsupported resource kind {kind} ({api_version})")]
    UnsupportedKind { api_version: String, kind: String },

    #[error("failed to read config map source {}: {source}", path.display())]
    ConfigMapSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deployment '{deployment}' was written but its autoscaler was not: {source}")]
    AutoscalerAfterDeployment {
        deployment: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("lost track of rollout for deployment '{name}': {reason}")]
    WatchFailed { name: String, reason: String },

    #[error("deployment '{name}' still has {unavailable} unavailable replicas after {timeout_secs}s")]
    RolloutTimedOut {
        name: String,
        timeout_secs: u64,
        unavailable: u32,
    },
}

impl DeployError {
    /// True when the failure happened after the object was written
    ///
    /// Lets an operator tell "write didn't happen" apart from "write
    /// happened, couldn't confirm rollout".
    pub fn applied(&self) -> bool {
        matches!(
            self,
            DeployError::AutoscalerAfterDeployment { .. }
                | DeployError::WatchFailed { .. }
                | DeployError::RolloutTimedOut { .. }
        )
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
