//! Core of the Kubernetes deploy step
//!
//! This crate provides the pieces a CI run strings together:
//! - Template rendering and manifest decoding
//! - Create-or-update of Deployments, ConfigMaps, Services, Ingresses,
//!   Secrets and HorizontalPodAutoscalers
//! - Waiting for a deployment rollout with an absolute deadline
//! - Structured logging of every step

pub mod apply;
pub mod cluster;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod observability;
pub mod render;
pub mod rollout;

#[cfg(test)]
mod fake;

pub use cluster::{build_client, ClusterApi, KubeCluster};
pub use config::{ConnectionSettings, RunConfig};
pub use dispatch::run;
pub use error::{ApiFailure, DeployError, Result};
pub use models::*;
pub use observability::DeployLogger;
