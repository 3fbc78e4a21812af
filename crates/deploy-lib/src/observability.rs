//! Structured logging for deploy runs
//!
//! Every significant step of a run is emitted as a tracing event with an
//! `event` field so CI log processors can pick them out.

use crate::models::{Outcome, ResourceKind};
use tracing::{error, info, warn};

/// How an object reached the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Updated,
}

impl ApplyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyAction::Created => "created",
            ApplyAction::Updated => "updated",
        }
    }
}

/// Structured logger for deploy events
///
/// Scoped to the namespace the run writes into.
#[derive(Debug, Clone)]
pub struct DeployLogger {
    namespace: String,
}

impl DeployLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Log the resource a run is about to reconcile
    pub fn log_run_start(&self, kind: ResourceKind, name: &str) {
        info!(
            event = "deploy_started",
            namespace = %self.namespace,
            kind = %kind,
            name = %name,
            "Deploying resource"
        );
    }

    /// Log a successful create or update
    pub fn log_applied(&self, kind: &str, name: &str, action: ApplyAction) {
        info!(
            event = "resource_applied",
            namespace = %self.namespace,
            kind = %kind,
            name = %name,
            action = action.as_str(),
            "Resource {}",
            action.as_str()
        );
    }

    /// Log the unavailable replica count seen while waiting on a rollout
    pub fn log_rollout_progress(&self, name: &str, unavailable_replicas: u32) {
        info!(
            event = "rollout_progress",
            namespace = %self.namespace,
            name = %name,
            unavailable_replicas = unavailable_replicas,
            "Waiting for unavailable replicas"
        );
    }

    /// Log the terminal outcome of the run
    pub fn log_outcome(&self, kind: ResourceKind, name: &str, outcome: &Outcome) {
        match outcome.error() {
            None => {
                info!(
                    event = "deploy_finished",
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %name,
                    outcome = outcome.label(),
                    "Deploy finished"
                );
            }
            Some(err) if err.applied() => {
                warn!(
                    event = "deploy_finished",
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %name,
                    outcome = outcome.label(),
                    error = %err,
                    "Resource applied but run did not complete"
                );
            }
            Some(err) => {
                error!(
                    event = "deploy_finished",
                    namespace = %self.namespace,
                    kind = %kind,
                    name = %name,
                    outcome = outcome.label(),
                    error = %err,
                    "Deploy failed"
                );
            }
        }
    }
}
