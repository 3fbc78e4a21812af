//! Routing a decoded resource to its applier
//!
//! One exhaustive match over [`DesiredResource`] picks the kind-specific
//! apply path; deployments additionally wait for their rollout. Adding a
//! variant without a branch here fails to compile.

use crate::apply::Applier;
use crate::cluster::ClusterApi;
use crate::config::RunConfig;
use crate::error::{DeployError, Result};
use crate::models::{DesiredResource, Outcome};
use crate::observability::DeployLogger;
use crate::rollout::{RolloutVerdict, RolloutWatcher};

/// Apply one decoded resource and report the terminal outcome
pub async fn run<C: ClusterApi>(
    cluster: &C,
    desired: DesiredResource,
    config: &RunConfig,
) -> Outcome {
    let kind = desired.kind();
    let name = desired.name().to_string();
    let namespace = config.resolve_namespace(desired.namespace());
    let logger = DeployLogger::new(namespace.clone());

    logger.log_run_start(kind, &name);
    let outcome = dispatch(cluster, desired, config, &namespace, &logger).await;
    logger.log_outcome(kind, &name, &outcome);
    outcome
}

async fn dispatch<C: ClusterApi>(
    cluster: &C,
    desired: DesiredResource,
    config: &RunConfig,
    namespace: &str,
    logger: &DeployLogger,
) -> Outcome {
    let applier = Applier::new(cluster, namespace);

    let applied: Result<()> = match desired {
        DesiredResource::Deployment(deployment) => {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            if let Err(e) = applier
                .apply_deployment(deployment, config.autoscaler.clone())
                .await
            {
                return Outcome::Failed(e);
            }
            let watcher = RolloutWatcher::new(config.rollout_timeout, logger.clone());
            let feed = cluster.rollouts(namespace);
            let verdict = watcher.wait(feed.as_ref(), &name).await;
            return rollout_outcome(name, &watcher, verdict);
        }
        DesiredResource::ConfigMap(config_map) => applier
            .apply_config_map(config_map, config.config_map_source.as_deref())
            .await
            .map(drop),
        DesiredResource::Service(service) => applier.apply_service(service).await.map(drop),
        DesiredResource::Ingress(ingress) => applier
            .apply_ingress(ingress, &config.additional_annotations)
            .await
            .map(drop),
        DesiredResource::LegacyIngress { resource, object } => applier
            .apply_legacy_ingress(&resource, object, &config.additional_annotations)
            .await
            .map(drop),
        DesiredResource::Secret(secret) => applier
            .apply_secret(secret, &config.secret_data)
            .await
            .map(drop),
        DesiredResource::HorizontalAutoscaler(hpa) => {
            applier.apply_autoscaler(hpa).await.map(drop)
        }
        DesiredResource::Unsupported {
            api_version, kind, ..
        } => Err(DeployError::UnsupportedKind { api_version, kind }),
    };

    match applied {
        Ok(()) => Outcome::Applied,
        Err(e) => Outcome::Failed(e),
    }
}

/// Map a watcher verdict onto the run outcome
///
/// A timeout leaves the new revision in place; no rollback is attempted.
fn rollout_outcome(name: String, watcher: &RolloutWatcher, verdict: RolloutVerdict) -> Outcome {
    match verdict {
        RolloutVerdict::Stable { .. } => Outcome::AppliedAndStable,
        RolloutVerdict::TimedOut {
            unavailable_replicas,
        } => Outcome::AppliedButUnstable(DeployError::RolloutTimedOut {
            name,
            timeout_secs: watcher.timeout().as_secs(),
            unavailable: unavailable_replicas,
        }),
        RolloutVerdict::WatchFailed(reason) => {
            Outcome::Failed(DeployError::WatchFailed { name, reason })
        }
    }
}
