//! Waiting for deployment rollouts to settle
//!
//! After a deployment is written the watcher subscribes to changes of that
//! one deployment, reads its current status, and then races incoming
//! notifications against an absolute deadline until no replica is
//! unavailable.

use crate::cluster::RolloutFeed;
use crate::models::RolloutEvent;
use crate::observability::DeployLogger;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Phases of a rollout watch, used in log output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutPhase {
    Initializing,
    PollingLiveStatus,
    Watching,
}

/// How a rollout watch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutVerdict {
    /// No unavailable replicas, after consuming this many notifications
    Stable { events_consumed: usize },
    /// Deadline fired while replicas were still unavailable
    TimedOut { unavailable_replicas: u32 },
    /// The subscription could not be opened or stopped delivering
    WatchFailed(String),
}

/// Watches one deployment until it settles or the deadline passes
pub struct RolloutWatcher {
    timeout: Duration,
    logger: DeployLogger,
}

impl RolloutWatcher {
    pub fn new(timeout: Duration, logger: DeployLogger) -> Self {
        Self { timeout, logger }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until the named deployment reports zero unavailable replicas
    pub async fn wait(&self, feed: &dyn RolloutFeed, name: &str) -> RolloutVerdict {
        debug!(name = %name, phase = ?RolloutPhase::Initializing, "Opening rollout watch");

        // Subscribe first so a transition between the snapshot and the
        // subscription cannot be missed.
        let mut events = match feed.subscribe(name).await {
            Ok(events) => events,
            Err(e) => return RolloutVerdict::WatchFailed(format!("watch deployment: {}", e)),
        };

        debug!(name = %name, phase = ?RolloutPhase::PollingLiveStatus, "Reading live status");
        let status = match feed.snapshot(name).await {
            Ok(status) => status,
            Err(e) => return RolloutVerdict::WatchFailed(format!("get deployment: {}", e)),
        };

        self.logger
            .log_rollout_progress(name, status.unavailable_replicas);
        if status.is_stable() {
            return RolloutVerdict::Stable { events_consumed: 0 };
        }

        debug!(
            name = %name,
            phase = ?RolloutPhase::Watching,
            timeout_secs = self.timeout.as_secs(),
            "Watching for rollout changes"
        );

        let deadline = sleep_until(Instant::now() + self.timeout);
        tokio::pin!(deadline);

        let mut unavailable = status.unavailable_replicas;
        let mut consumed = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    return RolloutVerdict::TimedOut { unavailable_replicas: unavailable };
                }
                event = events.next() => match event {
                    Some(Ok(RolloutEvent::Observed(status))) => {
                        consumed += 1;
                        if status.is_stable() {
                            return RolloutVerdict::Stable { events_consumed: consumed };
                        }
                        unavailable = status.unavailable_replicas;
                        self.logger.log_rollout_progress(name, unavailable);
                    }
                    Some(Ok(RolloutEvent::Deleted)) => {
                        return RolloutVerdict::WatchFailed(
                            "deployment was deleted during rollout".to_string(),
                        );
                    }
                    Some(Err(e)) => {
                        return RolloutVerdict::WatchFailed(format!("watch stream error: {}", e));
                    }
                    None => {
                        return RolloutVerdict::WatchFailed(
                            "watch closed before rollout settled".to_string(),
                        );
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterApi;
    use crate::error::ApiFailure;
    use crate::fake::{Call, FakeCluster, RolloutScript, ScriptEnd};
    use crate::models::RolloutStatus;

    fn observed(unavailable: u32) -> RolloutEvent {
        RolloutEvent::Observed(RolloutStatus::new(unavailable))
    }

    fn watcher(timeout_secs: u64) -> RolloutWatcher {
        RolloutWatcher::new(Duration::from_secs(timeout_secs), DeployLogger::new("shop"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediately_stable_consumes_no_events() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(
            RolloutScript::snapshot(0).with_events(vec![(Duration::from_secs(1), observed(3))]),
        );

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert_eq!(verdict, RolloutVerdict::Stable { events_consumed: 0 });
        assert_eq!(cluster.events_consumed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventually_stable_after_three_events() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(RolloutScript::snapshot(2).with_events(vec![
            (Duration::from_secs(1), observed(2)),
            (Duration::from_secs(1), observed(1)),
            (Duration::from_secs(1), observed(0)),
            (Duration::from_secs(1), observed(4)),
        ]));

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert_eq!(verdict, RolloutVerdict::Stable { events_consumed: 3 });
        assert_eq!(cluster.events_consumed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_consuming_events() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(RolloutScript::snapshot(2).with_events(vec![
            (Duration::from_secs(1), observed(2)),
            (Duration::from_secs(1), observed(1)),
            (Duration::from_secs(8), observed(0)),
        ]));

        let start = Instant::now();
        let verdict = watcher(5)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert_eq!(
            verdict,
            RolloutVerdict::TimedOut {
                unavailable_replicas: 1
            }
        );
        assert_eq!(cluster.events_consumed(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_not_reset_by_events() {
        let cluster = FakeCluster::new();
        let events = (0..10)
            .map(|_| (Duration::from_secs(2), observed(1)))
            .collect();
        cluster.script_rollout(RolloutScript::snapshot(1).with_events(events));

        let start = Instant::now();
        let verdict = watcher(7)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert!(matches!(verdict, RolloutVerdict::TimedOut { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(cluster.events_consumed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_subscription_is_watch_failure() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(
            RolloutScript::snapshot(2)
                .with_events(vec![(Duration::from_secs(1), observed(1))])
                .ending(ScriptEnd::Close),
        );

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert!(matches!(verdict, RolloutVerdict::WatchFailed(msg) if msg.contains("closed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_skips_snapshot() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(
            RolloutScript::snapshot(0).failing_subscribe(ApiFailure::status(403, "forbidden")),
        );

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert!(matches!(verdict, RolloutVerdict::WatchFailed(msg) if msg.contains("forbidden")));
        assert_eq!(
            cluster.calls(),
            vec![Call::Subscribe {
                name: "web".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_after_subscribe() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(
            RolloutScript::snapshot(0)
                .with_events(vec![(Duration::from_secs(1), observed(0))])
                .failing_snapshot(ApiFailure::status(404, "deployments \"web\" not found")),
        );

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        match verdict {
            RolloutVerdict::WatchFailed(msg) => {
                assert!(msg.starts_with("get deployment"));
                assert!(msg.contains("not found"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert_eq!(cluster.events_consumed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_opens_before_snapshot() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(RolloutScript::snapshot(0));

        watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert_eq!(
            cluster.calls(),
            vec![
                Call::Subscribe {
                    name: "web".to_string()
                },
                Call::Snapshot {
                    name: "web".to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_deployment_is_watch_failure() {
        let cluster = FakeCluster::new();
        cluster.script_rollout(
            RolloutScript::snapshot(1)
                .with_events(vec![(Duration::from_secs(1), RolloutEvent::Deleted)]),
        );

        let verdict = watcher(120)
            .wait(cluster.rollouts("shop").as_ref(), "web")
            .await;

        assert!(matches!(verdict, RolloutVerdict::WatchFailed(msg) if msg.contains("deleted")));
    }
}
