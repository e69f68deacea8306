//! Synthetic traffic against a running tier.
//!
//! Once per second a random burst of `1..=max_rps` requests is pushed
//! through a worker pool capped at `workers` concurrent requests. Each
//! burst is awaited before the next one starts.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tiergrid_core::Request;
use tiergrid_manager::TierManager;

/// Totals for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed_secs: u64,
}

pub struct TrafficGenerator {
    manager: Arc<TierManager>,
    workers: Arc<Semaphore>,
    max_rps: u32,
    rng: StdRng,
}

impl TrafficGenerator {
    pub fn new(manager: Arc<TierManager>, workers: usize, max_rps: u32, seed: Option<u64>) -> Self {
        Self {
            manager,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            max_rps: max_rps.max(1),
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
        }
    }

    /// Generate traffic for `duration`.
    pub async fn run(&mut self, duration: Duration) -> anyhow::Result<TrafficReport> {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = TrafficReport::default();

        while start.elapsed() < duration {
            ticker.tick().await;
            let burst = self.rng.gen_range(1..=self.max_rps);
            self.burst(burst, &mut report).await?;
        }

        report.elapsed_secs = start.elapsed().as_secs();
        info!(
            requests = report.requests,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_secs = report.elapsed_secs,
            "simulation complete"
        );
        Ok(report)
    }

    /// Issue `count` requests and wait for all of them.
    pub async fn burst(&mut self, count: u32, report: &mut TrafficReport) -> anyhow::Result<()> {
        let mut in_flight = JoinSet::new();

        for _ in 0..count {
            let permit = self.workers.clone().acquire_owned().await?;
            let manager = self.manager.clone();
            let request = Request::new(report.requests, format!("Request-{}", report.requests));
            report.requests += 1;

            in_flight.spawn(async move {
                let _permit = permit;
                manager.handle(&request).await
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Ok(response)) => {
                    report.succeeded += 1;
                    debug!(served_by = ?response.served_by, body = %response.body, "request served");
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(error = %e, "request failed");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "request task panicked");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Profile, WebServer};
    use tiergrid_core::{BoundedScaling, Policy};

    fn profile(failure_rate: f64) -> Profile {
        Profile {
            min_latency: Duration::from_millis(10),
            max_latency: Duration::from_millis(20),
            failure_rate,
        }
    }

    async fn manager(failure_rate: f64) -> Arc<TierManager> {
        Arc::new(
            TierManager::bounded(
                BoundedScaling::default(),
                Policy::RoundRobin,
                Duration::from_secs(5),
                WebServer::factory("web", profile(failure_rate)),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn burst_counts_every_request() {
        let mut traffic = TrafficGenerator::new(manager(0.0).await, 4, 20, Some(7));
        let mut report = TrafficReport::default();

        traffic.burst(10, &mut report).await.unwrap();
        assert_eq!(report.requests, 10);
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_not_fatal() {
        let mut traffic = TrafficGenerator::new(manager(1.0).await, 4, 20, Some(7));
        let mut report = TrafficReport::default();

        traffic.burst(5, &mut report).await.unwrap();
        assert_eq!(report.failed, 5);
        assert_eq!(report.succeeded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_duration() {
        let mut traffic = TrafficGenerator::new(manager(0.0).await, 8, 3, Some(1));

        let report = traffic.run(Duration::from_secs(3)).await.unwrap();
        assert!(report.requests >= 3);
        assert_eq!(report.requests, report.succeeded);
    }
}
