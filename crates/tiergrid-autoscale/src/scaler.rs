//! Autoscaler contract and the bounded (min/max) variant.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use tiergrid_core::{BoundedScaling, Service, ServiceFactory, TierResult};
use tiergrid_pool::ServicePool;

use crate::event::{EventSink, PoolSize, ScaleAction, ScaleEvent};

/// A control loop body that resizes pools based on observed load.
///
/// Scaling never fails the caller: problems are reported in the returned
/// event and retried on the next check.
#[async_trait]
pub trait Autoscaler: Send {
    /// Inspect the pools and add or remove at most one service.
    async fn check_and_scale(&mut self) -> ScaleEvent;

    /// Stream of every event this scaler records.
    fn subscribe(&self) -> broadcast::Receiver<ScaleEvent>;
}

/// Keeps one pool between `min_services` and `max_services`.
///
/// Scale-down removes the most recently added service regardless of its
/// load (LIFO), not the least loaded one.
pub struct BoundedAutoscaler {
    pool: ServicePool,
    config: BoundedScaling,
    factory: ServiceFactory,
    events: EventSink,
}

impl BoundedAutoscaler {
    pub fn new(
        pool: ServicePool,
        config: BoundedScaling,
        factory: ServiceFactory,
    ) -> TierResult<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            config,
            factory,
            events: EventSink::new(),
        })
    }

    pub fn config(&self) -> &BoundedScaling {
        &self.config
    }

    async fn scale_up(&self) -> ScaleAction {
        let service = (self.factory)();
        add_service(&self.pool, service).await
    }

    async fn scale_down(&self) -> ScaleAction {
        match self.pool.pop().await {
            Some(replica) => {
                replica.service().stop().await;
                ScaleAction::Removed {
                    tier: self.pool.name().to_string(),
                    service_id: replica.id().to_string(),
                }
            }
            None => ScaleAction::NoChange,
        }
    }
}

#[async_trait]
impl Autoscaler for BoundedAutoscaler {
    async fn check_and_scale(&mut self) -> ScaleEvent {
        let stats = self.pool.stats().await;
        let avg_load = stats.avg_load();

        let action = if avg_load > self.config.scale_up_threshold
            && stats.size < self.config.max_services
        {
            self.scale_up().await
        } else if avg_load < self.config.scale_down_threshold
            && stats.size > self.config.min_services
        {
            self.scale_down().await
        } else {
            ScaleAction::NoChange
        };

        let event = ScaleEvent {
            action,
            avg_load,
            pool_sizes: vec![PoolSize {
                tier: self.pool.name().to_string(),
                size: self.pool.len().await,
            }],
            available_budget: None,
        };
        self.events.emit(&event);
        event
    }

    fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
        self.events.subscribe()
    }
}

/// Start a freshly built service and append it to `pool`.
///
/// A service that fails to start, or whose id is already taken, is never
/// added.
pub(crate) async fn add_service(pool: &ServicePool, service: Arc<dyn Service>) -> ScaleAction {
    let tier = pool.name().to_string();
    let service_id = service.id().to_string();

    if let Err(e) = service.start().await {
        warn!(%tier, %service_id, error = %e, "new service failed to start");
        return ScaleAction::Failed {
            tier,
            service_id,
            error: e.to_string(),
        };
    }

    match pool.push(service.clone()).await {
        Ok(_) => ScaleAction::Added { tier, service_id },
        Err(e) => {
            service.stop().await;
            ScaleAction::Failed {
                tier,
                service_id,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tiergrid_core::{Replica, Request, Response};

    struct Stub {
        id: String,
        fail_start: bool,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Service for Stub {
        fn id(&self) -> &str {
            &self.id
        }

        fn cost(&self) -> f64 {
            10.0
        }

        async fn process(&self, request: &Request) -> anyhow::Result<Response> {
            Ok(Response::new(&self.id, request.body.clone()))
        }

        async fn start(&self) -> anyhow::Result<()> {
            if self.fail_start {
                anyhow::bail!("port in use");
            }
            Ok(())
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn stub(id: &str) -> Arc<dyn Service> {
        Arc::new(Stub {
            id: id.to_string(),
            fail_start: false,
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    fn counting_factory() -> ServiceFactory {
        let next = Arc::new(AtomicUsize::new(100));
        Arc::new(move || stub(&format!("svc-{}", next.fetch_add(1, Ordering::SeqCst))))
    }

    fn config(min: usize, max: usize) -> BoundedScaling {
        BoundedScaling {
            min_services: min,
            max_services: max,
            scale_up_threshold: 10.0,
            scale_down_threshold: 5.0,
        }
    }

    /// Pool whose replicas carry the given loads.
    async fn loaded_pool(loads: &[u64]) -> ServicePool {
        let pool = ServicePool::new("web");
        for (i, load) in loads.iter().enumerate() {
            pool.push_replica(Replica::with_load(stub(&format!("svc-{i}")), *load))
                .await
                .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn scale_up_above_threshold() {
        // avg_load = 12 > 10 with 3 < 5 services.
        let pool = loaded_pool(&[12, 12, 12]).await;
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

        let event = scaler.check_and_scale().await;

        assert_eq!(pool.len().await, 4);
        assert_eq!(
            event.action,
            ScaleAction::Added {
                tier: "web".into(),
                service_id: "svc-100".into()
            }
        );
        assert_eq!(event.avg_load, 12.0);
        assert_eq!(event.size_of("web"), Some(4));
        assert_eq!(pool.ids().await.last().unwrap(), "svc-100");
    }

    #[tokio::test]
    async fn scale_down_removes_last_appended() {
        // avg_load = 2 < 5 with 3 > 2 services.
        let pool = loaded_pool(&[0, 6, 0]).await;
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

        let event = scaler.check_and_scale().await;

        assert_eq!(pool.ids().await, vec!["svc-0", "svc-1"]);
        assert_eq!(
            event.action,
            ScaleAction::Removed {
                tier: "web".into(),
                service_id: "svc-2".into()
            }
        );
        assert_eq!(event.size_of("web"), Some(2));
    }

    #[tokio::test]
    async fn scale_down_stops_removed_service() {
        let stopped = Arc::new(AtomicBool::new(false));
        let pool = loaded_pool(&[0, 0]).await;
        pool.push(Arc::new(Stub {
            id: "last".into(),
            fail_start: false,
            stopped: stopped.clone(),
        }))
        .await
        .unwrap();
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

        scaler.check_and_scale().await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn thresholds_are_strict() {
        for load in [10, 5] {
            let pool = loaded_pool(&[load, load, load]).await;
            let mut scaler =
                BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

            let event = scaler.check_and_scale().await;
            assert_eq!(event.action, ScaleAction::NoChange, "avg_load = {load}");
            assert_eq!(pool.len().await, 3);
        }
    }

    #[tokio::test]
    async fn load_between_thresholds_never_mutates() {
        for size in 2..=5 {
            let loads = vec![7; size];
            let pool = loaded_pool(&loads).await;
            let before = pool.ids().await;
            let mut scaler =
                BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

            for _ in 0..3 {
                assert_eq!(scaler.check_and_scale().await.action, ScaleAction::NoChange);
            }
            assert_eq!(pool.ids().await, before);
        }
    }

    #[tokio::test]
    async fn respects_max_services() {
        let pool = loaded_pool(&[50; 5]).await;
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

        assert_eq!(scaler.check_and_scale().await.action, ScaleAction::NoChange);
        assert_eq!(pool.len().await, 5);
    }

    #[tokio::test]
    async fn respects_min_services() {
        let pool = loaded_pool(&[0, 0]).await;
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();

        assert_eq!(scaler.check_and_scale().await.action, ScaleAction::NoChange);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn empty_pool_has_zero_average() {
        let pool = ServicePool::new("web");
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(0, 5), counting_factory()).unwrap();

        let event = scaler.check_and_scale().await;
        assert_eq!(event.avg_load, 0.0);
        assert_eq!(event.action, ScaleAction::NoChange);
    }

    #[tokio::test]
    async fn failed_start_leaves_pool_unchanged() {
        let pool = loaded_pool(&[20, 20]).await;
        let factory: ServiceFactory = Arc::new(|| {
            Arc::new(Stub {
                id: "flaky".into(),
                fail_start: true,
                stopped: Arc::new(AtomicBool::new(false)),
            }) as Arc<dyn Service>
        });
        let mut scaler = BoundedAutoscaler::new(pool.clone(), config(2, 5), factory).unwrap();

        let event = scaler.check_and_scale().await;
        assert!(matches!(event.action, ScaleAction::Failed { ref error, .. } if error == "port in use"));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn duplicate_factory_id_is_not_added() {
        let pool = loaded_pool(&[20, 20]).await;
        let factory: ServiceFactory = Arc::new(|| stub("svc-0"));
        let mut scaler = BoundedAutoscaler::new(pool.clone(), config(2, 5), factory).unwrap();

        let event = scaler.check_and_scale().await;
        assert!(matches!(event.action, ScaleAction::Failed { .. }));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn events_are_broadcast() {
        let pool = loaded_pool(&[12, 12, 12]).await;
        let mut scaler =
            BoundedAutoscaler::new(pool.clone(), config(2, 5), counting_factory()).unwrap();
        let mut rx = scaler.subscribe();

        let event = scaler.check_and_scale().await;
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = BoundedAutoscaler::new(
            ServicePool::new("web"),
            config(6, 5),
            counting_factory(),
        );
        assert!(result.is_err());
    }
}
