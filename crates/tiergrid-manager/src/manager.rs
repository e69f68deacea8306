//! Tier manager — owns the tiers and the lifecycle of the scaling task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tiergrid_autoscale::{
    run_scaling_loop, Autoscaler, BoundedAutoscaler, BudgetAutoscaler, ScaleEvent,
    SharedAutoscaler,
};
use tiergrid_balancer::LoadBalancer;
use tiergrid_core::{
    BoundedScaling, BudgetScaling, Policy, RandomSource, Request, Response, ScalingMode,
    ServiceFactory, TierConfig, TierError, TierResult,
};
use tiergrid_pool::ServicePool;

/// Pool name used in bounded mode.
pub const SERVICE_TIER: &str = "service";
/// Pool names used in budget mode.
pub const COMPUTE_TIER: &str = "compute";
pub const STORAGE_TIER: &str = "storage";

/// One pool and the balancer in front of it.
pub struct Tier {
    pool: ServicePool,
    balancer: LoadBalancer,
}

impl Tier {
    pub fn new(pool: ServicePool, policy: Policy) -> Self {
        Self {
            balancer: LoadBalancer::new(pool.clone(), policy),
            pool,
        }
    }

    pub fn name(&self) -> &str {
        self.pool.name()
    }

    pub fn pool(&self) -> &ServicePool {
        &self.pool
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }
}

/// Service factories matching a scaling mode.
#[derive(Clone)]
pub enum Factories {
    Bounded(ServiceFactory),
    Budget {
        compute: ServiceFactory,
        storage: ServiceFactory,
    },
}

/// Runs a set of tiers with a background autoscaler.
///
/// The scaling task starts at construction and stops on [`shutdown`] or
/// when the manager is dropped.
///
/// [`shutdown`]: TierManager::shutdown
pub struct TierManager {
    tiers: Vec<Tier>,
    scaler: SharedAutoscaler,
    events: broadcast::Receiver<ScaleEvent>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl TierManager {
    /// Wire up prebuilt tiers and an autoscaler, then start scaling.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        tiers: Vec<Tier>,
        scaler: Box<dyn Autoscaler>,
        interval: Duration,
    ) -> TierResult<Self> {
        if tiers.is_empty() {
            return Err(TierError::Config("a tier manager needs at least one tier".into()));
        }
        check_interval(interval)?;

        let events = scaler.subscribe();
        let scaler: SharedAutoscaler = Arc::new(Mutex::new(scaler));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_scaling_loop(scaler.clone(), interval, shutdown_rx));

        info!(
            tiers = ?tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            interval_ms = interval.as_millis() as u64,
            "tier manager started"
        );

        Ok(Self {
            tiers,
            scaler,
            events,
            interval,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Single pool kept between `min_services` and `max_services`.
    pub async fn bounded(
        config: BoundedScaling,
        policy: Policy,
        interval: Duration,
        factory: ServiceFactory,
    ) -> TierResult<Self> {
        config.validate()?;
        check_interval(interval)?;

        let pool = ServicePool::new(SERVICE_TIER);
        if let Err(e) = populate(&pool, &factory, config.min_services).await {
            teardown(&[&pool]).await;
            return Err(e);
        }

        let scaler = BoundedAutoscaler::new(pool.clone(), config, factory)?;
        Self::new(vec![Tier::new(pool, policy)], Box::new(scaler), interval)
    }

    /// Compute and storage pools sharing one budget. Requests pass through
    /// compute first, then storage.
    pub async fn budgeted(
        config: BudgetScaling,
        policy: Policy,
        interval: Duration,
        compute_factory: ServiceFactory,
        storage_factory: ServiceFactory,
        rng: Box<dyn RandomSource>,
    ) -> TierResult<Self> {
        config.validate()?;
        check_interval(interval)?;

        let compute = ServicePool::new(COMPUTE_TIER);
        let storage = ServicePool::new(STORAGE_TIER);
        let populated = match populate(&compute, &compute_factory, config.initial_compute).await {
            Ok(()) => populate(&storage, &storage_factory, config.initial_storage).await,
            Err(e) => Err(e),
        };
        if let Err(e) = populated {
            teardown(&[&compute, &storage]).await;
            return Err(e);
        }

        let initial_cost = compute.stats().await.total_cost + storage.stats().await.total_cost;
        if initial_cost > config.total_budget {
            warn!(
                initial_cost,
                total_budget = config.total_budget,
                "initial services already exceed the budget"
            );
        }

        let scaler = BudgetAutoscaler::new(
            compute.clone(),
            storage.clone(),
            compute_factory,
            storage_factory,
            config,
            rng,
        )?;
        Self::new(
            vec![Tier::new(compute, policy), Tier::new(storage, policy)],
            Box::new(scaler),
            interval,
        )
    }

    /// Build from the `[tier]` section and the section matching its mode.
    ///
    /// Configuration errors, including an unknown policy tag, surface here
    /// before any service is created.
    pub async fn from_config(
        config: &TierConfig,
        factories: Factories,
        rng: Box<dyn RandomSource>,
    ) -> TierResult<Self> {
        let policy = config.policy()?;
        let interval = config.scale_interval()?;

        match (config.tier.mode, factories) {
            (ScalingMode::Bounded, Factories::Bounded(factory)) => {
                Self::bounded(config.bounded.clone(), policy, interval, factory).await
            }
            (ScalingMode::Budget, Factories::Budget { compute, storage }) => {
                Self::budgeted(config.budget.clone(), policy, interval, compute, storage, rng)
                    .await
            }
            (mode, _) => Err(TierError::Config(format!(
                "factories do not match scaling mode {mode:?}"
            ))),
        }
    }

    /// Dispatch a request through every tier and chain the responses.
    pub async fn handle(&self, request: &Request) -> TierResult<Response> {
        let (first, rest) = self
            .tiers
            .split_first()
            .ok_or_else(|| TierError::Config("no tiers configured".into()))?;

        let mut response = first.balancer.distribute(request).await?;
        for tier in rest {
            response = response.chain(tier.balancer.distribute(request).await?);
        }
        Ok(response)
    }

    /// Run one scaling check now, independent of the background interval.
    pub async fn check_and_scale(&self) -> ScaleEvent {
        self.scaler.lock().await.check_and_scale().await
    }

    /// Subscribe to scale events recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
        self.events.resubscribe()
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name() == name)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background scaling task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the scaling task, wait for it, and stop every pooled service.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "scaling task ended abnormally");
        }

        for tier in &self.tiers {
            let replicas = tier.pool.drain().await;
            let stopped = replicas.len();
            for replica in replicas {
                replica.service().stop().await;
            }
            info!(tier = %tier.name(), stopped, "tier drained");
        }
        info!("tier manager stopped");
    }
}

impl Drop for TierManager {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.shutdown_tx.send(true);
        }
    }
}

fn check_interval(interval: Duration) -> TierResult<()> {
    if interval.is_zero() {
        return Err(TierError::Config("scale interval must be positive".into()));
    }
    Ok(())
}

/// Create, start and append `count` services.
///
/// A started service that the pool rejects is stopped before returning.
async fn populate(pool: &ServicePool, factory: &ServiceFactory, count: usize) -> TierResult<()> {
    for _ in 0..count {
        let service = factory();
        service.start().await.map_err(|e| TierError::Upstream {
            service_id: service.id().to_string(),
            source: e,
        })?;
        if let Err(e) = pool.push(service.clone()).await {
            service.stop().await;
            return Err(e);
        }
    }
    info!(tier = %pool.name(), count, "initial services started");
    Ok(())
}

/// Drain and stop every service already placed in `pools`.
async fn teardown(pools: &[&ServicePool]) {
    for pool in pools {
        let replicas = pool.drain().await;
        let stopped = replicas.len();
        for replica in replicas {
            replica.service().stop().await;
        }
        if stopped > 0 {
            warn!(tier = %pool.name(), stopped, "construction failed, stopped initial services");
        }
    }
}
