//! Budget-constrained autoscaler for a compute tier and a storage tier.
//!
//! Both pools draw from one cost ceiling. Which class grows or shrinks is
//! a weighted coin flip taken from an injected `RandomSource`; a draw is
//! only consumed when the outcome actually depends on it:
//!
//! - scale-up draws once, and only if storage is affordable
//!   (`available >= storage_min_budget`)
//! - scale-down draws once, and only if both pools have more than one
//!   service

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use tiergrid_core::{BudgetScaling, RandomSource, ServiceFactory, TierError, TierResult};
use tiergrid_pool::ServicePool;

use crate::event::{EventSink, PoolSize, ScaleAction, ScaleEvent};
use crate::scaler::{add_service, Autoscaler};

/// The two resource classes sharing a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Compute,
    Storage,
}

/// Grows and shrinks a compute pool and a storage pool under one budget.
pub struct BudgetAutoscaler {
    compute: ServicePool,
    storage: ServicePool,
    compute_factory: ServiceFactory,
    storage_factory: ServiceFactory,
    config: BudgetScaling,
    rng: Box<dyn RandomSource>,
    events: EventSink,
}

impl BudgetAutoscaler {
    pub fn new(
        compute: ServicePool,
        storage: ServicePool,
        compute_factory: ServiceFactory,
        storage_factory: ServiceFactory,
        config: BudgetScaling,
        rng: Box<dyn RandomSource>,
    ) -> TierResult<Self> {
        config.validate()?;
        Ok(Self {
            compute,
            storage,
            compute_factory,
            storage_factory,
            config,
            rng,
            events: EventSink::new(),
        })
    }

    pub fn config(&self) -> &BudgetScaling {
        &self.config
    }

    fn pool(&self, class: ResourceClass) -> &ServicePool {
        match class {
            ResourceClass::Compute => &self.compute,
            ResourceClass::Storage => &self.storage,
        }
    }

    async fn scale_up(&mut self, available: f64) -> ScaleAction {
        let class = if available >= self.config.storage_min_budget
            && self.rng.next_f64() < self.config.storage_preference
        {
            ResourceClass::Storage
        } else if available >= self.config.compute_min_budget {
            ResourceClass::Compute
        } else {
            debug!(available, "budget too small to grow any tier");
            return ScaleAction::NoChange;
        };

        let service = match class {
            ResourceClass::Compute => (self.compute_factory)(),
            ResourceClass::Storage => (self.storage_factory)(),
        };
        let pool = self.pool(class);

        let cost = service.cost();
        if cost > available {
            let err = TierError::BudgetExceeded {
                service_id: service.id().to_string(),
                cost,
                available,
            };
            warn!(tier = %pool.name(), error = %err, "scale-up aborted");
            return ScaleAction::BudgetExceeded {
                tier: pool.name().to_string(),
                service_id: service.id().to_string(),
                cost,
                available,
            };
        }

        add_service(pool, service).await
    }

    async fn scale_down(&mut self, compute_size: usize, storage_size: usize) -> ScaleAction {
        let class = if compute_size > 1
            && (storage_size <= 1 || self.rng.next_f64() < self.config.compute_removal_bias)
        {
            ResourceClass::Compute
        } else if storage_size > 1 {
            ResourceClass::Storage
        } else {
            return ScaleAction::NoChange;
        };

        let pool = self.pool(class);
        match pool.pop().await {
            Some(replica) => {
                replica.service().stop().await;
                ScaleAction::Removed {
                    tier: pool.name().to_string(),
                    service_id: replica.id().to_string(),
                }
            }
            None => ScaleAction::NoChange,
        }
    }
}

#[async_trait]
impl Autoscaler for BudgetAutoscaler {
    async fn check_and_scale(&mut self) -> ScaleEvent {
        let compute = self.compute.stats().await;
        let storage = self.storage.stats().await;

        let total_services = compute.size + storage.size;
        let avg_load = if total_services == 0 {
            0.0
        } else {
            (compute.total_load + storage.total_load) as f64 / total_services as f64
        };
        let available = self.config.total_budget - (compute.total_cost + storage.total_cost);

        let action = if avg_load > self.config.scale_up_threshold && available > 0.0 {
            self.scale_up(available).await
        } else if avg_load < self.config.scale_down_threshold && total_services > 2 {
            self.scale_down(compute.size, storage.size).await
        } else {
            ScaleAction::NoChange
        };

        let event = ScaleEvent {
            action,
            avg_load,
            pool_sizes: vec![
                PoolSize {
                    tier: self.compute.name().to_string(),
                    size: self.compute.len().await,
                },
                PoolSize {
                    tier: self.storage.name().to_string(),
                    size: self.storage.len().await,
                },
            ],
            available_budget: Some(available),
        };
        self.events.emit(&event);
        event
    }

    fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
        self.events.subscribe()
    }
}
