//! Service pool — ordered replica membership for one tier.
//!
//! Order is significant: round-robin walks it, and scale-down always
//! removes the most recently appended replica.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use tiergrid_core::{Replica, Service, TierError, TierResult};

/// Aggregate figures taken under a single read guard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    pub size: usize,
    pub total_load: u64,
    pub total_cost: f64,
}

impl PoolStats {
    /// Mean load per replica, 0 for an empty pool.
    pub fn avg_load(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.total_load as f64 / self.size as f64
        }
    }
}

/// An ordered, shared collection of replicas.
#[derive(Clone)]
pub struct ServicePool {
    name: Arc<str>,
    replicas: Arc<RwLock<Vec<Arc<Replica>>>>,
}

impl ServicePool {
    /// Create an empty pool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            replicas: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Tier name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a service with a fresh load counter.
    pub async fn push(&self, service: Arc<dyn Service>) -> TierResult<Arc<Replica>> {
        self.push_replica(Replica::new(service)).await
    }

    /// Append an existing replica.
    ///
    /// Rejects duplicate ids and negative or non-finite costs.
    pub async fn push_replica(&self, replica: Replica) -> TierResult<Arc<Replica>> {
        let cost = replica.cost();
        if !(cost.is_finite() && cost >= 0.0) {
            return Err(TierError::Config(format!(
                "service {} has invalid cost {cost}",
                replica.id()
            )));
        }

        let mut replicas = self.replicas.write().await;
        if replicas.iter().any(|r| r.id() == replica.id()) {
            return Err(TierError::DuplicateService(replica.id().to_string()));
        }

        let replica = Arc::new(replica);
        replicas.push(replica.clone());
        debug!(
            tier = %self.name,
            service_id = %replica.id(),
            pool_size = replicas.len(),
            "replica added to pool"
        );
        Ok(replica)
    }

    /// Remove the most recently appended replica.
    pub async fn pop(&self) -> Option<Arc<Replica>> {
        let mut replicas = self.replicas.write().await;
        let removed = replicas.pop()?;
        debug!(
            tier = %self.name,
            service_id = %removed.id(),
            pool_size = replicas.len(),
            "replica removed from pool"
        );
        Some(removed)
    }

    /// Remove a specific replica by id.
    pub async fn remove(&self, service_id: &str) -> Option<Arc<Replica>> {
        let mut replicas = self.replicas.write().await;
        let idx = replicas.iter().position(|r| r.id() == service_id)?;
        let removed = replicas.remove(idx);
        debug!(
            tier = %self.name,
            %service_id,
            pool_size = replicas.len(),
            "replica removed from pool"
        );
        Some(removed)
    }

    /// Remove every replica, oldest first.
    pub async fn drain(&self) -> Vec<Arc<Replica>> {
        let mut replicas = self.replicas.write().await;
        std::mem::take(&mut *replicas)
    }

    pub async fn len(&self) -> usize {
        self.replicas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.replicas.read().await.is_empty()
    }

    /// Point-in-time copy of the membership list.
    pub async fn snapshot(&self) -> Vec<Arc<Replica>> {
        self.replicas.read().await.clone()
    }

    /// Replica ids in pool order.
    pub async fn ids(&self) -> Vec<String> {
        self.replicas
            .read()
            .await
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    /// Size, load and cost from one consistent view.
    pub async fn stats(&self) -> PoolStats {
        let replicas = self.replicas.read().await;
        PoolStats {
            size: replicas.len(),
            total_load: replicas.iter().map(|r| r.load()).sum(),
            total_cost: replicas.iter().map(|r| r.cost()).sum(),
        }
    }

    /// Hold the membership list steady while selecting from it.
    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Replica>>> {
        self.replicas.read().await
    }
}
