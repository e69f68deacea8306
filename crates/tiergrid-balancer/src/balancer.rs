//! Load balancer — picks one replica per request and dispatches to it.

use std::sync::Arc;

use tracing::{debug, warn};

use tiergrid_core::{Policy, Replica, Request, Response, TierError, TierResult};
use tiergrid_pool::ServicePool;

use crate::cursor::RoundRobinCursor;

/// Dispatches requests across a shared `ServicePool`.
///
/// There is no retry and no failover: if the selected replica fails, the
/// error goes straight back to the caller and the replica's load is left
/// untouched.
pub struct LoadBalancer {
    pool: ServicePool,
    policy: Policy,
    cursor: RoundRobinCursor,
}

impl LoadBalancer {
    pub fn new(pool: ServicePool, policy: Policy) -> Self {
        Self {
            pool,
            policy,
            cursor: RoundRobinCursor::new(),
        }
    }

    /// Build from a policy tag such as `"round_robin"`.
    ///
    /// Unknown tags fail here, before any request is dispatched.
    pub fn from_tag(pool: ServicePool, tag: &str) -> TierResult<Self> {
        Ok(Self::new(pool, tag.parse()?))
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn pool(&self) -> &ServicePool {
        &self.pool
    }

    /// Choose the replica the next request would go to.
    ///
    /// Round-robin advances the cursor; least-connections picks the lowest
    /// load, earliest in pool order on ties.
    pub async fn select(&self) -> TierResult<Arc<Replica>> {
        let replicas = self.pool.read().await;
        let empty = || TierError::EmptyPool {
            tier: self.pool.name().to_string(),
        };

        let idx = match self.policy {
            Policy::RoundRobin => self.cursor.next(replicas.len()).ok_or_else(empty)?,
            Policy::LeastConnections => replicas
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.load())
                .map(|(i, _)| i)
                .ok_or_else(empty)?,
        };

        Ok(replicas[idx].clone())
    }

    /// Send a request to one replica and return its response.
    pub async fn distribute(&self, request: &Request) -> TierResult<Response> {
        let replica = self.select().await?;

        match replica.process(request).await {
            Ok(response) => {
                let load = replica.record_request();
                debug!(
                    tier = %self.pool.name(),
                    service_id = %replica.id(),
                    request_id = request.id,
                    load,
                    "request processed"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    tier = %self.pool.name(),
                    service_id = %replica.id(),
                    request_id = request.id,
                    error = %e,
                    "service failed to process request"
                );
                Err(TierError::Upstream {
                    service_id: replica.id().to_string(),
                    source: e,
                })
            }
        }
    }
}
