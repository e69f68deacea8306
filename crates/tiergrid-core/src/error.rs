//! Tier error types.

use thiserror::Error;

/// Errors raised by the pool, load balancer, autoscaler and tier manager.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("no services available in tier: {tier}")]
    EmptyPool { tier: String },

    #[error("unknown distribution policy: {0}")]
    UnknownPolicy(String),

    #[error("service {service_id} costs {cost:.2} but only {available:.2} budget remains")]
    BudgetExceeded {
        service_id: String,
        cost: f64,
        available: f64,
    },

    #[error("upstream service {service_id} failed: {source}")]
    Upstream {
        service_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("service already in pool: {0}")]
    DuplicateService(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type TierResult<T> = Result<T, TierError>;
