//! tiergrid-core — shared types for the TierGrid elastic service tier.
//!
//! Defines the `Service` capability consumed by the pool, balancer and
//! autoscaler crates, the `Replica` wrapper that carries each service's
//! load counter, the error taxonomy, and the `tier.toml` configuration.

pub mod capacity;
pub mod config;
pub mod error;
pub mod policy;
pub mod random;
pub mod service;

pub use capacity::{plan, CapacityPlan};
pub use config::{
    parse_duration, BoundedScaling, BudgetScaling, ScalingMode, SimulationConfig, TierConfig,
    TierSection,
};
pub use error::{TierError, TierResult};
pub use policy::Policy;
pub use random::{RandomSource, ScriptedRandom, SystemRandom};
pub use service::{Replica, Request, Response, Service, ServiceFactory};
