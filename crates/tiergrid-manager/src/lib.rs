//! tiergrid-manager — assembles pools, balancers and an autoscaler into a
//! running tier.
//!
//! # Architecture
//!
//! ```text
//! TierManager
//!   ├── Tier "service"            (bounded mode)
//!   │   or Tier "compute" + Tier "storage"  (budget mode)
//!   │   ├── ServicePool           shared with the autoscaler
//!   │   └── LoadBalancer          policy + round-robin cursor
//!   ├── SharedAutoscaler          Bounded / Budget
//!   └── background task           run_scaling_loop(interval, watch shutdown)
//! ```
//!
//! `handle()` dispatches a request through every tier in order and chains
//! the responses. There is no cross-tier rollback: a failure in a later
//! tier discards earlier results and is returned as-is.

pub mod manager;

pub use manager::{Factories, Tier, TierManager, COMPUTE_TIER, SERVICE_TIER, STORAGE_TIER};
