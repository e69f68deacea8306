//! tiergrid-pool — the shared, ordered collection of replicas behind a tier.
//!
//! A `ServicePool` is cheap to clone; every clone refers to the same
//! membership list. The load balancer reads it, the autoscaler mutates it.
//!
//! # Locking
//!
//! ```text
//! ServicePool
//!   └── RwLock<Vec<Arc<Replica>>>   membership (append / remove / select)
//!         └── Replica
//!               └── AtomicU64       per-replica load counter
//! ```
//!
//! Selection happens under the read guard; `process` runs after the guard
//! is dropped, so dispatch never blocks membership changes for longer than
//! an index lookup.

pub mod pool;

pub use pool::{PoolStats, ServicePool};
