//! tiergrid-balancer — per-request service selection and dispatch.
//!
//! A `LoadBalancer` shares a `ServicePool` with the autoscaler. For each
//! request it picks one replica according to its `Policy`, calls
//! `process`, and bumps that replica's load on success.
//!
//! ```text
//! distribute(request)
//!   ├── pool.read()            consistent membership view
//!   │   └── policy → index     RoundRobinCursor / min load
//!   ├── replica.process()      outside the pool lock
//!   └── replica.record_request()  only on success
//! ```

pub mod balancer;
pub mod cursor;

pub use balancer::LoadBalancer;
pub use cursor::RoundRobinCursor;
pub use tiergrid_core::Policy;
