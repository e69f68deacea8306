//! tiergrid-autoscale — periodic pool resizing.
//!
//! Two interchangeable `Autoscaler`s inspect pool load and grow or shrink
//! pools through a `ServiceFactory`:
//!
//! ```text
//! BoundedAutoscaler (one pool, min/max size)
//!   avg = total_load / size
//!   avg > up   && size < max  → append factory()
//!   avg < down && size > min  → remove last appended
//!
//! BudgetAutoscaler (compute + storage pools, one budget)
//!   avg       = load over both pools / services in both pools
//!   available = total_budget - summed cost
//!   avg > up   && available > 0  → grow storage (weighted) or compute,
//!                                   only if the new cost fits
//!   avg < down && services > 2   → shrink compute (weighted) or storage,
//!                                   never below one per class
//! ```
//!
//! Every call to `check_and_scale()` yields a `ScaleEvent`, which is also
//! logged and broadcast to subscribers. `run_scaling_loop` drives a scaler
//! on a fixed interval until its shutdown signal fires.

pub mod budget;
pub mod event;
pub mod runner;
pub mod scaler;

pub use budget::{BudgetAutoscaler, ResourceClass};
pub use event::{PoolSize, ScaleAction, ScaleEvent};
pub use runner::{run_scaling_loop, SharedAutoscaler};
pub use scaler::{Autoscaler, BoundedAutoscaler};
