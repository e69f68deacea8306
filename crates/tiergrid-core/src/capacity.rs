//! Static capacity planning.
//!
//! Sizes a pool for a known request volume up front, without any
//! feedback loop: every service absorbs up to `capacity` requests, and
//! services are added until the volume fits. Requests are spread evenly
//! and the remainder lands on one randomly chosen service.

use serde::Serialize;

use crate::error::{TierError, TierResult};
use crate::random::RandomSource;

/// How many services a request volume needs and what each one receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityPlan {
    pub capacity: u64,
    pub requests: u64,
    /// Requests assigned to each service, one entry per service.
    pub assignments: Vec<u64>,
}

impl CapacityPlan {
    pub fn services(&self) -> usize {
        self.assignments.len()
    }
}

/// Plan a pool for `requests` given a per-service `capacity`.
///
/// At least one service is always planned. The remainder of an uneven split
/// is given to a single service, which may then exceed `capacity`.
pub fn plan(
    capacity: u64,
    requests: u64,
    rng: &mut dyn RandomSource,
) -> TierResult<CapacityPlan> {
    if capacity == 0 {
        return Err(TierError::Config("per-service capacity must be positive".into()));
    }

    let services = requests.div_ceil(capacity).max(1) as usize;
    let share = requests / services as u64;
    let remainder = requests % services as u64;

    let mut assignments = vec![share; services];
    if remainder > 0 {
        let lucky = rng.next_index(services);
        assignments[lucky] += remainder;
    }

    Ok(CapacityPlan {
        capacity,
        requests,
        assignments,
    })
}
