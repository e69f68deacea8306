//! Round-robin cursor.
//!
//! Remembers the last selected index and advances it with
//! `c = (c + 1) mod count`, where `count` is the pool size observed at
//! selection time. A resized pool keeps rotating from where it left off
//! instead of restarting at zero. Updates are a single atomic
//! read-modify-write, so concurrent selections never share a slot.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Sentinel for "nothing selected yet"; wraps to index 0 on first use.
const UNSET: usize = usize::MAX;

pub struct RoundRobinCursor {
    last: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self {
            last: AtomicUsize::new(UNSET),
        }
    }

    /// Advance and return the next index below `count`.
    ///
    /// Returns `None` if count is zero.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let step = |c: usize| c.wrapping_add(1) % count;
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(step(c)))
            .unwrap_or_else(|c| c);
        Some(step(prev))
    }

    /// Last selected index (for diagnostics).
    pub fn current(&self) -> Option<usize> {
        match self.last.load(Ordering::Acquire) {
            UNSET => None,
            c => Some(c),
        }
    }
}

impl Default for RoundRobinCursor {
    fn default() -> Self {
        Self::new()
    }
}
