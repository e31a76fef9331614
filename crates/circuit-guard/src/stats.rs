//! Per-generation request counters
//!
//! `Stats` carries no synchronization of its own. The circuit breaker owns the
//! only mutable copy and touches it exclusively while holding its lock, so
//! cross-field invariants (one streak is always zero) hold as a unit.

/// Counters for the current generation of a circuit breaker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Calls admitted in this generation
    pub requests: u32,
    /// Successful outcomes in this generation
    pub total_successes: u32,
    /// Failed outcomes in this generation
    pub total_failures: u32,
    /// Current success streak
    pub consecutive_successes: u32,
    /// Current failure streak
    pub consecutive_failures: u32,
}

impl Stats {
    /// Share of admitted requests that failed, `0.0` when nothing was admitted
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }

    pub(crate) fn request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
