//! Uptime-adaptive availability cache.
//!
//! Each adapter keeps a bounded history of availability probes. The cache
//! TTL varies with observed uptime: flaky providers are re-probed sooner,
//! stable ones less often.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Maximum number of probe results retained
const HISTORY_LIMIT: usize = 50;

/// Minimum samples before uptime influences the TTL
const MIN_SAMPLES: usize = 10;

/// TTL when uptime is below 90 %
pub const SHORT_TTL: Duration = Duration::from_secs(30);

/// Baseline TTL for 90–99 % uptime or insufficient history
pub const BASELINE_TTL: Duration = Duration::from_secs(60);

/// TTL when uptime exceeds 99 %
pub const LONG_TTL: Duration = Duration::from_secs(120);

/// Bounded probe history with an adaptive TTL and the latest cached result
#[derive(Debug)]
pub struct AvailabilityTracker {
    history: VecDeque<bool>,
    last_probe: Option<(Instant, bool)>,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            last_probe: None,
        }
    }

    /// Record a probe result and cache it as the current availability
    pub fn record(&mut self, available: bool) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(available);
        self.last_probe = Some((Instant::now(), available));
    }

    /// Observed uptime over the retained history, or None with fewer than
    /// the minimum number of samples
    pub fn uptime(&self) -> Option<f64> {
        if self.history.len() < MIN_SAMPLES {
            return None;
        }
        let up = self.history.iter().filter(|&&b| b).count();
        Some(up as f64 / self.history.len() as f64)
    }

    /// Current TTL derived from uptime
    pub fn ttl(&self) -> Duration {
        match self.uptime() {
            None => BASELINE_TTL,
            Some(uptime) if uptime < 0.90 => SHORT_TTL,
            Some(uptime) if uptime <= 0.99 => BASELINE_TTL,
            Some(_) => LONG_TTL,
        }
    }

    /// The cached availability, if the last probe is still within the TTL
    pub fn cached(&self) -> Option<bool> {
        let (probed_at, available) = self.last_probe?;
        if probed_at.elapsed() < self.ttl() {
            Some(available)
        } else {
            None
        }
    }
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}
