//! Scan time budget and the clock abstraction used by the wait loops

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Monotonic time source with a sleep primitive
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary fixed origin
    fn now_millis(&self) -> u64;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Remaining scan time, as an immutable snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    remaining_millis: u64,
}

impl TimeBudget {
    pub fn new(remaining_millis: u64) -> Self {
        Self { remaining_millis }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining_millis
    }

    /// Budget left after `elapsed_millis` were spent, floored at zero
    #[must_use]
    pub fn consume(self, elapsed_millis: u64) -> Self {
        Self {
            remaining_millis: self.remaining_millis.saturating_sub(elapsed_millis),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_millis == 0
    }

    /// Part of the remaining budget a single phase may use
    pub fn share(&self, percentage: u64) -> u64 {
        self.remaining_millis.saturating_mul(percentage.min(100)) / 100
    }
}

/// Splits the remaining budget between the phases still to come.
///
/// Each wait loop receives a share of what is left when it starts, so a
/// phase finishing early leaves more time for the following ones.
#[derive(Debug, Clone, Copy)]
pub struct PhaseDurations {
    pub ajax_spider_enabled: bool,
    pub active_scan_enabled: bool,
}

impl PhaseDurations {
    pub fn new(ajax_spider_enabled: bool, active_scan_enabled: bool) -> Self {
        Self {
            ajax_spider_enabled,
            active_scan_enabled,
        }
    }

    pub fn ajax_spider(&self, budget: TimeBudget) -> u64 {
        if self.active_scan_enabled {
            budget.share(30)
        } else {
            budget.share(60)
        }
    }

    pub fn spider(&self, budget: TimeBudget) -> u64 {
        match (self.active_scan_enabled, self.ajax_spider_enabled) {
            (true, _) => budget.share(30),
            (false, true) => budget.share(70),
            (false, false) => budget.share(80),
        }
    }

    pub fn passive_scan(&self, budget: TimeBudget) -> u64 {
        if self.active_scan_enabled {
            budget.share(20)
        } else {
            budget.remaining()
        }
    }

    pub fn active_scan(&self, budget: TimeBudget) -> u64 {
        budget.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_is_floored_at_zero() {
        let budget = TimeBudget::new(1_000);
        assert_eq!(budget.consume(400).remaining(), 600);
        assert_eq!(budget.consume(5_000).remaining(), 0);
        assert!(budget.consume(1_000).is_exhausted());
        // snapshots are not mutated
        assert_eq!(budget.remaining(), 1_000);
    }

    #[test]
    fn test_phase_shares() {
        let budget = TimeBudget::new(10_000);
        let with_active = PhaseDurations::new(true, true);
        assert_eq!(with_active.ajax_spider(budget), 3_000);
        assert_eq!(with_active.spider(budget), 3_000);
        assert_eq!(with_active.passive_scan(budget), 2_000);
        assert_eq!(with_active.active_scan(budget), 10_000);

        let passive_only = PhaseDurations::new(false, false);
        assert_eq!(passive_only.spider(budget), 8_000);
        assert_eq!(passive_only.passive_scan(budget), 10_000);
    }

    #[tokio::test]
    async fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let before = clock.now_millis();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now_millis() >= before + 5);
    }
}
