//! Engine counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counter
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed)
    }

    /// Raise to `val` if larger
    #[inline(always)]
    pub fn max(&self, val: u64) {
        self.0.fetch_max(val, Ordering::Relaxed);
    }
}

/// Lock-free engine counters, shared by every component of one engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub events_handled: AtomicCounter,
    pub assignments: AtomicCounter,
    pub unassigned: AtomicCounter,
    pub automations_fired: AtomicCounter,
    pub escalations_fired: AtomicCounter,
    pub actions_applied: AtomicCounter,
    pub actions_failed: AtomicCounter,
    pub evaluation_errors: AtomicCounter,
    pub ticks_completed: AtomicCounter,
    pub ticks_dropped: AtomicCounter,
    pub ticks_timed_out: AtomicCounter,
    pub last_tick_ms: AtomicCounter,
    pub max_tick_ms: AtomicCounter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, elapsed: Duration) {
        let ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        self.last_tick_ms.set(ms);
        self.max_tick_ms.max(ms);
    }

    pub fn snapshot(&self, catalog_version: u64) -> EngineStats {
        EngineStats {
            catalog_version,
            events_handled: self.events_handled.get(),
            assignments: self.assignments.get(),
            unassigned: self.unassigned.get(),
            automations_fired: self.automations_fired.get(),
            escalations_fired: self.escalations_fired.get(),
            actions_applied: self.actions_applied.get(),
            actions_failed: self.actions_failed.get(),
            evaluation_errors: self.evaluation_errors.get(),
            ticks_completed: self.ticks_completed.get(),
            ticks_dropped: self.ticks_dropped.get(),
            ticks_timed_out: self.ticks_timed_out.get(),
            last_tick_ms: self.last_tick_ms.get(),
            max_tick_ms: self.max_tick_ms.get(),
        }
    }
}

/// Engine statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub catalog_version: u64,
    pub events_handled: u64,
    pub assignments: u64,
    pub unassigned: u64,
    pub automations_fired: u64,
    pub escalations_fired: u64,
    pub actions_applied: u64,
    pub actions_failed: u64,
    pub evaluation_errors: u64,
    pub ticks_completed: u64,
    pub ticks_dropped: u64,
    pub ticks_timed_out: u64,
    pub last_tick_ms: u64,
    pub max_tick_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = AtomicCounter::new(0);
        assert_eq!(counter.inc(), 0);
        assert_eq!(counter.add(4), 1);
        assert_eq!(counter.get(), 5);
        counter.max(3);
        assert_eq!(counter.get(), 5);
        counter.max(9);
        assert_eq!(counter.get(), 9);
    }

    #[test]
    fn test_tick_durations() {
        let metrics = EngineMetrics::new();
        metrics.record_tick(Duration::from_millis(40));
        metrics.record_tick(Duration::from_millis(15));
        let stats = metrics.snapshot(3);
        assert_eq!(stats.last_tick_ms, 15);
        assert_eq!(stats.max_tick_ms, 40);
        assert_eq!(stats.catalog_version, 3);
    }
}
