//! Time utilities for game simulation

#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Source of wall-clock time for the simulation.
///
/// Every timer deadline and entity timestamp is expressed in Unix
/// milliseconds read through this trait, so tests can drive the whole
/// lifecycle with a manual clock instead of sleeping.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        unix_millis()
    }
}

/// Virtual clock advanced by hand
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Default world tick period
pub const TICK_INTERVAL_MS: u64 = 100;
/// Default period of the remaining-time report
pub const STATUS_INTERVAL_MS: u64 = 1_000;

/// Convert a tick period to the movement delta time (in seconds)
pub fn tick_delta(tick_interval_ms: u64) -> f64 {
    tick_interval_ms as f64 / 1000.0
}
