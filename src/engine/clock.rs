//! Time sources for the engine timeline.
//!
//! Every component takes `now` as a `Duration` since engine start, so the
//! same code runs against the wall clock or a hand-driven clock in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait representing the monotonic engine clock.
pub trait TimeSource: Send + Sync {
    /// Time elapsed since the engine timeline started.
    fn now(&self) -> Duration;
}

/// Wall-clock time source backed by `Instant`.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    micros: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) -> Duration {
        let micros = self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
        Duration::from_micros(micros) + by
    }

    pub fn set(&self, at: Duration) {
        self.micros.store(at.as_micros() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualTimeSource::new();
        let handle = clock.clone();
        assert_eq!(clock.now(), Duration::ZERO);

        assert_eq!(handle.advance(Duration::from_millis(16)), Duration::from_millis(16));
        assert_eq!(clock.now(), Duration::from_millis(16));

        handle.set(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemTimeSource::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
