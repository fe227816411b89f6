//! Microsecond time sources
//!
//! Every timing decision in the stack (PTS stamping, clock offset, drain, progress
//! extrapolation) reads time through [`MediaClock`] so it can be driven by hand in
//! tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic microsecond clock
pub trait MediaClock: Send + Sync {
    /// Current time in microseconds on this clock's time base
    fn now_us(&self) -> u64;
}

/// Monotonic clock anchored at construction
pub struct SystemClock {
    reference: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            reference: Instant::now(),
        }
    }

    /// Shared handle, the form most components take
    pub fn shared() -> Arc<dyn MediaClock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaClock for SystemClock {
    fn now_us(&self) -> u64 {
        self.reference.elapsed().as_micros() as u64
    }
}

/// Hand-driven clock for deterministic tests and simulations
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
        }
    }

    pub fn set_us(&self, now_us: u64) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    pub fn advance_us(&self, delta_us: u64) {
        self.now.fetch_add(delta_us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance_us(delta_ms * 1000);
    }
}

impl MediaClock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
