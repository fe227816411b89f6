//! Playback progress estimation
//!
//! The renderer exposes a raw consumed-bytes counter that can jump back to zero
//! (renderer reset) and advances in whole render blocks. The tracker folds resets
//! into a base so the total only grows, and extrapolates with wall time while the
//! counter stalls so mouth shapes keep moving between blocks.

/// Smoothed and extrapolated consumption within one format epoch
#[derive(Debug, Clone, Default)]
pub struct ConsumptionTracker {
    base: u64,
    last_raw: u64,
    last_smoothed: u64,
    synthetic: u64,
    total_enqueued: u64,
    estimate: u64,
    last_poll_us: Option<u64>,
}

impl ConsumptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes handed to the ring buffer (audio or padding)
    pub fn on_enqueued(&mut self, bytes: u64) {
        self.total_enqueued += bytes;
    }

    /// Fold a raw counter reading. A reading below the previous one means the
    /// renderer was reset, so the previous reading moves into the base.
    pub fn smoothed(&mut self, raw: u64) -> u64 {
        if raw < self.last_raw {
            self.base += self.last_raw;
        }
        self.last_raw = raw;
        self.base + raw
    }

    /// Poll the renderer counter at `now_us` and return the estimated consumption
    pub fn poll(&mut self, raw: u64, now_us: u64, playing: bool, bytes_per_sec: f64) -> u64 {
        let smoothed = self.smoothed(raw);
        let elapsed_us = self
            .last_poll_us
            .map(|last| now_us.saturating_sub(last))
            .unwrap_or(0);
        self.last_poll_us = Some(now_us);

        if smoothed > self.last_smoothed {
            self.synthetic = self.synthetic.max(smoothed);
        } else if playing {
            let advance = (bytes_per_sec * elapsed_us as f64 / 1_000_000.0) as u64;
            self.synthetic = (self.synthetic + advance).min(self.total_enqueued);
        }
        self.last_smoothed = smoothed;

        let estimate = smoothed.max(self.synthetic).min(self.total_enqueued);
        self.estimate = self.estimate.max(estimate);
        self.estimate
    }

    /// Re-anchor extrapolation when playback starts
    pub fn mark_started(&mut self, raw: u64) {
        let smoothed = self.smoothed(raw);
        self.last_smoothed = smoothed;
        self.synthetic = self.synthetic.max(smoothed);
        self.last_poll_us = None;
    }

    /// Last estimate returned by [`poll`](Self::poll)
    pub fn estimate(&self) -> u64 {
        self.estimate
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    /// Enqueued bytes not yet consumed
    pub fn buffered_bytes(&self) -> u64 {
        self.total_enqueued.saturating_sub(self.estimate)
    }

    pub fn buffered_ms(&self, bytes_per_sec: f64) -> f32 {
        if bytes_per_sec <= 0.0 {
            return 0.0;
        }
        (self.buffered_bytes() as f64 * 1000.0 / bytes_per_sec) as f32
    }

    /// Start a new epoch (format switch or stop)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BPS: f64 = 32_000.0;

    #[test]
    fn test_reset_folds_into_base() {
        let mut tracker = ConsumptionTracker::new();
        tracker.on_enqueued(10_000);
        assert_eq!(tracker.poll(1_000, 0, true, BPS), 1_000);
        assert_eq!(tracker.poll(3_000, 1_000, true, BPS), 3_000);
        // renderer reset
        assert_eq!(tracker.poll(500, 2_000, true, BPS), 3_500);
        assert_eq!(tracker.buffered_bytes(), 6_500);
    }

    #[test]
    fn test_synthetic_extrapolates_while_stalled() {
        let mut tracker = ConsumptionTracker::new();
        tracker.on_enqueued(3_200);
        tracker.mark_started(0);
        assert_eq!(tracker.poll(640, 0, true, BPS), 640);
        // 10ms at 32000 B/s is 320 bytes
        assert_eq!(tracker.poll(640, 10_000, true, BPS), 960);
        assert_eq!(tracker.poll(640, 20_000, true, BPS), 1_280);
        // real progress below the extrapolation does not pull it back
        assert_eq!(tracker.poll(1_000, 30_000, true, BPS), 1_280);
        assert_eq!(tracker.poll(1_600, 40_000, true, BPS), 1_600);
    }

    #[test]
    fn test_synthetic_capped_at_enqueued() {
        let mut tracker = ConsumptionTracker::new();
        tracker.on_enqueued(640);
        tracker.mark_started(0);
        tracker.poll(0, 0, true, BPS);
        assert_eq!(tracker.poll(0, 1_000_000, true, BPS), 640);
        assert_eq!(tracker.buffered_bytes(), 0);
        assert_eq!(tracker.buffered_ms(BPS), 0.0);
    }

    #[test]
    fn test_no_extrapolation_when_stopped() {
        let mut tracker = ConsumptionTracker::new();
        tracker.on_enqueued(6_400);
        tracker.poll(0, 0, false, BPS);
        assert_eq!(tracker.poll(0, 50_000, false, BPS), 0);
        assert_eq!(tracker.buffered_ms(BPS), 200.0);
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let mut tracker = ConsumptionTracker::new();
        tracker.on_enqueued(1_000);
        tracker.poll(800, 0, true, BPS);
        tracker.reset();
        assert_eq!(tracker.estimate(), 0);
        assert_eq!(tracker.total_enqueued(), 0);
        assert_eq!(tracker.poll(0, 10, true, BPS), 0);
    }

    proptest! {
        #[test]
        fn prop_estimate_monotonic_across_resets(
            readings in proptest::collection::vec((0u64..5_000, 0u64..20_000, any::<bool>()), 1..60),
        ) {
            let mut tracker = ConsumptionTracker::new();
            tracker.on_enqueued(1_000_000);
            let mut now = 0u64;
            let mut previous = 0u64;
            for (raw, step_us, playing) in readings {
                now += step_us;
                let estimate = tracker.poll(raw, now, playing, BPS);
                prop_assert!(estimate >= previous);
                prop_assert!(estimate <= tracker.total_enqueued());
                previous = estimate;
            }
        }
    }
}
