//! Sender clock estimation
//!
//! Every format announcement carries the sender clock. The client keeps an
//! exponentially smoothed offset so that `server_now = local_now + offset`.

/// Smoothed sender-minus-local clock offset
#[derive(Debug, Clone)]
pub struct ClockOffsetEstimator {
    alpha: f64,
    offset_us: Option<f64>,
    observations: u64,
}

impl ClockOffsetEstimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            offset_us: None,
            observations: 0,
        }
    }

    /// Fold in one `(server_time, local_now)` observation and return the new offset.
    /// The first observation is taken as-is.
    pub fn observe(&mut self, server_time_us: u64, local_now_us: u64) -> f64 {
        let delta = server_time_us as f64 - local_now_us as f64;
        let offset = match self.offset_us {
            None => delta,
            Some(current) => current + (delta - current) * self.alpha,
        };
        self.offset_us = Some(offset);
        self.observations += 1;
        offset
    }

    pub fn offset_us(&self) -> Option<f64> {
        self.offset_us
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// Local time mapped onto the sender clock; `None` before the first observation
    pub fn server_now_us(&self, local_now_us: u64) -> Option<u64> {
        self.offset_us
            .map(|offset| (local_now_us as f64 + offset).max(0.0) as u64)
    }

    pub fn reset(&mut self) {
        self.offset_us = None;
        self.observations = 0;
    }
}
