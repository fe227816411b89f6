//! Deferred sample-format switching
//!
//! Changing the renderer format mid-stream would play queued audio at the wrong
//! rate. A switch that arrives while audio is playing (or while more than the
//! low-water mark is buffered) is parked with its PCM until playback drains.

use crate::audio::PcmFormat;

/// What to do with an incoming PCM chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatDecision {
    /// Same format as the renderer, enqueue directly
    Current,
    /// New format, nothing buffered worth protecting: switch now
    SwitchNow(PcmFormat),
    /// Park the chunk behind a pending switch
    Defer,
}

/// A parked format with the PCM that arrived in it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFormat {
    pub format: PcmFormat,
    pub pcm: Vec<u8>,
}

/// Decides when a format change may take effect
#[derive(Debug, Clone)]
pub struct FormatSwitch {
    low_water_ms: f32,
    pending: Option<PendingFormat>,
}

impl FormatSwitch {
    pub fn new(low_water_ms: f32) -> Self {
        Self {
            low_water_ms: low_water_ms.max(0.0),
            pending: None,
        }
    }

    /// Classify a chunk. `incoming` is `None` when the producer gave no format.
    ///
    /// Once a switch is pending every chunk is parked behind it so that audio
    /// keeps its arrival order.
    pub fn decide(
        &self,
        current: PcmFormat,
        incoming: Option<PcmFormat>,
        playing: bool,
        buffered_ms: f32,
    ) -> FormatDecision {
        if self.pending.is_some() {
            return FormatDecision::Defer;
        }
        match incoming {
            Some(format) if format != current => {
                if playing || buffered_ms > self.low_water_ms {
                    FormatDecision::Defer
                } else {
                    FormatDecision::SwitchNow(format)
                }
            }
            _ => FormatDecision::Current,
        }
    }

    /// Park `pcm`. An explicit format replaces the pending one; the bytes are
    /// appended either way and aligned when the switch applies.
    pub fn defer(&mut self, incoming: Option<PcmFormat>, fallback: PcmFormat, pcm: &[u8]) {
        let pending = self.pending.get_or_insert_with(|| PendingFormat {
            format: incoming.unwrap_or(fallback),
            pcm: Vec::new(),
        });
        if let Some(format) = incoming {
            pending.format = format;
        }
        pending.pcm.extend_from_slice(pcm);
        tracing::debug!(
            "Pending format {}Hz/{}ch, {} bytes parked",
            pending.format.sample_rate,
            pending.format.channels,
            pending.pcm.len()
        );
    }

    /// Whether a pending switch may apply now
    pub fn ready(&self, playing: bool, buffered_ms: f32) -> bool {
        self.pending.is_some() && (!playing || buffered_ms <= self.low_water_ms)
    }

    pub fn take(&mut self) -> Option<PendingFormat> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingFormat> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn low_water_ms(&self) -> f32 {
        self.low_water_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONO_16K: PcmFormat = PcmFormat {
        sample_rate: 16000,
        channels: 1,
    };
    const STEREO_48K: PcmFormat = PcmFormat {
        sample_rate: 48000,
        channels: 2,
    };

    #[test]
    fn test_same_or_missing_format_is_current() {
        let switch = FormatSwitch::new(40.0);
        assert_eq!(switch.decide(MONO_16K, None, true, 500.0), FormatDecision::Current);
        assert_eq!(
            switch.decide(MONO_16K, Some(MONO_16K), true, 500.0),
            FormatDecision::Current
        );
    }

    #[test]
    fn test_switch_now_when_idle_and_drained() {
        let switch = FormatSwitch::new(40.0);
        assert_eq!(
            switch.decide(MONO_16K, Some(STEREO_48K), false, 40.0),
            FormatDecision::SwitchNow(STEREO_48K)
        );
    }

    #[test]
    fn test_defer_while_playing_or_above_low_water() {
        let switch = FormatSwitch::new(40.0);
        assert_eq!(
            switch.decide(MONO_16K, Some(STEREO_48K), true, 0.0),
            FormatDecision::Defer
        );
        assert_eq!(
            switch.decide(MONO_16K, Some(STEREO_48K), false, 40.5),
            FormatDecision::Defer
        );
    }

    #[test]
    fn test_pending_parks_everything() {
        let mut switch = FormatSwitch::new(40.0);
        switch.defer(Some(STEREO_48K), MONO_16K, &[1, 2, 3]);
        assert_eq!(switch.decide(MONO_16K, None, false, 0.0), FormatDecision::Defer);

        switch.defer(None, MONO_16K, &[4, 5]);
        let pending = switch.pending().unwrap();
        assert_eq!(pending.format, STEREO_48K);
        assert_eq!(pending.pcm, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ready_only_at_or_below_low_water() {
        let mut switch = FormatSwitch::new(40.0);
        assert!(!switch.ready(false, 0.0));

        switch.defer(Some(STEREO_48K), MONO_16K, &[0; 8]);
        assert!(!switch.ready(true, 41.0));
        assert!(switch.ready(true, 40.0));
        assert!(switch.ready(false, 1000.0));

        let taken = switch.take().unwrap();
        assert_eq!(taken.format, STEREO_48K);
        assert!(!switch.is_pending());
    }
}
