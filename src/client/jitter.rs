//! PTS-ordered jitter buffer
//!
//! Each stream moves through:
//!
//! ```text
//! AwaitingFormat --format--> Buffering --depth >= target--> Ready
//!        ^                                                    |
//!        +------------------- next format --------------------+
//! ```
//!
//! Only Ready streams release media, and only media whose PTS has been reached
//! on the (estimated) sender clock.

use bytes::Bytes;
use std::collections::HashMap;

use crate::audio::pcm::PcmFormat;
use crate::protocol::{FormatAnnouncement, VisemePoint};

/// Per-stream buffering phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingFormat,
    Buffering,
    Ready,
}

/// One buffered audio frame
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub seq: u32,
    pub pts_us: u64,
    pub keyframe: bool,
    pub payload: Bytes,
}

/// Client view of one server stream
#[derive(Debug, Clone)]
pub struct ClientStreamState {
    pub stream_id: u16,
    pub key: String,
    pub format: PcmFormat,
    pub phase: StreamPhase,
    frames: Vec<PendingFrame>,
    visemes: Vec<VisemePoint>,
    last_audio_pts_us: Option<u64>,
    last_viseme_pts_us: Option<u64>,
}

impl ClientStreamState {
    fn new(stream_id: u16) -> Self {
        Self {
            stream_id,
            key: String::new(),
            format: PcmFormat::default(),
            phase: StreamPhase::AwaitingFormat,
            frames: Vec::new(),
            visemes: Vec::new(),
            last_audio_pts_us: None,
            last_viseme_pts_us: None,
        }
    }

    pub fn has_format(&self) -> bool {
        self.phase != StreamPhase::AwaitingFormat
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn pending_visemes(&self) -> usize {
        self.visemes.len()
    }

    /// Span between the oldest and newest buffered frame
    pub fn buffered_span_us(&self) -> u64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(oldest), Some(newest)) => newest.pts_us - oldest.pts_us,
            _ => 0,
        }
    }
}

/// Media released by one drain for one stream
#[derive(Debug, Clone)]
pub struct DrainedMedia {
    pub stream_id: u16,
    pub key: String,
    pub format: PcmFormat,
    pub audio: Vec<PendingFrame>,
    pub visemes: Vec<VisemePoint>,
}

/// Jitter buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterStats {
    pub frames_buffered: u64,
    pub frames_released: u64,
    /// Arrived for a stream with no format
    pub dropped_no_format: u64,
    /// Arrived after later media had already been released
    pub late: u64,
    pub visemes_released: u64,
}

/// Stream table keyed by wire stream id
#[derive(Debug)]
pub struct JitterBuffer {
    streams: HashMap<u16, ClientStreamState>,
    target_us: u64,
    stats: JitterStats,
}

impl JitterBuffer {
    pub fn new(target_ms: u32) -> Self {
        Self {
            streams: HashMap::new(),
            target_us: target_ms as u64 * 1000,
            stats: JitterStats::default(),
        }
    }

    /// Apply a format announcement: the stream's buffered media is discarded
    /// and buffering starts over in the new format.
    pub fn on_format(&mut self, announcement: &FormatAnnouncement) {
        let state = self
            .streams
            .entry(announcement.stream_id)
            .or_insert_with(|| ClientStreamState::new(announcement.stream_id));

        state.phase = StreamPhase::AwaitingFormat;
        state.frames.clear();
        state.visemes.clear();
        state.last_audio_pts_us = None;
        state.last_viseme_pts_us = None;

        state.key = announcement.key.clone();
        state.format = PcmFormat::new(announcement.sr, announcement.ch);
        state.phase = StreamPhase::Buffering;
        tracing::debug!(
            "Stream {} ('{}') format {}Hz/{}ch, buffering",
            state.stream_id,
            state.key,
            state.format.sample_rate,
            state.format.channels
        );
    }

    /// Insert an audio frame by PTS. Returns false when it was dropped.
    pub fn on_audio_frame(&mut self, stream_id: u16, frame: PendingFrame) -> bool {
        let target_us = self.target_us;
        let Some(state) = self.streams.get_mut(&stream_id).filter(|s| s.has_format()) else {
            self.stats.dropped_no_format += 1;
            return false;
        };
        if state.last_audio_pts_us.is_some_and(|last| frame.pts_us < last) {
            self.stats.late += 1;
            return false;
        }

        let pos = state.frames.partition_point(|f| f.pts_us <= frame.pts_us);
        state.frames.insert(pos, frame);
        self.stats.frames_buffered += 1;

        if state.phase == StreamPhase::Buffering && state.buffered_span_us() >= target_us {
            state.phase = StreamPhase::Ready;
            tracing::debug!("Stream {} pre-roll reached", stream_id);
        }
        true
    }

    /// Insert viseme points by PTS. Returns how many were kept.
    pub fn on_visemes(&mut self, stream_id: u16, points: &[VisemePoint]) -> usize {
        let Some(state) = self.streams.get_mut(&stream_id).filter(|s| s.has_format()) else {
            self.stats.dropped_no_format += points.len() as u64;
            return 0;
        };

        let mut kept = 0;
        for point in points {
            if state.last_viseme_pts_us.is_some_and(|last| point.pts_us < last) {
                self.stats.late += 1;
                continue;
            }
            let pos = state.visemes.partition_point(|p| p.pts_us <= point.pts_us);
            state.visemes.insert(pos, *point);
            kept += 1;
        }
        kept
    }

    /// Release, per Ready stream, everything with `pts <= server_now_us`
    pub fn drain(&mut self, server_now_us: u64) -> Vec<DrainedMedia> {
        let mut out = Vec::new();
        for state in self.streams.values_mut() {
            if state.phase != StreamPhase::Ready {
                continue;
            }

            let audio_due = state.frames.partition_point(|f| f.pts_us <= server_now_us);
            let viseme_due = state.visemes.partition_point(|p| p.pts_us <= server_now_us);
            if audio_due == 0 && viseme_due == 0 {
                continue;
            }

            let audio: Vec<PendingFrame> = state.frames.drain(..audio_due).collect();
            let visemes: Vec<VisemePoint> = state.visemes.drain(..viseme_due).collect();
            if let Some(last) = audio.last() {
                state.last_audio_pts_us = Some(last.pts_us);
            }
            if let Some(last) = visemes.last() {
                state.last_viseme_pts_us = Some(last.pts_us);
            }

            self.stats.frames_released += audio.len() as u64;
            self.stats.visemes_released += visemes.len() as u64;
            out.push(DrainedMedia {
                stream_id: state.stream_id,
                key: state.key.clone(),
                format: state.format,
                audio,
                visemes,
            });
        }
        out
    }

    pub fn stream(&self, stream_id: u16) -> Option<&ClientStreamState> {
        self.streams.get(&stream_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stats(&self) -> JitterStats {
        self.stats
    }

    pub fn target_us(&self) -> u64 {
        self.target_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn announcement(stream_id: u16) -> FormatAnnouncement {
        FormatAnnouncement {
            stream_id,
            sr: 16000,
            ch: 1,
            lead_ms: 180,
            frame_ms: 20,
            server_time_us: 0,
            key: format!("key-{}", stream_id),
        }
    }

    fn frame(seq: u32, pts_us: u64) -> PendingFrame {
        PendingFrame {
            seq,
            pts_us,
            keyframe: false,
            payload: Bytes::from(vec![seq as u8; 4]),
        }
    }

    #[test]
    fn test_frames_before_format_are_dropped() {
        let mut jitter = JitterBuffer::new(40);
        assert!(!jitter.on_audio_frame(1, frame(0, 0)));
        assert_eq!(jitter.stats().dropped_no_format, 1);
        assert!(jitter.stream(1).is_none());
    }

    #[test]
    fn test_ready_only_once_depth_reaches_target() {
        let mut jitter = JitterBuffer::new(40);
        jitter.on_format(&announcement(1));
        assert_eq!(jitter.stream(1).unwrap().phase, StreamPhase::Buffering);

        jitter.on_audio_frame(1, frame(0, 1_000_000));
        jitter.on_audio_frame(1, frame(1, 1_020_000));
        assert!(jitter.drain(u64::MAX).is_empty());
        assert_eq!(jitter.stream(1).unwrap().phase, StreamPhase::Buffering);

        jitter.on_audio_frame(1, frame(2, 1_040_000));
        assert_eq!(jitter.stream(1).unwrap().phase, StreamPhase::Ready);
    }

    #[test]
    fn test_drain_releases_due_frames_in_order() {
        let mut jitter = JitterBuffer::new(40);
        jitter.on_format(&announcement(1));
        for (seq, pts) in [(2, 1_040_000), (0, 1_000_000), (3, 1_060_000), (1, 1_020_000)] {
            jitter.on_audio_frame(1, frame(seq, pts));
        }

        let drained = jitter.drain(1_030_000);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].key, "key-1");
        let seqs: Vec<u32> = drained[0].audio.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1]);

        assert!(jitter.drain(1_030_000).is_empty());
        assert_eq!(jitter.drain(2_000_000)[0].audio.len(), 2);
    }

    #[test]
    fn test_late_frame_after_release_dropped() {
        let mut jitter = JitterBuffer::new(20);
        jitter.on_format(&announcement(1));
        jitter.on_audio_frame(1, frame(0, 100_000));
        jitter.on_audio_frame(1, frame(2, 140_000));
        jitter.drain(150_000);

        assert!(!jitter.on_audio_frame(1, frame(1, 120_000)));
        assert_eq!(jitter.stats().late, 1);
    }

    #[test]
    fn test_new_format_clears_stream() {
        let mut jitter = JitterBuffer::new(20);
        jitter.on_format(&announcement(1));
        jitter.on_audio_frame(1, frame(0, 0));
        jitter.on_audio_frame(1, frame(1, 20_000));
        jitter.on_visemes(1, &[VisemePoint::new(0, 3, 1.0)]);
        assert_eq!(jitter.stream(1).unwrap().phase, StreamPhase::Ready);

        let mut next = announcement(1);
        next.sr = 24000;
        jitter.on_format(&next);
        let state = jitter.stream(1).unwrap();
        assert_eq!(state.phase, StreamPhase::Buffering);
        assert_eq!(state.pending_frames(), 0);
        assert_eq!(state.pending_visemes(), 0);
        assert_eq!(state.format.sample_rate, 24000);
    }

    #[test]
    fn test_visemes_drain_with_audio() {
        let mut jitter = JitterBuffer::new(20);
        jitter.on_format(&announcement(4));
        jitter.on_audio_frame(4, frame(0, 0));
        jitter.on_audio_frame(4, frame(1, 20_000));
        assert_eq!(
            jitter.on_visemes(4, &[VisemePoint::new(16_000, 2, 1.0), VisemePoint::new(8_000, 1, 1.0)]),
            2
        );

        let drained = jitter.drain(10_000);
        let indices: Vec<u8> = drained[0].visemes.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1]);
        assert_eq!(drained[0].audio.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_drain_is_pts_ordered(
            pts in proptest::collection::vec(0u64..1_000_000, 1..60),
            cuts in proptest::collection::vec(0u64..1_200_000, 1..8),
        ) {
            let mut jitter = JitterBuffer::new(0);
            jitter.on_format(&announcement(1));
            for (seq, p) in pts.iter().enumerate() {
                jitter.on_audio_frame(1, frame(seq as u32, *p));
            }

            let mut cuts = cuts;
            cuts.sort_unstable();
            cuts.push(u64::MAX);
            let mut released = Vec::new();
            for cut in cuts {
                for media in jitter.drain(cut) {
                    for f in &media.audio {
                        prop_assert!(f.pts_us <= cut);
                    }
                    released.extend(media.audio.into_iter().map(|f| f.pts_us));
                }
            }

            prop_assert_eq!(released.len(), pts.len());
            prop_assert!(released.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
