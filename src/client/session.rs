//! Client session
//!
//! Decodes datagrams from the server, keeps the clock offset and jitter buffer
//! up to date and hands released media to a [`MediaSink`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::clock_sync::ClockOffsetEstimator;
use super::jitter::{DrainedMedia, JitterBuffer, JitterStats, PendingFrame};
use crate::clock::MediaClock;
use crate::config::AppConfig;
use crate::constants::{DEFAULT_JITTER_TARGET_MS, DEFAULT_OFFSET_LERP_ALPHA};
use crate::protocol::{decode, decode_batch, ControlMessage, MediaType};

/// Receiver of released media, keyed by producer stream key
pub trait MediaSink: Send + Sync {
    fn on_pcm(&self, key: &str, pcm: &[u8], sample_rate: u32, channels: u16);
    /// Captions and other text handed to the session by the host
    fn on_text(&self, key: &str, text: &str);
    fn on_viseme(&self, key: &str, indices: &[i32], confidence: &[f32]);
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jitter_target_ms: u32,
    pub offset_lerp_alpha: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jitter_target_ms: DEFAULT_JITTER_TARGET_MS,
            offset_lerp_alpha: DEFAULT_OFFSET_LERP_ALPHA,
        }
    }
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            jitter_target_ms: config.sync.jitter_target_ms,
            offset_lerp_alpha: config.sync.offset_lerp_alpha,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    packets: AtomicU64,
    invalid: AtomicU64,
    controls: AtomicU64,
    audio_frames: AtomicU64,
    viseme_points: AtomicU64,
    dropped: AtomicU64,
    delivered_bytes: AtomicU64,
}

/// Receive-side statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClientStats {
    pub packets: u64,
    /// Malformed datagrams
    pub invalid: u64,
    pub controls: u64,
    pub audio_frames: u64,
    pub viseme_points: u64,
    /// Media dropped by the jitter buffer (no format yet, or late)
    pub dropped: u64,
    pub delivered_bytes: u64,
    pub clock_offset_us: Option<f64>,
    pub jitter: JitterStats,
}

/// Client protocol state
pub struct ClientSession {
    clock: Arc<dyn MediaClock>,
    estimator: Mutex<ClockOffsetEstimator>,
    jitter: Mutex<JitterBuffer>,
    sink: Arc<dyn MediaSink>,
    counters: Counters,
}

impl ClientSession {
    pub fn new(config: SessionConfig, clock: Arc<dyn MediaClock>, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            clock,
            estimator: Mutex::new(ClockOffsetEstimator::new(config.offset_lerp_alpha)),
            jitter: Mutex::new(JitterBuffer::new(config.jitter_target_ms)),
            sink,
            counters: Counters::default(),
        }
    }

    /// Handle one datagram. Malformed input is counted and dropped.
    pub fn handle_datagram(&self, data: &[u8]) {
        self.counters.packets.fetch_add(1, Ordering::Relaxed);

        let (header, payload) = match decode(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.counters.invalid.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Dropping malformed packet: {}", e);
                return;
            }
        };

        match header.media_type {
            MediaType::Control => match ControlMessage::from_payload(payload) {
                Ok(ControlMessage::Format(announcement)) => {
                    self.counters.controls.fetch_add(1, Ordering::Relaxed);
                    let local_now = self.clock.now_us();
                    let offset = self
                        .estimator
                        .lock()
                        .observe(announcement.server_time_us, local_now);
                    tracing::debug!(
                        "Format for stream {}: {}Hz/{}ch, clock offset {:.0}us",
                        announcement.stream_id,
                        announcement.sr,
                        announcement.ch,
                        offset
                    );
                    self.jitter.lock().on_format(&announcement);
                }
                Ok(ControlMessage::Hello { .. }) => {
                    self.counters.controls.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.invalid.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Dropping bad control payload: {}", e);
                }
            },
            MediaType::Audio => {
                self.counters.audio_frames.fetch_add(1, Ordering::Relaxed);
                let frame = PendingFrame {
                    seq: header.seq,
                    pts_us: header.pts_us,
                    keyframe: header.flags.is_keyframe(),
                    payload: bytes::Bytes::copy_from_slice(payload),
                };
                if !self.jitter.lock().on_audio_frame(header.stream_id, frame) {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            MediaType::Viseme => match decode_batch(payload) {
                Ok(points) => {
                    self.counters
                        .viseme_points
                        .fetch_add(points.len() as u64, Ordering::Relaxed);
                    let kept = self.jitter.lock().on_visemes(header.stream_id, &points);
                    self.counters
                        .dropped
                        .fetch_add((points.len() - kept) as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.invalid.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Dropping bad viseme payload: {}", e);
                }
            },
        }
    }

    /// Release due media using the session clock
    pub fn drain(&self) -> usize {
        self.drain_at(self.clock.now_us())
    }

    /// Release media due at local time `local_now_us` and dispatch it to the
    /// sink. Returns the number of audio frames delivered.
    pub fn drain_at(&self, local_now_us: u64) -> usize {
        let Some(server_now) = self.estimator.lock().server_now_us(local_now_us) else {
            return 0;
        };
        let released = self.jitter.lock().drain(server_now);

        released.iter().map(|media| self.dispatch(media)).sum()
    }

    fn dispatch(&self, media: &DrainedMedia) -> usize {
        for frame in &media.audio {
            self.sink.on_pcm(
                &media.key,
                &frame.payload,
                media.format.sample_rate,
                media.format.channels,
            );
            self.counters
                .delivered_bytes
                .fetch_add(frame.payload.len() as u64, Ordering::Relaxed);
        }

        if !media.visemes.is_empty() {
            let indices: Vec<i32> = media.visemes.iter().map(|p| p.index as i32).collect();
            let confidence: Vec<f32> = media.visemes.iter().map(|p| p.confidence).collect();
            self.sink.on_viseme(&media.key, &indices, &confidence);
        }
        media.audio.len()
    }

    /// Forward host text (captions, transcripts) to the sink alongside the media.
    /// Empty text is ignored.
    pub fn deliver_text(&self, key: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        tracing::trace!("Text for '{}': {} chars", key, text.len());
        self.sink.on_text(key, text);
    }

    pub fn clock_offset_us(&self) -> Option<f64> {
        self.estimator.lock().offset_us()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            packets: self.counters.packets.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
            controls: self.counters.controls.load(Ordering::Relaxed),
            audio_frames: self.counters.audio_frames.load(Ordering::Relaxed),
            viseme_points: self.counters.viseme_points.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            delivered_bytes: self.counters.delivered_bytes.load(Ordering::Relaxed),
            clock_offset_us: self.clock_offset_us(),
            jitter: self.jitter.lock().stats(),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        tracing::info!(
            "Client: packets={} invalid={} audio={} visemes={} dropped={} delivered={}B offset={:?}",
            stats.packets,
            stats.invalid,
            stats.audio_frames,
            stats.viseme_points,
            stats.dropped,
            stats.delivered_bytes,
            stats.clock_offset_us.map(|o| o.round() as i64)
        );
    }
}
