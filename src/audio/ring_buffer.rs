//! Producer/renderer bridge for PCM16LE
//!
//! Producers on any thread hand owned, frame-aligned chunks to the consumer over
//! an unbounded channel. The consumer (the render thread) merges them into a
//! private buffer it reads from, so the pull path never takes a lock:
//!
//! ```text
//!  PcmProducer ──Chunk::Pcm / Chunk::Flush──▶ PcmConsumer { data, read_offset }
//!       │                                          │
//!       └──────────── Shared (atomics) ◀───────────┘
//!        playing, consumed, pending, format, underruns
//! ```
//!
//! `consumed` packs a reset epoch in its top bits so a pull that was already in
//! flight when the counters were reset cannot leak into the new epoch.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::pcm::PcmFormat;
use crate::constants::{DEFAULT_COMPACT_THRESHOLD, MIN_COMPACT_THRESHOLD};
use crate::error::AudioError;

/// Ring buffer settings
#[derive(Debug, Clone, Copy)]
pub struct RingBufferConfig {
    pub format: PcmFormat,
    /// Read offset past which consumed bytes are reclaimed
    pub compact_threshold: usize,
    /// Ramp the first real audio in after a full underrun
    pub underrun_fade: bool,
    pub fade_ms: u32,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            format: PcmFormat::default(),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            underrun_fade: false,
            fade_ms: 3,
        }
    }
}

const COUNT_BITS: u32 = 48;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

#[inline]
fn epoch_of(packed: u64) -> u64 {
    packed >> COUNT_BITS
}

enum Chunk {
    Pcm(Vec<u8>),
    Flush,
}

struct Shared {
    playing: AtomicBool,
    /// Bytes handed to the renderer, silence included, below an epoch tag
    consumed: AtomicU64,
    /// Enqueued bytes not yet read or flushed
    pending: AtomicU64,
    underruns: AtomicU64,
    sample_rate: AtomicU32,
    channels: AtomicU32,
}

impl Shared {
    fn format(&self) -> PcmFormat {
        PcmFormat::new(
            self.sample_rate.load(Ordering::Acquire),
            self.channels.load(Ordering::Acquire) as u16,
        )
    }
}

/// Create a connected producer/consumer pair
pub fn ring_buffer(config: RingBufferConfig) -> (PcmProducer, PcmConsumer) {
    let (tx, rx) = unbounded();
    let shared = Arc::new(Shared {
        playing: AtomicBool::new(false),
        consumed: AtomicU64::new(0),
        pending: AtomicU64::new(0),
        underruns: AtomicU64::new(0),
        sample_rate: AtomicU32::new(config.format.sample_rate),
        channels: AtomicU32::new(config.format.channels as u32),
    });

    let producer = PcmProducer {
        tx,
        shared: shared.clone(),
    };
    let consumer = PcmConsumer {
        rx,
        shared,
        data: Vec::new(),
        read_offset: 0,
        compact_threshold: config.compact_threshold.max(MIN_COMPACT_THRESHOLD),
        underrun_fade: config.underrun_fade,
        fade_ms: config.fade_ms,
        fade_pos: None,
    };
    (producer, consumer)
}

/// Writing side, cheap to clone
#[derive(Clone)]
pub struct PcmProducer {
    tx: Sender<Chunk>,
    shared: Arc<Shared>,
}

impl PcmProducer {
    /// Queue PCM for the renderer.
    ///
    /// The chunk is truncated to whole sample frames; a chunk shorter than one
    /// frame is dropped. Returns the number of bytes queued.
    pub fn enqueue(&self, pcm: &[u8]) -> usize {
        let block_align = self.shared.format().block_align();
        let aligned = pcm.len() - pcm.len() % block_align;
        if aligned == 0 {
            if !pcm.is_empty() {
                tracing::warn!(
                    "{}",
                    AudioError::UnalignedChunk {
                        bytes: pcm.len(),
                        frame_bytes: block_align,
                    }
                );
            }
            return 0;
        }

        self.send(Chunk::Pcm(pcm[..aligned].to_vec()), aligned)
    }

    /// Queue an owned buffer without copying when it is already aligned
    pub fn enqueue_owned(&self, mut pcm: Vec<u8>) -> usize {
        let block_align = self.shared.format().block_align();
        let aligned = pcm.len() - pcm.len() % block_align;
        if aligned == 0 {
            if !pcm.is_empty() {
                tracing::warn!(
                    "{}",
                    AudioError::UnalignedChunk {
                        bytes: pcm.len(),
                        frame_bytes: block_align,
                    }
                );
            }
            return 0;
        }
        pcm.truncate(aligned);
        self.send(Chunk::Pcm(pcm), aligned)
    }

    fn send(&self, chunk: Chunk, bytes: usize) -> usize {
        self.shared.pending.fetch_add(bytes as u64, Ordering::AcqRel);
        if self.tx.send(chunk).is_err() {
            self.shared.pending.fetch_sub(bytes as u64, Ordering::AcqRel);
            tracing::debug!("Renderer gone, dropping {} bytes", bytes);
            return 0;
        }
        bytes
    }

    /// Discard everything queued so far. Applied by the consumer in order, so
    /// chunks enqueued after this call survive.
    pub fn flush(&self) {
        let _ = self.tx.send(Chunk::Flush);
    }

    /// Zero the consumed-bytes counter (renderer reset).
    ///
    /// Bumps the epoch, so a pull racing with the reset is not counted.
    pub fn reset_counters(&self) {
        let _ = self
            .shared
            .consumed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                Some(((epoch_of(packed) + 1) << COUNT_BITS) & !COUNT_MASK)
            });
    }

    pub fn set_params(&self, format: PcmFormat) {
        self.shared.sample_rate.store(format.sample_rate, Ordering::Release);
        self.shared.channels.store(format.channels as u32, Ordering::Release);
    }

    pub fn format(&self) -> PcmFormat {
        self.shared.format()
    }

    pub fn start(&self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Bytes handed to the renderer since the last counter reset
    pub fn consumed_bytes(&self) -> u64 {
        self.shared.consumed.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Queued bytes the renderer has not read yet
    pub fn pending_bytes(&self) -> u64 {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn underrun_count(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }
}

/// Reading side, owned by the render thread
pub struct PcmConsumer {
    rx: Receiver<Chunk>,
    shared: Arc<Shared>,
    data: Vec<u8>,
    read_offset: usize,
    compact_threshold: usize,
    underrun_fade: bool,
    fade_ms: u32,
    /// Frames of the current fade-in already played
    fade_pos: Option<usize>,
}

impl PcmConsumer {
    /// Pull exactly `requested` bytes, zero-padded
    pub fn pull(&mut self, requested: usize) -> Vec<u8> {
        let mut out = vec![0u8; requested];
        self.pull_into(&mut out);
        out
    }

    /// Fill `out` completely, returning how many bytes were real audio
    pub fn pull_into(&mut self, out: &mut [u8]) -> usize {
        let epoch = self.counter_epoch();
        self.merge_pending();

        let requested = out.len();
        if !self.shared.playing.load(Ordering::Acquire) {
            out.fill(0);
            return 0;
        }
        if requested == 0 {
            return 0;
        }

        let unread = self.data.len() - self.read_offset;
        let copied = requested.min(unread);
        out[..copied].copy_from_slice(&self.data[self.read_offset..self.read_offset + copied]);
        out[copied..].fill(0);
        self.read_offset += copied;
        self.shared.pending.fetch_sub(copied as u64, Ordering::AcqRel);

        if copied > 0 {
            self.fade_in(&mut out[..copied]);
        } else {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            if self.underrun_fade {
                self.fade_pos = Some(0);
            }
        }

        self.count_consumed(epoch, requested);
        self.compact();
        copied
    }

    /// Bytes merged into the private buffer and not yet read
    pub fn unread(&self) -> usize {
        self.data.len() - self.read_offset
    }

    pub fn format(&self) -> PcmFormat {
        self.shared.format()
    }

    fn counter_epoch(&self) -> u64 {
        epoch_of(self.shared.consumed.load(Ordering::Acquire))
    }

    /// Add to the consumed counter unless it was reset since `epoch`
    fn count_consumed(&self, epoch: u64, bytes: usize) {
        let _ = self
            .shared
            .consumed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                (epoch_of(packed) == epoch).then(|| {
                    let count = (packed & COUNT_MASK).wrapping_add(bytes as u64) & COUNT_MASK;
                    (packed & !COUNT_MASK) | count
                })
            });
    }

    fn merge_pending(&mut self) {
        while let Ok(chunk) = self.rx.try_recv() {
            match chunk {
                Chunk::Pcm(bytes) => self.data.extend_from_slice(&bytes),
                Chunk::Flush => {
                    let discarded = self.unread();
                    self.shared.pending.fetch_sub(discarded as u64, Ordering::AcqRel);
                    self.data.clear();
                    self.read_offset = 0;
                    self.fade_pos = None;
                }
            }
        }
    }

    /// Continue the ramp that follows an underrun across as many pulls as it takes
    fn fade_in(&mut self, produced: &mut [u8]) {
        let Some(pos) = self.fade_pos else {
            return;
        };
        let format = self.shared.format();
        let channels = format.channels as usize;
        let produced_frames = format.sample_frames(produced.len());
        let fade_frames = ((format.sample_rate as u64 * self.fade_ms as u64) / 1000).max(1) as usize;
        let n = fade_frames.saturating_sub(pos).min(produced_frames);

        for i in 0..n {
            let gain = (pos + i + 1) as f32 / fade_frames as f32;
            for ch in 0..channels {
                let idx = (i * channels + ch) * 2;
                let sample = i16::from_le_bytes([produced[idx], produced[idx + 1]]);
                let faded = (sample as f32 * gain).round() as i16;
                produced[idx..idx + 2].copy_from_slice(&faded.to_le_bytes());
            }
        }

        let pos = pos + n;
        self.fade_pos = (pos < fade_frames).then_some(pos);
    }

    fn compact(&mut self) {
        let unread = self.unread();
        if self.read_offset > self.compact_threshold && unread < self.compact_threshold / 2 {
            self.data.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}
