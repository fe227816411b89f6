//! Playback endpoint
//!
//! One endpoint per producer key. It owns the producer half of a ring buffer and
//! hands the consumer half to whatever renders audio. The application calls
//! [`PlaybackEndpoint::update`] on its own tick; each update runs
//!
//! ```text
//! renderer counter -> progress estimate -> viseme steps -> pending format
//!                  -> underflow padding -> weights callback
//! ```

use std::collections::VecDeque;

use super::format::{FormatDecision, FormatSwitch, PendingFormat};
use super::progress::ConsumptionTracker;
use super::viseme::VisemeQueue;
use crate::audio::{ring_buffer, PcmConsumer, PcmFormat, PcmProducer, RingBufferConfig};
use crate::config::AppConfig;
use crate::constants::MAX_VISEME_SLOTS;
use crate::error::AudioError;
use crate::protocol::resolve_pairs;

const TEXT_HISTORY_LIMIT: usize = 256;
const STATUS_LOG_INTERVAL_US: u64 = 2_000_000;

/// Receives the one-hot mouth-shape vector after every update
pub type WeightsCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Endpoint settings
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub default_format: PcmFormat,
    pub warmup_ms: f32,
    pub format_switch_low_water_ms: f32,
    pub pad_silence_on_underflow: bool,
    pub underflow_low_water_steps: u32,
    pub underflow_pad_steps: u32,
    pub underrun_fade: bool,
    pub fade_ms: u32,
    pub compact_threshold: usize,
    pub step_ms: u32,
    pub neutral_index: usize,
    pub slot_count: usize,
    pub pop_by_audio_progress: bool,
    pub auto_pop: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EndpointConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_format: PcmFormat::new(
                config.playback.default_sample_rate,
                config.playback.default_channels,
            ),
            warmup_ms: config.playback.warmup_ms,
            format_switch_low_water_ms: config.playback.format_switch_low_water_ms,
            pad_silence_on_underflow: config.playback.pad_silence_on_underflow,
            underflow_low_water_steps: config.playback.underflow_low_water_steps,
            underflow_pad_steps: config.playback.underflow_pad_steps,
            underrun_fade: config.playback.underrun_fade,
            fade_ms: config.playback.fade_ms,
            compact_threshold: config.playback.compact_threshold_bytes,
            step_ms: config.viseme.step_ms,
            neutral_index: config.viseme.neutral_index,
            slot_count: config.viseme.slot_count.clamp(1, MAX_VISEME_SLOTS),
            pop_by_audio_progress: config.viseme.pop_by_audio_progress,
            auto_pop: config.viseme.auto_pop,
        }
    }
}

/// Audio versus mouth-shape durations.
///
/// Audio milliseconds are accumulated at the format in effect when the bytes
/// were queued; viseme milliseconds are steps times `step_ms`. A positive
/// delta means the viseme track is longer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioVisemeStats {
    pub audio_chunks_received: u64,
    pub audio_chunks_dropped: u64,
    pub audio_bytes_received: u64,
    pub audio_bytes_padded: u64,
    pub audio_ms_received: f64,
    pub audio_ms_padded: f64,
    pub audio_ms_total: f64,
    pub viseme_steps_received: u64,
    pub viseme_steps_padded: u64,
    pub viseme_steps_total: u64,
    pub viseme_ms_received: f64,
    pub viseme_ms_padded: f64,
    pub viseme_ms_total: f64,
    pub delta_ms_received: f64,
    pub delta_ms_total: f64,
    pub underflow_pads: u64,
    pub format_switches: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    chunks_received: u64,
    chunks_dropped: u64,
    bytes_received: u64,
    bytes_padded: u64,
    ms_received: f64,
    ms_padded: f64,
    steps_received: u64,
    steps_padded: u64,
    underflow_pads: u64,
    format_switches: u64,
}

/// Client-side playback of one stream: ring buffer, progress and mouth shapes
pub struct PlaybackEndpoint {
    key: String,
    config: EndpointConfig,
    format: PcmFormat,
    producer: PcmProducer,
    consumer: Option<PcmConsumer>,
    tracker: ConsumptionTracker,
    visemes: VisemeQueue,
    switch: FormatSwitch,
    warmup_bytes: u64,
    started: bool,
    last_auto_pop_us: Option<u64>,
    last_status_log_us: Option<u64>,
    totals: Totals,
    texts: VecDeque<String>,
    on_weights: Option<WeightsCallback>,
}

impl PlaybackEndpoint {
    pub fn new(config: EndpointConfig) -> Self {
        let format = config.default_format;
        let (producer, consumer) = ring_buffer(RingBufferConfig {
            format,
            compact_threshold: config.compact_threshold,
            underrun_fade: config.underrun_fade,
            fade_ms: config.fade_ms,
        });
        let visemes = VisemeQueue::new(
            config.slot_count,
            config.neutral_index,
            format.bytes_per_step(config.step_ms) as u64,
        );
        let switch = FormatSwitch::new(config.format_switch_low_water_ms);

        let mut endpoint = Self {
            key: String::new(),
            config,
            format,
            producer,
            consumer: Some(consumer),
            tracker: ConsumptionTracker::new(),
            visemes,
            switch,
            warmup_bytes: 0,
            started: false,
            last_auto_pop_us: None,
            last_status_log_us: None,
            totals: Totals::default(),
            texts: VecDeque::new(),
            on_weights: None,
        };
        endpoint.retime();
        endpoint
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn set_key(&mut self, key: String) {
        self.key = key;
    }

    /// Hand out the renderer side of the ring buffer. Only one renderer may exist.
    pub fn take_renderer(&mut self) -> Result<PcmConsumer, AudioError> {
        self.consumer.take().ok_or(AudioError::RendererTaken)
    }

    pub fn set_weights_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        self.on_weights = Some(Box::new(callback));
    }

    /// Queue PCM16LE. A zero `sample_rate` or `channels` keeps the current
    /// format. Returns the bytes queued for the renderer now; parked or dropped
    /// bytes count as zero.
    pub fn push_pcm(&mut self, pcm: &[u8], sample_rate: u32, channels: u16) -> usize {
        let incoming = (sample_rate > 0 && channels > 0).then(|| PcmFormat::new(sample_rate, channels));
        let buffered_ms = self.buffered_ms();

        match self
            .switch
            .decide(self.format, incoming, self.started, buffered_ms)
        {
            FormatDecision::Defer => {
                self.switch.defer(incoming, self.format, pcm);
                return 0;
            }
            FormatDecision::SwitchNow(format) => self.switch_now(format),
            FormatDecision::Current => {}
        }

        let queued = self.enqueue_received(pcm.to_vec());
        self.maybe_start();
        queued
    }

    /// Queue mouth shapes. `confidence` is either one weight per index, a table
    /// with one weight per slot, or anything else for full weight.
    pub fn push_visemes(&mut self, indices: &[i32], confidence: &[f32]) -> usize {
        if indices.is_empty() {
            return 0;
        }
        let pairs = resolve_pairs(indices, confidence, self.config.slot_count);
        self.visemes.push_pairs(&pairs);
        self.totals.steps_received += pairs.len() as u64;
        self.visemes.show_head(self.started);
        tracing::trace!(
            "[{}] {} visemes queued ({} pending)",
            self.key,
            pairs.len(),
            self.visemes.len()
        );
        pairs.len()
    }

    pub fn push_text(&mut self, text: &str) {
        tracing::info!("[{}] Text len={}: {:.64}", self.key, text.len(), text);
        if self.texts.len() == TEXT_HISTORY_LIMIT {
            self.texts.pop_front();
        }
        self.texts.push_back(text.to_string());
    }

    /// Received texts, oldest first
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.texts.iter().map(String::as_str)
    }

    pub fn last_text(&self) -> Option<&str> {
        self.texts.back().map(String::as_str)
    }

    /// Application tick
    pub fn update(&mut self, now_us: u64) {
        let bytes_per_sec = self.format.bytes_per_sec();
        let raw = self.producer.consumed_bytes();
        let consumed = self.tracker.poll(raw, now_us, self.started, bytes_per_sec);

        if self.config.pop_by_audio_progress {
            self.visemes.advance(consumed, self.started);
        }
        if self.config.auto_pop {
            self.auto_pop(now_us);
        }

        if self.switch.ready(self.started, self.buffered_ms()) {
            if let Some(pending) = self.switch.take() {
                self.apply_pending(pending);
            }
        }

        if self.config.pad_silence_on_underflow && self.started {
            self.pad_underflow();
        }

        if let Some(callback) = self.on_weights.as_mut() {
            callback(self.visemes.weights());
        }

        self.log_status(now_us);
    }

    /// Stop playback and drop everything queued
    pub fn stop(&mut self) {
        self.producer.stop();
        self.producer.flush();
        self.producer.reset_counters();
        self.started = false;
        self.tracker.reset();
        self.visemes.clear();
        self.switch.clear();
        self.last_auto_pop_us = None;
        tracing::debug!("[{}] Playback stopped", self.key);
    }

    pub fn weights(&self) -> &[f32] {
        self.visemes.weights()
    }

    pub fn buffered_ms(&self) -> f32 {
        self.tracker.buffered_ms(self.format.bytes_per_sec())
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn pending_format(&self) -> Option<PcmFormat> {
        self.switch.pending().map(|pending| pending.format)
    }

    pub fn is_playing(&self) -> bool {
        self.started
    }

    pub fn queued_visemes(&self) -> usize {
        self.visemes.len()
    }

    pub fn underrun_count(&self) -> u64 {
        self.producer.underrun_count()
    }

    pub fn stats(&self) -> AudioVisemeStats {
        let totals = &self.totals;
        let step_ms = self.config.step_ms as f64;
        let steps_total = totals.steps_received + totals.steps_padded;
        let audio_ms_total = totals.ms_received + totals.ms_padded;
        let viseme_ms_received = totals.steps_received as f64 * step_ms;
        let viseme_ms_total = steps_total as f64 * step_ms;

        AudioVisemeStats {
            audio_chunks_received: totals.chunks_received,
            audio_chunks_dropped: totals.chunks_dropped,
            audio_bytes_received: totals.bytes_received,
            audio_bytes_padded: totals.bytes_padded,
            audio_ms_received: totals.ms_received,
            audio_ms_padded: totals.ms_padded,
            audio_ms_total,
            viseme_steps_received: totals.steps_received,
            viseme_steps_padded: totals.steps_padded,
            viseme_steps_total: steps_total,
            viseme_ms_received,
            viseme_ms_padded: totals.steps_padded as f64 * step_ms,
            viseme_ms_total,
            delta_ms_received: viseme_ms_received - totals.ms_received,
            delta_ms_total: viseme_ms_total - audio_ms_total,
            underflow_pads: totals.underflow_pads,
            format_switches: totals.format_switches,
        }
    }

    pub fn reset_stats(&mut self) {
        self.totals = Totals::default();
    }

    /// Viseme duration minus audio duration, received-only or including padding
    pub fn duration_delta_ms(&self, use_total: bool) -> f64 {
        let stats = self.stats();
        if use_total {
            stats.delta_ms_total
        } else {
            stats.delta_ms_received
        }
    }

    pub fn is_duration_consistent(&self, use_total: bool, tolerance_ms: f32) -> bool {
        self.duration_delta_ms(use_total).abs() <= tolerance_ms as f64
    }

    fn retime(&mut self) {
        let bytes_per_step = self.format.bytes_per_step(self.config.step_ms) as u64;
        self.visemes.set_bytes_per_step(bytes_per_step);
        self.warmup_bytes =
            (self.format.bytes_per_sec() * self.config.warmup_ms.max(0.0) as f64 / 1000.0) as u64;
        tracing::debug!(
            "[{}] Timing {}Hz/{}ch: {} bytes/step, warm-up {} bytes",
            self.key,
            self.format.sample_rate,
            self.format.channels,
            bytes_per_step,
            self.warmup_bytes
        );
    }

    fn enqueue_received(&mut self, pcm: Vec<u8>) -> usize {
        let offered = pcm.len();
        let queued = self.producer.enqueue_owned(pcm);
        if queued == 0 {
            if offered > 0 {
                self.totals.chunks_dropped += 1;
            }
            return 0;
        }
        if queued != offered {
            tracing::trace!("[{}] Trimmed PCM {} -> {} bytes", self.key, offered, queued);
        }
        self.tracker.on_enqueued(queued as u64);
        self.totals.chunks_received += 1;
        self.totals.bytes_received += queued as u64;
        self.totals.ms_received += self.format.bytes_to_ms(queued) as f64;
        queued
    }

    fn maybe_start(&mut self) {
        if self.started {
            return;
        }
        let queued = self.tracker.total_enqueued();
        if queued > 0 && queued >= self.warmup_bytes {
            self.producer.start();
            self.started = true;
            self.tracker.mark_started(self.producer.consumed_bytes());
            self.visemes.show_head(true);
            tracing::debug!("[{}] Playback started with {} bytes queued", self.key, queued);
        } else {
            self.visemes.show_neutral();
        }
    }

    /// Apply a new format while nothing is playing
    fn switch_now(&mut self, format: PcmFormat) {
        self.producer.flush();
        self.producer.reset_counters();
        self.producer.set_params(format);
        self.format = format;
        self.tracker.reset();
        self.retime();
        self.totals.format_switches += 1;
        tracing::info!(
            "[{}] Format set to {}Hz/{}ch",
            self.key,
            format.sample_rate,
            format.channels
        );
    }

    fn apply_pending(&mut self, pending: PendingFormat) {
        self.producer.stop();
        self.started = false;
        self.producer.reset_counters();
        self.producer.flush();
        self.producer.set_params(pending.format);
        self.format = pending.format;
        self.visemes.clear();
        self.tracker.reset();
        self.retime();
        self.totals.format_switches += 1;

        let mut pcm = pending.pcm;
        pcm.truncate(self.format.align_down(pcm.len()));
        self.enqueue_received(pcm);
        self.maybe_start();

        tracing::info!(
            "[{}] Switched format to {}Hz/{}ch ({} bytes carried over)",
            self.key,
            self.format.sample_rate,
            self.format.channels,
            self.tracker.total_enqueued()
        );
    }

    fn auto_pop(&mut self, now_us: u64) {
        if self.started {
            self.last_auto_pop_us = None;
            return;
        }
        let step_us = self.config.step_ms.max(1) as u64 * 1000;
        let Some(last) = self.last_auto_pop_us else {
            self.last_auto_pop_us = Some(now_us);
            return;
        };
        let steps = now_us.saturating_sub(last) / step_us;
        for _ in 0..steps {
            self.visemes.auto_pop(false);
        }
        self.last_auto_pop_us = Some(last + steps * step_us);
    }

    fn pad_underflow(&mut self) {
        let bytes_per_step = self.visemes.bytes_per_step();
        let low_water = self.config.underflow_low_water_steps as u64 * bytes_per_step;
        let buffered = self.tracker.buffered_bytes();
        if buffered >= low_water {
            return;
        }

        let block_align = self.format.block_align();
        let pad_steps = self.config.underflow_pad_steps as usize;
        let pad_bytes = self
            .format
            .align_down(pad_steps * bytes_per_step as usize)
            .max(block_align);
        let queued = self.producer.enqueue_owned(vec![0u8; pad_bytes]);
        self.tracker.on_enqueued(queued as u64);
        self.visemes.push_neutral(pad_steps);

        self.totals.underflow_pads += 1;
        self.totals.bytes_padded += queued as u64;
        self.totals.ms_padded += self.format.bytes_to_ms(queued) as f64;
        self.totals.steps_padded += pad_steps as u64;
        tracing::debug!(
            "[{}] Underflow: padded {} bytes and {} neutral steps (buffer {} bytes)",
            self.key,
            queued,
            pad_steps,
            buffered
        );
    }

    fn log_status(&mut self, now_us: u64) {
        let due = self
            .last_status_log_us
            .map_or(true, |last| now_us.saturating_sub(last) >= STATUS_LOG_INTERVAL_US);
        if !due {
            return;
        }
        self.last_status_log_us = Some(now_us);
        tracing::debug!(
            "[{}] buffer={:.1}ms queued={} consumed={} playing={} visemes={}",
            self.key,
            self.buffered_ms(),
            self.tracker.total_enqueued(),
            self.tracker.estimate(),
            self.started,
            self.visemes.len()
        );
    }
}

impl std::fmt::Debug for PlaybackEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEndpoint")
            .field("key", &self.key)
            .field("format", &self.format)
            .field("started", &self.started)
            .field("buffered_ms", &self.buffered_ms())
            .field("queued_visemes", &self.visemes.len())
            .finish()
    }
}
