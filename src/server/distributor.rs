//! Frame distributor
//!
//! Turns producer PCM byte runs into fixed-duration, PTS-stamped Audio packets
//! and sends them to subscribed clients:
//!
//! 1. Unpack WAV input, or take the bytes as raw PCM16LE in the given format.
//! 2. Announce the format (Control/format) on the first push and on every change.
//! 3. Prepend the carried tail, cut whole frames, stamp each from the stream's
//!    PTS cursor.
//! 4. Keep the remainder as the next tail.
//! 5. Send to the stream's subscribers, else every hello client, plus the
//!    in-process loopback when attached.

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::registry::{LogicalStream, StreamRegistry};
use crate::audio::pcm::PcmFormat;
use crate::audio::wav::extract_pcm;
use crate::clock::MediaClock;
use crate::config::AppConfig;
use crate::constants::*;
use crate::error::{NetworkError, Result};
use crate::network::{Datagram, PacketTransport};
use crate::protocol::{
    decode, encode, encode_batch, resolve_pairs, ControlMessage, FormatAnnouncement, MediaType,
    PacketFlags, VisemePoint, MAX_POINTS_PER_PACKET,
};

/// Distributor settings
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub frame_ms: u32,
    pub pre_roll_ms: u32,
    pub viseme_step_ms: u32,
    pub viseme_slot_count: usize,
    pub broadcast_when_no_subscribers: bool,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            frame_ms: DEFAULT_FRAME_MS,
            pre_roll_ms: DEFAULT_PRE_ROLL_MS,
            viseme_step_ms: DEFAULT_VISEME_STEP_MS,
            viseme_slot_count: VISEME_SLOT_COUNT,
            broadcast_when_no_subscribers: true,
        }
    }
}

impl From<&AppConfig> for DistributorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            frame_ms: config.sync.frame_ms,
            pre_roll_ms: config.sync.pre_roll_ms,
            viseme_step_ms: config.viseme.step_ms,
            viseme_slot_count: config.viseme.slot_count.clamp(1, MAX_VISEME_SLOTS),
            broadcast_when_no_subscribers: config.sync.broadcast_when_no_subscribers,
        }
    }
}

/// Producer-side totals
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IngestStats {
    pub total_pcm_bytes: u64,
    /// Sample frames (one sample on every channel)
    pub total_frames: u64,
    pub total_seconds: f64,
    pub total_visemes: u64,
}

/// Result of one [`FrameDistributor::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSummary {
    pub stream_id: u16,
    pub format: PcmFormat,
    /// Audio packets emitted
    pub frames_sent: usize,
    /// Bytes carried to the next push
    pub tail_bytes: usize,
    pub announced: bool,
}

/// Server-side frame slicer and fan-out
pub struct FrameDistributor {
    config: DistributorConfig,
    clock: Arc<dyn MediaClock>,
    transport: Option<Arc<dyn PacketTransport>>,
    loopback: Mutex<Option<Sender<Datagram>>>,
    registry: Mutex<StreamRegistry>,
    stats: Mutex<IngestStats>,
    packets_sent: AtomicU64,
    send_failures: AtomicU64,
}

impl FrameDistributor {
    pub fn new(
        config: DistributorConfig,
        clock: Arc<dyn MediaClock>,
        transport: Option<Arc<dyn PacketTransport>>,
    ) -> Self {
        tracing::info!(
            "Frame distributor: frame={}ms pre-roll={}ms viseme step={}ms",
            config.frame_ms,
            config.pre_roll_ms,
            config.viseme_step_ms
        );
        Self {
            config,
            clock,
            transport,
            loopback: Mutex::new(None),
            registry: Mutex::new(StreamRegistry::new()),
            stats: Mutex::new(IngestStats::default()),
            packets_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    /// Deliver every packet to an in-process receiver as well
    pub fn attach_loopback(&self, tx: Sender<Datagram>) {
        *self.loopback.lock() = Some(tx);
    }

    pub fn detach_loopback(&self) {
        *self.loopback.lock() = None;
    }

    /// Slice and send producer audio for `key`.
    ///
    /// `sample_rate`/`channels` describe raw input and are ignored for WAV input.
    pub fn push(
        &self,
        key: &str,
        bytes: &[u8],
        sample_rate: Option<u32>,
        channels: Option<u16>,
    ) -> Result<PushSummary> {
        let fallback = PcmFormat::new(
            sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            channels.unwrap_or(DEFAULT_CHANNELS),
        );
        let (pcm, format) = extract_pcm(bytes, fallback);
        let now_us = self.clock.now_us();
        let pre_roll_us = self.config.pre_roll_ms as u64 * 1000;
        let frame_us = self.config.frame_ms as u64 * 1000;

        let mut registry = self.registry.lock();
        let stream = registry.get_or_create(key)?;
        let stream_id = stream.stream_id;

        let mut packets = Vec::new();
        let announced = !stream.announced || stream.format != format;
        if announced {
            if stream.announced {
                tracing::info!(
                    "Stream {} format change {}Hz/{}ch -> {}Hz/{}ch",
                    stream_id,
                    stream.format.sample_rate,
                    stream.format.channels,
                    format.sample_rate,
                    format.channels
                );
            }
            stream.reset_epoch(format);
            let announcement = self.announcement(stream, now_us);
            packets.push(ControlMessage::Format(announcement).to_packet(stream.next_seq(), now_us)?);
        }

        let frame_bytes = format.frame_bytes(self.config.frame_ms).max(format.block_align());
        stream.tail.extend_from_slice(&pcm);
        let mut offset = 0;
        while stream.tail.len() - offset >= frame_bytes {
            let pts = stream.take_frame_pts(now_us, pre_roll_us, frame_us);
            let mut flags = PacketFlags::NONE;
            flags.set_keyframe(stream.take_keyframe());
            let seq = stream.next_seq();
            packets.push(encode(
                MediaType::Audio,
                stream_id,
                seq,
                pts,
                flags,
                &stream.tail[offset..offset + frame_bytes],
            ));
            offset += frame_bytes;
        }
        stream.tail.drain(..offset);

        let summary = PushSummary {
            stream_id,
            format,
            frames_sent: offset / frame_bytes,
            tail_bytes: stream.tail.len(),
            announced,
        };

        let recipients = registry.recipients(stream_id, self.config.broadcast_when_no_subscribers);
        for packet in &packets {
            self.send_packet(packet, &recipients);
        }
        drop(registry);

        self.record_audio(pcm.len(), format);
        tracing::trace!(
            "Stream {} push: {} bytes -> {} frames, tail {}",
            stream_id,
            pcm.len(),
            summary.frames_sent,
            summary.tail_bytes
        );
        Ok(summary)
    }

    /// Stamp and send mouth shapes for `key`, one per viseme step.
    ///
    /// Returns the number of points sent, or `None` when `key` has no stream.
    pub fn push_visemes(&self, key: &str, indices: &[i32], confidence: &[f32]) -> Option<usize> {
        let pairs = resolve_pairs(indices, confidence, self.config.viseme_slot_count);
        let now_us = self.clock.now_us();
        let pre_roll_us = self.config.pre_roll_ms as u64 * 1000;
        let step_us = self.config.viseme_step_ms as u64 * 1000;

        let mut registry = self.registry.lock();
        let Some(stream) = registry.get_mut(key) else {
            tracing::debug!("push_visemes: no stream for key '{}'", key);
            return None;
        };
        let stream_id = stream.stream_id;

        let points: Vec<VisemePoint> = pairs
            .iter()
            .map(|&(index, weight)| {
                VisemePoint::new(
                    stream.take_viseme_pts(now_us, pre_roll_us, step_us),
                    u8::try_from(index).unwrap_or(u8::MAX),
                    weight,
                )
            })
            .collect();

        let packets: Vec<Bytes> = points
            .chunks(MAX_POINTS_PER_PACKET)
            .map(|batch| {
                encode(
                    MediaType::Viseme,
                    stream_id,
                    stream.next_seq(),
                    batch[0].pts_us,
                    PacketFlags::NONE,
                    &encode_batch(batch),
                )
            })
            .collect();

        let recipients = registry.recipients(stream_id, self.config.broadcast_when_no_subscribers);
        for packet in &packets {
            self.send_packet(packet, &recipients);
        }
        drop(registry);

        self.stats.lock().total_visemes += points.len() as u64;
        Some(points.len())
    }

    /// Handle a datagram arriving at the server socket (only hello is expected)
    pub fn handle_datagram(&self, datagram: &Datagram) {
        let Some(from) = datagram.from else {
            return;
        };
        match decode(&datagram.data) {
            Ok((header, payload)) if header.media_type == MediaType::Control => {
                match ControlMessage::from_payload(payload) {
                    Ok(ControlMessage::Hello { port }) => self.handle_hello(from, port),
                    Ok(other) => tracing::debug!("Ignoring control {:?} from {}", other, from),
                    Err(e) => tracing::trace!("Bad control payload from {}: {}", from, e),
                }
            }
            Ok((header, _)) => {
                tracing::trace!("Ignoring {:?} packet from {}", header.media_type, from)
            }
            Err(e) => tracing::trace!("Malformed packet from {}: {}", from, e),
        }
    }

    /// Register a client by hello. `port` overrides the source port.
    pub fn handle_hello(&self, from: SocketAddr, port: Option<u16>) {
        let addr = match port {
            Some(port) if port != 0 => SocketAddr::new(from.ip(), port),
            _ => from,
        };
        self.add_client(addr);
    }

    /// Add a broadcast-fallback client; a new client is sent every current
    /// format announcement
    pub fn add_client(&self, addr: SocketAddr) -> bool {
        let mut registry = self.registry.lock();
        if !registry.add_client(addr) {
            return false;
        }
        tracing::info!("Client {} registered ({} total)", addr, registry.client_count());

        let now_us = self.clock.now_us();
        let keys: Vec<String> = registry.announced().map(|s| s.key.clone()).collect();
        for key in keys {
            self.send_catch_up(&mut registry, &key, addr, now_us);
        }
        true
    }

    pub fn remove_client(&self, addr: &SocketAddr) -> bool {
        self.registry.lock().remove_client(addr)
    }

    /// Subscribe `addr` to one key's stream (held pending until the key exists)
    pub fn add_subscriber_for_key(&self, key: &str, addr: SocketAddr) -> bool {
        let mut registry = self.registry.lock();
        let added = registry.add_subscriber(key, addr);
        if added {
            let now_us = self.clock.now_us();
            self.send_catch_up(&mut registry, key, addr, now_us);
        }
        added
    }

    pub fn remove_subscriber_for_key(&self, key: &str, addr: &SocketAddr) -> bool {
        self.registry.lock().remove_subscriber(key, addr)
    }

    pub fn clear_subscribers_for_key(&self, key: &str) {
        self.registry.lock().clear_subscribers(key);
    }

    /// Destroy the stream for `key`, dropping its tail and cursors
    pub fn close_stream(&self, key: &str) -> bool {
        match self.registry.lock().remove(key) {
            Some(stream) => {
                tracing::info!("Stream {} closed (key '{}')", stream.stream_id, key);
                true
            }
            None => false,
        }
    }

    pub fn stream_id(&self, key: &str) -> Option<u16> {
        self.registry.lock().stream_id(key)
    }

    pub fn stream_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn stats(&self) -> IngestStats {
        *self.stats.lock()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = IngestStats::default();
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn log_stats(&self, reason: &str) {
        let stats = self.stats();
        tracing::info!(
            "[{}] seconds={:.3} frames={} bytes={} visemes={} packets={} send_failures={}",
            reason,
            stats.total_seconds,
            stats.total_frames,
            stats.total_pcm_bytes,
            stats.total_visemes,
            self.packets_sent(),
            self.send_failures()
        );
    }

    fn announcement(&self, stream: &LogicalStream, now_us: u64) -> FormatAnnouncement {
        FormatAnnouncement {
            stream_id: stream.stream_id,
            sr: stream.format.sample_rate,
            ch: stream.format.channels,
            lead_ms: self.config.pre_roll_ms,
            frame_ms: self.config.frame_ms,
            server_time_us: now_us,
            key: stream.key.clone(),
        }
    }

    /// Send the current announcement of `key` to one address, if it has one
    fn send_catch_up(&self, registry: &mut StreamRegistry, key: &str, addr: SocketAddr, now_us: u64) {
        let Some(stream) = registry.get_mut(key).filter(|s| s.announced) else {
            return;
        };
        let announcement = self.announcement(stream, now_us);
        match ControlMessage::Format(announcement).to_packet(stream.next_seq(), now_us) {
            Ok(packet) => self.send_to(&packet, addr),
            Err(e) => tracing::warn!("Failed to encode catch-up announcement: {}", e),
        }
    }

    fn send_packet(&self, packet: &Bytes, recipients: &[SocketAddr]) {
        for &addr in recipients {
            self.send_to(packet, addr);
        }

        let mut loopback = self.loopback.lock();
        if let Some(tx) = loopback.as_ref() {
            let datagram = Datagram {
                data: packet.clone(),
                from: None,
            };
            if tx.send(datagram).is_err() {
                tracing::warn!("{}", NetworkError::LoopbackClosed);
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                *loopback = None;
            } else {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn send_to(&self, packet: &[u8], addr: SocketAddr) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        match transport.send_to(packet, addr) {
            Ok(()) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Send to {} failed: {}", addr, e);
            }
        }
    }

    fn record_audio(&self, bytes: usize, format: PcmFormat) {
        if bytes == 0 {
            return;
        }
        let frames = format.sample_frames(bytes) as u64;
        let mut stats = self.stats.lock();
        stats.total_pcm_bytes += bytes as u64;
        stats.total_frames += frames;
        stats.total_seconds += frames as f64 / format.sample_rate as f64;
    }
}

impl Drop for FrameDistributor {
    fn drop(&mut self) {
        self.log_stats("final");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{decode_batch, PacketHeader};
    use crossbeam_channel::{unbounded, Receiver};
    use std::net::{IpAddr, Ipv4Addr};

    /// Records every send; fails for port 9
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, Bytes)>>,
    }

    impl PacketTransport for RecordingTransport {
        fn send_to(&self, packet: &[u8], addr: SocketAddr) -> std::result::Result<(), NetworkError> {
            if addr.port() == 9 {
                return Err(NetworkError::SendFailed("unreachable".into()));
            }
            self.sent.lock().push((addr, Bytes::copy_from_slice(packet)));
            Ok(())
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn setup() -> (FrameDistributor, Arc<ManualClock>, Arc<RecordingTransport>, Receiver<Datagram>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let transport = Arc::new(RecordingTransport::default());
        let shared: Arc<dyn PacketTransport> = transport.clone();
        let distributor = FrameDistributor::new(DistributorConfig::default(), clock.clone(), Some(shared));
        let (tx, rx) = unbounded();
        distributor.attach_loopback(tx);
        (distributor, clock, transport, rx)
    }

    fn headers(rx: &Receiver<Datagram>) -> Vec<(PacketHeader, Vec<u8>)> {
        rx.try_iter()
            .map(|d| {
                let (header, payload) = decode(&d.data).unwrap();
                (header, payload.to_vec())
            })
            .collect()
    }

    #[test]
    fn test_two_frames_no_tail() {
        let (distributor, _clock, _transport, rx) = setup();
        let summary = distributor.push("voice", &[0u8; 1280], Some(16000), Some(1)).unwrap();
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(summary.tail_bytes, 0);
        assert!(summary.announced);

        let packets = headers(&rx);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].0.media_type, MediaType::Control);
        let ControlMessage::Format(format) = ControlMessage::from_payload(&packets[0].1).unwrap()
        else {
            panic!("expected format");
        };
        assert_eq!(format.sr, 16000);
        assert_eq!(format.lead_ms, 180);
        assert_eq!(format.server_time_us, 1_000_000);
        assert_eq!(format.key, "voice");

        assert_eq!(packets[1].0.payload_len, 640);
        assert_eq!(packets[1].0.pts_us, 1_180_000);
        assert!(packets[1].0.flags.is_keyframe());
        assert_eq!(packets[2].0.pts_us, 1_200_000);
        assert!(!packets[2].0.flags.is_keyframe());
        assert!(packets[2].0.seq > packets[1].0.seq);
    }

    #[test]
    fn test_tail_carried_between_pushes() {
        let (distributor, _clock, _transport, rx) = setup();
        let summary = distributor.push("voice", &[1u8; 1000], None, None).unwrap();
        assert_eq!((summary.frames_sent, summary.tail_bytes), (1, 360));

        let summary = distributor.push("voice", &[1u8; 300], None, None).unwrap();
        assert_eq!((summary.frames_sent, summary.tail_bytes), (1, 20));
        assert!(!summary.announced);

        let audio: Vec<_> = headers(&rx)
            .into_iter()
            .filter(|(h, _)| h.media_type == MediaType::Audio)
            .collect();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[1].0.pts_us - audio[0].0.pts_us, 20_000);
    }

    #[test]
    fn test_format_change_reannounces_and_resets_tail() {
        let (distributor, _clock, _transport, rx) = setup();
        distributor.push("voice", &[0u8; 700], Some(16000), Some(1)).unwrap();
        let summary = distributor.push("voice", &[0u8; 960], Some(24000), Some(1)).unwrap();
        assert!(summary.announced);
        assert_eq!(summary.frames_sent, 1);
        assert_eq!(summary.tail_bytes, 0);

        let controls = headers(&rx)
            .into_iter()
            .filter(|(h, _)| h.media_type == MediaType::Control)
            .count();
        assert_eq!(controls, 2);
    }

    #[test]
    fn test_cursor_reseeds_after_pause() {
        let (distributor, clock, _transport, rx) = setup();
        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        clock.advance_ms(2_000);
        distributor.push("voice", &[0u8; 640], None, None).unwrap();

        let pts: Vec<u64> = headers(&rx)
            .into_iter()
            .filter(|(h, _)| h.media_type == MediaType::Audio)
            .map(|(h, _)| h.pts_us)
            .collect();
        assert_eq!(pts, vec![1_180_000, 3_180_000]);
    }

    #[test]
    fn test_subscribers_take_precedence_over_broadcast() {
        let (distributor, _clock, transport, _rx) = setup();
        distributor.add_client(addr(4000));
        distributor.add_subscriber_for_key("voice", addr(5000));
        distributor.push("voice", &[0u8; 640], None, None).unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(a, _)| *a == addr(5000)));
    }

    #[test]
    fn test_send_failure_does_not_stop_distribution() {
        let (distributor, _clock, transport, _rx) = setup();
        distributor.add_client(addr(9));
        distributor.add_client(addr(4000));
        distributor.push("voice", &[0u8; 1280], None, None).unwrap();

        assert_eq!(distributor.send_failures(), 3);
        assert_eq!(transport.sent.lock().len(), 3);
    }

    #[test]
    fn test_hello_catch_up() {
        let (distributor, _clock, transport, _rx) = setup();
        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        assert!(transport.sent.lock().is_empty());

        distributor.handle_hello(addr(4000), Some(4100));
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, addr(4100));
        let (header, payload) = decode(&sent[0].1).unwrap();
        assert_eq!(header.media_type, MediaType::Control);
        assert!(matches!(
            ControlMessage::from_payload(payload).unwrap(),
            ControlMessage::Format(FormatAnnouncement { sr: 16000, .. })
        ));
        drop(sent);

        assert!(!distributor.add_client(addr(4100)));
    }

    #[test]
    fn test_push_visemes() {
        let (distributor, _clock, _transport, rx) = setup();
        assert_eq!(distributor.push_visemes("voice", &[1, 2], &[]), None);

        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        let _ = headers(&rx);

        assert_eq!(distributor.push_visemes("voice", &[3, 4, 99], &[]), Some(3));
        let packets = headers(&rx);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0.media_type, MediaType::Viseme);
        let points = decode_batch(&packets[0].1).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].pts_us, 1_180_000);
        assert_eq!(points[1].pts_us, 1_188_000);
        assert_eq!(points[2].index, 14);
        assert_eq!(distributor.stats().total_visemes, 3);
    }

    #[test]
    fn test_push_visemes_with_degenerate_slot_counts() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        for slot_count in [0, 1000] {
            let config = DistributorConfig {
                viseme_slot_count: slot_count,
                ..Default::default()
            };
            let distributor = FrameDistributor::new(config, clock.clone(), None);
            let (tx, rx) = unbounded();
            distributor.attach_loopback(tx);
            distributor.push("voice", &[0u8; 640], None, None).unwrap();
            let _ = headers(&rx);

            assert_eq!(distributor.push_visemes("voice", &[3, 700], &[]), Some(2));
            let packets = headers(&rx);
            let points = decode_batch(&packets[0].1).unwrap();
            let expected: Vec<u8> = if slot_count == 0 { vec![0, 0] } else { vec![3, 255] };
            assert_eq!(points.iter().map(|p| p.index).collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn test_large_viseme_batch_is_chunked() {
        let (distributor, _clock, _transport, rx) = setup();
        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        let _ = headers(&rx);

        let indices = vec![1; MAX_POINTS_PER_PACKET + 5];
        distributor.push_visemes("voice", &indices, &[]);
        let packets = headers(&rx);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|(h, _)| h.payload_len as usize + 24 <= MAX_PACKET_SIZE));
    }

    #[test]
    fn test_close_stream_and_stats() {
        let (distributor, _clock, _transport, _rx) = setup();
        distributor.push("voice", &[0u8; 32000], None, None).unwrap();
        let stats = distributor.stats();
        assert_eq!(stats.total_pcm_bytes, 32000);
        assert_eq!(stats.total_frames, 16000);
        assert!((stats.total_seconds - 1.0).abs() < 1e-9);

        assert!(distributor.close_stream("voice"));
        assert!(!distributor.close_stream("voice"));
        assert_eq!(distributor.stream_count(), 0);

        distributor.reset_stats();
        assert_eq!(distributor.stats(), IngestStats::default());
    }

    #[test]
    fn test_loopback_disconnect_is_tolerated() {
        let (distributor, _clock, _transport, rx) = setup();
        drop(rx);
        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        distributor.push("voice", &[0u8; 640], None, None).unwrap();
        assert_eq!(distributor.send_failures(), 1);
    }
}
