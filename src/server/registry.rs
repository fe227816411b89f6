//! Server-side stream registry
//!
//! Maps producer keys to wire stream ids and holds per-stream framing state
//! (format, carried tail bytes, PTS cursors, sequence counter) plus the
//! recipient sets. Owned by the frame distributor behind a single lock.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::audio::pcm::PcmFormat;
use crate::error::StreamError;

/// One producer stream
#[derive(Debug, Clone)]
pub struct LogicalStream {
    pub key: String,
    pub stream_id: u16,
    pub format: PcmFormat,
    /// A format announcement has been sent for the current format
    pub announced: bool,
    /// Bytes short of a full frame, carried into the next push
    pub tail: Vec<u8>,
    next_pts_us: Option<u64>,
    next_viseme_pts_us: Option<u64>,
    epoch_first_pts_us: Option<u64>,
    keyframe_pending: bool,
    seq: u32,
}

impl LogicalStream {
    fn new(key: String, stream_id: u16) -> Self {
        Self {
            key,
            stream_id,
            format: PcmFormat::default(),
            announced: false,
            tail: Vec::new(),
            next_pts_us: None,
            next_viseme_pts_us: None,
            epoch_first_pts_us: None,
            keyframe_pending: false,
            seq: 0,
        }
    }

    /// Start a new format epoch: drop the tail and both cursors
    pub fn reset_epoch(&mut self, format: PcmFormat) {
        self.format = format;
        self.tail.clear();
        self.next_pts_us = None;
        self.next_viseme_pts_us = None;
        self.epoch_first_pts_us = None;
        self.keyframe_pending = true;
        self.announced = true;
    }

    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// PTS for the next audio frame; advances the cursor by `frame_us`.
    ///
    /// The cursor starts at `now + pre_roll` and is pushed forward to that lead
    /// again whenever it has fallen behind `now`. It never moves backwards.
    pub fn take_frame_pts(&mut self, now_us: u64, pre_roll_us: u64, frame_us: u64) -> u64 {
        let pts = reseed(self.next_pts_us, now_us, pre_roll_us);
        self.next_pts_us = Some(pts + frame_us);
        if self.epoch_first_pts_us.is_none() {
            self.epoch_first_pts_us = Some(pts);
        }
        pts
    }

    /// PTS for the next viseme step, seeded at the epoch's first audio PTS
    pub fn take_viseme_pts(&mut self, now_us: u64, pre_roll_us: u64, step_us: u64) -> u64 {
        let pts = reseed(
            self.next_viseme_pts_us.or(self.epoch_first_pts_us),
            now_us,
            pre_roll_us,
        );
        self.next_viseme_pts_us = Some(pts + step_us);
        pts
    }

    /// Returns true once per epoch, for the first audio frame
    pub fn take_keyframe(&mut self) -> bool {
        std::mem::take(&mut self.keyframe_pending)
    }

    pub fn next_pts_us(&self) -> Option<u64> {
        self.next_pts_us
    }
}

#[inline]
fn reseed(cursor: Option<u64>, now_us: u64, pre_roll_us: u64) -> u64 {
    match cursor {
        Some(pts) if pts >= now_us => pts,
        Some(pts) => pts.max(now_us + pre_roll_us),
        None => now_us + pre_roll_us,
    }
}

/// Streams and recipients
#[derive(Debug)]
pub struct StreamRegistry {
    streams: HashMap<u16, LogicalStream>,
    key_to_id: HashMap<String, u16>,
    next_stream_id: u16,
    /// Clients registered by hello
    clients: HashSet<SocketAddr>,
    subscribers: HashMap<u16, HashSet<SocketAddr>>,
    /// Subscriptions for keys that have no stream id yet
    pending_key_subscribers: HashMap<String, HashSet<SocketAddr>>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            key_to_id: HashMap::new(),
            next_stream_id: 1,
            clients: HashSet::new(),
            subscribers: HashMap::new(),
            pending_key_subscribers: HashMap::new(),
        }
    }

    /// Look up the stream for `key`, allocating an id on first use
    pub fn get_or_create(&mut self, key: &str) -> Result<&mut LogicalStream, StreamError> {
        let stream_id = match self.key_to_id.get(key) {
            Some(&id) => id,
            None => {
                let id = self.allocate_id()?;
                self.key_to_id.insert(key.to_string(), id);
                self.streams.insert(id, LogicalStream::new(key.to_string(), id));
                if let Some(pending) = self.pending_key_subscribers.remove(key) {
                    self.subscribers.entry(id).or_default().extend(pending);
                }
                tracing::info!("Stream {} created for key '{}'", id, key);
                id
            }
        };
        self.streams
            .get_mut(&stream_id)
            .ok_or_else(|| StreamError::UnknownTarget(key.to_string()))
    }

    fn allocate_id(&mut self) -> Result<u16, StreamError> {
        if self.streams.len() >= u16::MAX as usize {
            return Err(StreamError::IdsExhausted);
        }
        loop {
            let id = self.next_stream_id;
            self.next_stream_id = self.next_stream_id.checked_add(1).unwrap_or(1);
            if !self.streams.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut LogicalStream> {
        let id = *self.key_to_id.get(key)?;
        self.streams.get_mut(&id)
    }

    pub fn stream_id(&self, key: &str) -> Option<u16> {
        self.key_to_id.get(key).copied()
    }

    /// Destroy a stream and its subscriptions
    pub fn remove(&mut self, key: &str) -> Option<LogicalStream> {
        let id = self.key_to_id.remove(key)?;
        self.subscribers.remove(&id);
        self.streams.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Streams that have announced a format
    pub fn announced(&self) -> impl Iterator<Item = &LogicalStream> {
        self.streams.values().filter(|s| s.announced)
    }

    pub fn add_client(&mut self, addr: SocketAddr) -> bool {
        self.clients.insert(addr)
    }

    pub fn remove_client(&mut self, addr: &SocketAddr) -> bool {
        self.clients.remove(addr)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Subscribe `addr` to `key`, held pending until the key has a stream
    pub fn add_subscriber(&mut self, key: &str, addr: SocketAddr) -> bool {
        match self.key_to_id.get(key) {
            Some(id) => self.subscribers.entry(*id).or_default().insert(addr),
            None => self
                .pending_key_subscribers
                .entry(key.to_string())
                .or_default()
                .insert(addr),
        }
    }

    pub fn remove_subscriber(&mut self, key: &str, addr: &SocketAddr) -> bool {
        let mut removed = false;
        if let Some(id) = self.key_to_id.get(key) {
            if let Some(set) = self.subscribers.get_mut(id) {
                removed |= set.remove(addr);
            }
        }
        if let Some(set) = self.pending_key_subscribers.get_mut(key) {
            removed |= set.remove(addr);
        }
        removed
    }

    pub fn clear_subscribers(&mut self, key: &str) {
        if let Some(id) = self.key_to_id.get(key) {
            self.subscribers.remove(id);
        }
        self.pending_key_subscribers.remove(key);
    }

    /// Recipients for a stream: its subscribers, else every hello client when
    /// `broadcast_fallback` is set
    pub fn recipients(&self, stream_id: u16, broadcast_fallback: bool) -> Vec<SocketAddr> {
        match self.subscribers.get(&stream_id) {
            Some(set) if !set.is_empty() => set.iter().copied().collect(),
            _ if broadcast_fallback => self.clients.iter().copied().collect(),
            _ => Vec::new(),
        }
    }
}
