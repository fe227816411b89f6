//! # Lip-Sync Streamer
//!
//! Low-latency PCM audio plus a parallel viseme (mouth-shape) stream over UDP,
//! with client-side playback progress driving mouth-shape timing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                                 SERVER                                    │
//! │   push(key, pcm, sr?, ch?)            push_visemes(key, idx, conf)        │
//! │            │                                   │                          │
//! │            ▼                                   ▼                          │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │            Frame Distributor (server::distributor)                  │  │
//! │  │   Stream Registry: key -> stream_id, format, tail, PTS cursors      │  │
//! │  │   slice into frame_ms frames, stamp PTS = now + pre-roll, ...       │  │
//! │  └────────────────────────────────────────────────────────────────────┘  │
//! │            │  Packets: [AS|ver|type|stream|seq|pts|flags|len|payload]     │
//! │            ▼                                                              │
//! │   subscribers(stream) or hello clients  +  in-process loopback            │
//! └────────────┼─────────────────────────────────────────────────────────────┘
//!              │ UDP
//!              ▼
//! ┌────────────┼─────────────────────────────────────────────────────────────┐
//! │            │                     CLIENT                                   │
//! │  ┌─────────▼──────────────────────────────────────────────────────────┐  │
//! │  │  Receive thread -> decode -> Client Session (client::session)      │  │
//! │  │    Control/format: clock offset lerp, reset stream                 │  │
//! │  │    Audio/Viseme:   pts-ordered jitter buffer, pre-roll gate        │  │
//! │  └─────────┬──────────────────────────────────────────────────────────┘  │
//! │            │ 10ms drain tick: release frames with pts <= server_now       │
//! │            ▼                                                              │
//! │  ┌────────────────────────────────────────────────────────────────────┐  │
//! │  │  Endpoint Manager -> Playback Endpoint (playback::endpoint)         │  │
//! │  │    ring buffer producer ──chunks──> renderer pull (audio clock)     │  │
//! │  │    consumed counter -> progress tracker -> viseme queue (one-hot)   │  │
//! │  │    format switch at low water, underflow padding                    │  │
//! │  └────────────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod endpoints;
#[cfg(feature = "client")]
pub mod playback;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate assumed when the producer does not supply one
    pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

    /// Channel count assumed when the producer does not supply one
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Upper bound for interleaved channels
    pub const MAX_CHANNELS: u16 = 8;

    /// PCM16LE
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Duration of one audio frame on the wire
    pub const DEFAULT_FRAME_MS: u32 = 20;

    /// Lead the server adds to the first frame PTS of a stream
    pub const DEFAULT_PRE_ROLL_MS: u32 = 180;

    /// Buffered depth a client needs before releasing a stream
    pub const DEFAULT_JITTER_TARGET_MS: u32 = 180;

    /// Smoothing factor for the clock offset estimate
    pub const DEFAULT_OFFSET_LERP_ALPHA: f64 = 0.1;

    /// Jitter buffer drain cadence
    pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 10;

    /// Default UDP port for media
    pub const DEFAULT_UDP_PORT: u16 = 18500;

    /// Socket receive buffer size
    pub const DEFAULT_RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;

    /// Maximum packet size for UDP
    pub const MAX_PACKET_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Mouth-shape time quantum
    pub const DEFAULT_VISEME_STEP_MS: u32 = 8;

    /// Length of the mouth-shape weight vector
    pub const VISEME_SLOT_COUNT: usize = 15;

    /// Slot indices travel as one byte
    pub const MAX_VISEME_SLOTS: usize = 256;

    /// Ring buffer compaction threshold
    pub const DEFAULT_COMPACT_THRESHOLD: usize = 64 * 1024;

    /// Compaction threshold floor
    pub const MIN_COMPACT_THRESHOLD: usize = 4096;
}
