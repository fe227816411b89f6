//! Error types for the lip-sync streaming stack
//!
//! Only configuration-time and control calls surface these to callers. The media
//! path (decode, enqueue, distribute, drain) logs and counts failures instead of
//! propagating them.

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire packet validation failures (all of these mean "malformed, drop it")
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Bad magic: {0:?}")]
    BadMagic([u8; 2]),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown media type: {0}")]
    UnknownMediaType(u8),

    #[error("Payload overrun: header declares {declared} bytes, {available} available")]
    PayloadOverrun { declared: usize, available: usize },

    #[error("Invalid control payload: {0}")]
    Control(#[from] serde_json::Error),

    #[error("Invalid viseme payload: {0}")]
    Viseme(String),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Unaligned audio chunk: {bytes} bytes is less than one {frame_bytes}-byte frame")]
    UnalignedChunk { bytes: usize, frame_bytes: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Renderer already taken")]
    RendererTaken,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Loopback receiver disconnected")]
    LoopbackClosed,
}

/// Stream and endpoint registration errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Unknown stream target: {0}")]
    UnknownTarget(String),

    #[error("Stream id space exhausted")]
    IdsExhausted,

    #[error("Endpoint already registered: {0}")]
    AlreadyRegistered(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
