//! Audio subsystem: PCM arithmetic, WAV ingestion, ring buffer and renderer

pub mod pcm;
pub mod renderer;
pub mod ring_buffer;
pub mod wav;

pub use pcm::{PcmFormat, SineGenerator};
pub use renderer::ClockedRenderer;
pub use ring_buffer::{ring_buffer, PcmConsumer, PcmProducer, RingBufferConfig};
pub use wav::extract_pcm;
