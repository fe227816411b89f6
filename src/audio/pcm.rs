//! PCM16LE arithmetic shared by server and client

use crate::constants::{BYTES_PER_SAMPLE, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

/// Sample rate and channel layout of interleaved PCM16LE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl PcmFormat {
    /// Build a format, clamping channels to `1..=MAX_CHANNELS` and a zero rate to the default
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: if sample_rate == 0 {
                DEFAULT_SAMPLE_RATE
            } else {
                sample_rate
            },
            channels: channels.clamp(1, MAX_CHANNELS),
        }
    }

    /// Bytes of one sample frame (one sample on every channel)
    #[inline]
    pub fn block_align(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    #[inline]
    pub fn bytes_per_sec(&self) -> f64 {
        self.sample_rate as f64 * self.block_align() as f64
    }

    /// Bytes in one wire frame of `frame_ms`
    pub fn frame_bytes(&self, frame_ms: u32) -> usize {
        let samples = (self.sample_rate as f64 * frame_ms as f64 / 1000.0).round() as usize;
        samples * self.block_align()
    }

    /// Bytes consumed per viseme step, never less than one
    pub fn bytes_per_step(&self, step_ms: u32) -> usize {
        let bytes = (self.bytes_per_sec() * step_ms as f64 / 1000.0).round() as usize;
        bytes.max(1)
    }

    /// Round down to a whole number of sample frames
    #[inline]
    pub fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.block_align()
    }

    pub fn bytes_to_ms(&self, bytes: usize) -> f32 {
        (bytes as f64 * 1000.0 / self.bytes_per_sec()) as f32
    }

    pub fn ms_to_bytes(&self, ms: f32) -> usize {
        self.align_down((self.bytes_per_sec() * ms as f64 / 1000.0).round() as usize)
    }

    /// Number of sample frames in `bytes`
    #[inline]
    pub fn sample_frames(&self, bytes: usize) -> usize {
        bytes / self.block_align()
    }
}

/// Sine tone generator producing PCM16LE, same value on every channel
pub struct SineGenerator {
    format: PcmFormat,
    frequency: f64,
    amplitude: f64,
    phase: f64,
}

impl SineGenerator {
    pub fn new(format: PcmFormat, frequency: f64, amplitude: f64) -> Self {
        Self {
            format,
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            phase: 0.0,
        }
    }

    /// Next `duration_ms` of tone, continuing the phase of the previous call
    pub fn generate(&mut self, duration_ms: u32) -> Vec<u8> {
        let frames = (self.format.sample_rate as f64 * duration_ms as f64 / 1000.0).round() as usize;
        let step = std::f64::consts::TAU * self.frequency / self.format.sample_rate as f64;
        let mut out = Vec::with_capacity(frames * self.format.block_align());
        for _ in 0..frames {
            let value = (self.phase.sin() * self.amplitude * i16::MAX as f64) as i16;
            for _ in 0..self.format.channels {
                out.extend_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + step) % std::f64::consts::TAU;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes() {
        assert_eq!(PcmFormat::new(16000, 1).frame_bytes(20), 640);
        assert_eq!(PcmFormat::new(48000, 2).frame_bytes(20), 3840);
        assert_eq!(PcmFormat::new(22050, 1).frame_bytes(20), 882);
    }

    #[test]
    fn test_bytes_per_step() {
        assert_eq!(PcmFormat::new(16000, 1).bytes_per_step(8), 256);
        assert_eq!(PcmFormat::new(1, 1).bytes_per_step(1), 1);
    }

    #[test]
    fn test_channel_clamp() {
        assert_eq!(PcmFormat::new(16000, 0).channels, 1);
        assert_eq!(PcmFormat::new(16000, 99).channels, MAX_CHANNELS);
        assert_eq!(PcmFormat::new(0, 1).sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_alignment_and_duration() {
        let format = PcmFormat::new(16000, 2);
        assert_eq!(format.align_down(7), 4);
        assert_eq!(format.bytes_to_ms(64000), 1000.0);
        assert_eq!(format.ms_to_bytes(10.0), 640);
        assert_eq!(format.sample_frames(640), 160);
    }

    #[test]
    fn test_sine_generator_length() {
        let mut generator = SineGenerator::new(PcmFormat::new(16000, 2), 440.0, 0.3);
        let pcm = generator.generate(100);
        assert_eq!(pcm.len(), 1600 * 4);
        let peak = pcm
            .chunks_exact(2)
            .map(|s| i16::from_le_bytes([s[0], s[1]]).unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 9000 && peak <= 9831);
    }
}
