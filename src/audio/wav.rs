//! RIFF/WAVE ingestion
//!
//! Producers may hand either raw PCM16LE or a complete WAV file to the server.
//! WAV input is unpacked to PCM16LE and its header decides the format.

use std::io::Cursor;

use super::pcm::PcmFormat;
use crate::constants::MAX_CHANNELS;
use crate::error::AudioError;

const MIN_WAV_LEN: usize = 44;

/// Cheap header sniff: RIFF....WAVE and at least a canonical header long
pub fn looks_like_wav(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_WAV_LEN && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a WAV file to interleaved PCM16LE.
///
/// Supports 16-bit integer and 32-bit float data with up to `MAX_CHANNELS`
/// channels; float samples are clamped to `-1.0..=1.0` and scaled by 32767.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<u8>, PcmFormat), AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.channels > MAX_CHANNELS {
        return Err(AudioError::UnsupportedFormat(format!(
            "{} channels (max {})",
            spec.channels, MAX_CHANNELS
        )));
    }
    let format = PcmFormat::new(spec.sample_rate, spec.channels);

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect::<Result<_, _>>()?,
        (sample_format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit",
                sample_format, bits
            )))
        }
    };

    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    Ok((pcm, format))
}

#[inline]
fn float_to_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Resolve producer bytes into PCM16LE plus format.
///
/// Anything that is not a decodable WAV is treated as raw PCM in `fallback`.
pub fn extract_pcm(bytes: &[u8], fallback: PcmFormat) -> (Vec<u8>, PcmFormat) {
    if looks_like_wav(bytes) {
        match decode_wav(bytes) {
            Ok(decoded) => return decoded,
            Err(e) => tracing::debug!("WAV decode failed, treating as raw PCM: {}", e),
        }
    }
    (bytes.to_vec(), fallback)
}
