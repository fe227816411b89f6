//! Viseme payloads
//!
//! `u16 count` followed by `count` points of `pts_us: u64, index: u8, confidence: u8`,
//! all little-endian. Confidence is quantized to 0..=255.

use bytes::{BufMut, BytesMut};

use super::packet::HEADER_SIZE;
use crate::constants::{MAX_PACKET_SIZE, MAX_VISEME_SLOTS};
use crate::error::PacketError;

const POINT_SIZE: usize = 10;
const COUNT_SIZE: usize = 2;

/// Most points that fit in one datagram
pub const MAX_POINTS_PER_PACKET: usize = (MAX_PACKET_SIZE - HEADER_SIZE - COUNT_SIZE) / POINT_SIZE;

/// One timed mouth shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemePoint {
    pub pts_us: u64,
    pub index: u8,
    /// 0.0..=1.0
    pub confidence: f32,
}

impl VisemePoint {
    pub fn new(pts_us: u64, index: u8, confidence: f32) -> Self {
        Self {
            pts_us,
            index,
            confidence,
        }
    }
}

/// Pair producer indices with weights.
///
/// `confidence` is read per step when it has one entry per index, as a
/// per-slot weight table when it has `slot_count` entries, and ignored (weight
/// 1.0) otherwise. Indices are clamped to `0..slot_count`, weights to `0.0..=1.0`.
/// `slot_count` itself is held to `1..=MAX_VISEME_SLOTS`.
pub fn resolve_pairs(indices: &[i32], confidence: &[f32], slot_count: usize) -> Vec<(usize, f32)> {
    let slot_count = slot_count.clamp(1, MAX_VISEME_SLOTS);
    let max_index = slot_count.saturating_sub(1) as i64;
    let clamp_index = |idx: i32| (idx as i64).clamp(0, max_index) as usize;
    let clamp_weight = |w: f32| if w.is_nan() { 0.0 } else { w.clamp(0.0, 1.0) };

    if confidence.len() == indices.len() {
        indices
            .iter()
            .zip(confidence)
            .map(|(&idx, &w)| (clamp_index(idx), clamp_weight(w)))
            .collect()
    } else if confidence.len() == slot_count {
        indices
            .iter()
            .map(|&idx| {
                let idx = clamp_index(idx);
                (idx, clamp_weight(confidence[idx]))
            })
            .collect()
    } else {
        indices.iter().map(|&idx| (clamp_index(idx), 1.0)).collect()
    }
}

#[inline]
fn quantize(confidence: f32) -> u8 {
    if confidence.is_nan() {
        return 0;
    }
    (confidence.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Serialize a batch of points
pub fn encode_batch(points: &[VisemePoint]) -> Vec<u8> {
    let count = points.len().min(u16::MAX as usize);
    let mut buf = BytesMut::with_capacity(COUNT_SIZE + count * POINT_SIZE);
    buf.put_u16_le(count as u16);
    for point in &points[..count] {
        buf.put_u64_le(point.pts_us);
        buf.put_u8(point.index);
        buf.put_u8(quantize(point.confidence));
    }
    buf.to_vec()
}

/// Parse a batch of points
pub fn decode_batch(payload: &[u8]) -> Result<Vec<VisemePoint>, PacketError> {
    if payload.len() < COUNT_SIZE {
        return Err(PacketError::Viseme(format!(
            "payload of {} bytes has no count",
            payload.len()
        )));
    }
    let count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let body = &payload[COUNT_SIZE..];
    if body.len() < count * POINT_SIZE {
        return Err(PacketError::Viseme(format!(
            "count {} needs {} bytes, {} available",
            count,
            count * POINT_SIZE,
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(POINT_SIZE)
        .take(count)
        .map(|chunk| {
            let mut pts = [0u8; 8];
            pts.copy_from_slice(&chunk[0..8]);
            VisemePoint {
                pts_us: u64::from_le_bytes(pts),
                index: chunk[8],
                confidence: chunk[9] as f32 / 255.0,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_roundtrip() {
        let points = vec![
            VisemePoint::new(1_000, 3, 1.0),
            VisemePoint::new(9_000, 0, 0.0),
            VisemePoint::new(17_000, 14, 0.5),
        ];
        let decoded = decode_batch(&encode_batch(&points)).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].pts_us, 1_000);
        assert_eq!(decoded[2].index, 14);
        assert_eq!(decoded[0].confidence, 1.0);
        assert!((decoded[2].confidence - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_confidence_clamped() {
        let decoded =
            decode_batch(&encode_batch(&[VisemePoint::new(0, 1, 3.5), VisemePoint::new(0, 1, -1.0)]))
                .unwrap();
        assert_eq!(decoded[0].confidence, 1.0);
        assert_eq!(decoded[1].confidence, 0.0);
    }

    #[test]
    fn test_truncated_batch_is_malformed() {
        let payload = encode_batch(&[VisemePoint::new(5, 2, 0.9), VisemePoint::new(6, 2, 0.9)]);
        assert!(decode_batch(&payload[..payload.len() - 1]).is_err());
        assert!(decode_batch(&[1]).is_err());
        assert!(decode_batch(&[]).is_err());
    }

    #[test]
    fn test_resolve_per_step_weights() {
        let pairs = resolve_pairs(&[1, 20, -3], &[0.5, 2.0, 0.25], 15);
        assert_eq!(pairs, vec![(1, 0.5), (14, 1.0), (0, 0.25)]);
    }

    #[test]
    fn test_resolve_slot_table() {
        let mut table = vec![0.0f32; 15];
        table[4] = 0.8;
        table[7] = 0.3;
        let pairs = resolve_pairs(&[4, 7], &table, 15);
        assert_eq!(pairs, vec![(4, 0.8), (7, 0.3)]);
    }

    #[test]
    fn test_resolve_mismatched_confidence() {
        let pairs = resolve_pairs(&[2, 3, 4], &[0.1, 0.2], 15);
        assert_eq!(pairs, vec![(2, 1.0), (3, 1.0), (4, 1.0)]);
        assert!(resolve_pairs(&[], &[], 15).is_empty());
    }

    #[test]
    fn test_resolve_zero_slots_uses_single_slot() {
        assert_eq!(resolve_pairs(&[3], &[], 0), vec![(0, 1.0)]);
        assert_eq!(resolve_pairs(&[3, -1], &[0.5], 0), vec![(0, 0.5), (0, 0.5)]);
    }

    #[test]
    fn test_resolve_indices_fit_in_a_byte() {
        let pairs = resolve_pairs(&[300, 1000], &[], 1000);
        assert_eq!(pairs, vec![(255, 1.0), (255, 1.0)]);
    }

    #[test]
    fn test_max_points_fit_in_datagram() {
        let points = vec![VisemePoint::new(0, 0, 1.0); MAX_POINTS_PER_PACKET];
        assert!(HEADER_SIZE + encode_batch(&points).len() <= MAX_PACKET_SIZE);
    }
}
