//! Media packet framing
//!
//! Fixed 24-byte little-endian header followed by the payload:
//!
//! ```text
//! offset  size  field
//!      0     2  magic "AS"
//!      2     1  version (1)
//!      3     1  media type (0 audio, 1 viseme, 2 control)
//!      4     2  stream id
//!      6     4  sequence
//!     10     8  pts (µs, server time base)
//!     18     2  flags
//!     20     4  payload length
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PacketError;

/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Packet magic
pub const MAGIC: [u8; 2] = *b"AS";

/// Current wire protocol version
pub const VERSION: u8 = 1;

/// Payload kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MediaType {
    Audio = 0,
    Viseme = 1,
    Control = 2,
}

impl MediaType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(MediaType::Audio),
            1 => Some(MediaType::Viseme),
            2 => Some(MediaType::Control),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Packet flags (2 bytes)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketFlags(pub u16);

impl PacketFlags {
    pub const NONE: PacketFlags = PacketFlags(0);

    /// First frame of a stream epoch, or a key correction
    pub const KEYFRAME: u16 = 1 << 0;
    /// Payload carries redundant data
    pub const REDUNDANT: u16 = 1 << 1;

    #[inline]
    pub fn new(bits: u16) -> Self {
        PacketFlags(bits)
    }

    #[inline]
    pub fn is_keyframe(self) -> bool {
        self.0 & Self::KEYFRAME != 0
    }

    #[inline]
    pub fn is_redundant(self) -> bool {
        self.0 & Self::REDUNDANT != 0
    }

    #[inline]
    pub fn set_keyframe(&mut self, value: bool) {
        if value {
            self.0 |= Self::KEYFRAME;
        } else {
            self.0 &= !Self::KEYFRAME;
        }
    }

    #[inline]
    pub fn set_redundant(&mut self, value: bool) {
        if value {
            self.0 |= Self::REDUNDANT;
        } else {
            self.0 &= !Self::REDUNDANT;
        }
    }
}

/// Decoded packet header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub media_type: MediaType,
    pub stream_id: u16,
    pub seq: u32,
    pub pts_us: u64,
    pub flags: PacketFlags,
    pub payload_len: u32,
}

impl PacketHeader {
    /// Parse and validate a header. Does not check the payload length against
    /// the buffer; [`decode`] does that.
    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        if buf[0..2] != MAGIC {
            return Err(PacketError::BadMagic([buf[0], buf[1]]));
        }
        if buf[2] != VERSION {
            return Err(PacketError::UnsupportedVersion(buf[2]));
        }
        let media_type =
            MediaType::from_byte(buf[3]).ok_or(PacketError::UnknownMediaType(buf[3]))?;

        Ok(PacketHeader {
            media_type,
            stream_id: u16::from_le_bytes([buf[4], buf[5]]),
            seq: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            pts_us: u64::from_le_bytes([
                buf[10], buf[11], buf[12], buf[13], buf[14], buf[15], buf[16], buf[17],
            ]),
            flags: PacketFlags::new(u16::from_le_bytes([buf[18], buf[19]])),
            payload_len: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }

    /// Append the 24 header bytes
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.media_type.to_byte());
        buf.put_u16_le(self.stream_id);
        buf.put_u32_le(self.seq);
        buf.put_u64_le(self.pts_us);
        buf.put_u16_le(self.flags.0);
        buf.put_u32_le(self.payload_len);
    }
}

/// Build a complete packet
pub fn encode(
    media_type: MediaType,
    stream_id: u16,
    seq: u32,
    pts_us: u64,
    flags: PacketFlags,
    payload: &[u8],
) -> Bytes {
    let header = PacketHeader {
        media_type,
        stream_id,
        seq,
        pts_us,
        flags,
        payload_len: payload.len() as u32,
    };
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    header.write_to(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a datagram into header and payload slice
pub fn decode(buf: &[u8]) -> Result<(PacketHeader, &[u8]), PacketError> {
    let header = PacketHeader::parse(buf)?;
    let declared = header.payload_len as usize;
    let available = buf.len() - HEADER_SIZE;
    if declared > available {
        return Err(PacketError::PayloadOverrun {
            declared,
            available,
        });
    }
    Ok((header, &buf[HEADER_SIZE..HEADER_SIZE + declared]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn media_type_strategy() -> impl Strategy<Value = MediaType> {
        prop_oneof![
            Just(MediaType::Audio),
            Just(MediaType::Viseme),
            Just(MediaType::Control),
        ]
    }

    #[test]
    fn test_header_layout() {
        let packet = encode(
            MediaType::Control,
            0x0102,
            0x0304_0506,
            0x0708_090A_0B0C_0D0E,
            PacketFlags::new(PacketFlags::KEYFRAME),
            b"xyz",
        );
        assert_eq!(packet.len(), HEADER_SIZE + 3);
        assert_eq!(&packet[0..2], b"AS");
        assert_eq!(packet[2], 1);
        assert_eq!(packet[3], 2);
        assert_eq!(&packet[4..6], &[0x02, 0x01]);
        assert_eq!(&packet[6..10], &[0x06, 0x05, 0x04, 0x03]);
        assert_eq!(packet[10], 0x0E);
        assert_eq!(packet[17], 0x07);
        assert_eq!(&packet[18..20], &[0x01, 0x00]);
        assert_eq!(&packet[20..24], &[3, 0, 0, 0]);
        assert_eq!(&packet[24..], b"xyz");
    }

    #[test]
    fn test_decode_too_short() {
        let packet = encode(MediaType::Audio, 1, 1, 1, PacketFlags::NONE, &[]);
        assert!(matches!(
            decode(&packet[..HEADER_SIZE - 1]),
            Err(PacketError::TooShort { expected: 24, actual: 23 })
        ));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_bad_magic_and_version() {
        let mut packet = encode(MediaType::Audio, 1, 1, 1, PacketFlags::NONE, &[1, 2]).to_vec();
        packet[0] = b'X';
        assert!(matches!(decode(&packet), Err(PacketError::BadMagic(_))));

        let mut packet = encode(MediaType::Audio, 1, 1, 1, PacketFlags::NONE, &[1, 2]).to_vec();
        packet[2] = 2;
        assert!(matches!(decode(&packet), Err(PacketError::UnsupportedVersion(2))));

        let mut packet = encode(MediaType::Audio, 1, 1, 1, PacketFlags::NONE, &[1, 2]).to_vec();
        packet[3] = 9;
        assert!(matches!(decode(&packet), Err(PacketError::UnknownMediaType(9))));
    }

    #[test]
    fn test_decode_payload_overrun() {
        let packet = encode(MediaType::Audio, 1, 1, 1, PacketFlags::NONE, &[0u8; 10]);
        assert!(matches!(
            decode(&packet[..HEADER_SIZE + 9]),
            Err(PacketError::PayloadOverrun { declared: 10, available: 9 })
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut packet = encode(MediaType::Viseme, 7, 1, 1, PacketFlags::NONE, &[5, 6]).to_vec();
        packet.extend_from_slice(&[0xFF; 4]);
        let (header, payload) = decode(&packet).unwrap();
        assert_eq!(header.stream_id, 7);
        assert_eq!(payload, &[5, 6]);
    }

    #[test]
    fn test_flags() {
        let mut flags = PacketFlags::NONE;
        flags.set_keyframe(true);
        flags.set_redundant(true);
        assert!(flags.is_keyframe() && flags.is_redundant());
        flags.set_keyframe(false);
        assert_eq!(flags.0, PacketFlags::REDUNDANT);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            media_type in media_type_strategy(),
            stream_id in any::<u16>(),
            seq in any::<u32>(),
            pts_us in any::<u64>(),
            flags in any::<u16>(),
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let packet = encode(media_type, stream_id, seq, pts_us, PacketFlags::new(flags), &payload);
            let (header, body) = decode(&packet).unwrap();
            prop_assert_eq!(header.media_type, media_type);
            prop_assert_eq!(header.stream_id, stream_id);
            prop_assert_eq!(header.seq, seq);
            prop_assert_eq!(header.pts_us, pts_us);
            prop_assert_eq!(header.flags.0, flags);
            prop_assert_eq!(header.payload_len as usize, payload.len());
            prop_assert_eq!(body, &payload[..]);
        }

        #[test]
        fn prop_decode_arbitrary_bytes_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            if let Ok((header, payload)) = decode(&data) {
                prop_assert!(HEADER_SIZE + payload.len() <= data.len());
                prop_assert_eq!(payload.len(), header.payload_len as usize);
            }
        }

        #[test]
        fn prop_truncated_packet_is_malformed(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            cut in 1usize..256,
        ) {
            let packet = encode(MediaType::Audio, 1, 2, 3, PacketFlags::NONE, &payload);
            let cut = cut.min(packet.len());
            prop_assert!(decode(&packet[..packet.len() - cut]).is_err());
        }
    }
}
