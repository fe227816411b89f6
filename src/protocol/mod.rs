//! Wire protocol: packet header, control messages, viseme batches

pub mod control;
pub mod packet;
pub mod viseme;

pub use control::{hello_packet, ControlMessage, FormatAnnouncement};
pub use packet::{decode, encode, MediaType, PacketFlags, PacketHeader, HEADER_SIZE, MAGIC, VERSION};
pub use viseme::{decode_batch, encode_batch, resolve_pairs, VisemePoint, MAX_POINTS_PER_PACKET};
