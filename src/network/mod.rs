//! Network subsystem for UDP media transport

pub mod receiver;
pub mod sender;
pub mod udp;

pub use receiver::{Datagram, PacketReceiver, ReceiverStats};
pub use sender::{PacketTransport, SenderStats, UdpSender};
pub use udp::create_socket;
