//! Datagram sending

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::udp::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;

/// Anything that can deliver an encoded packet to a remote address
pub trait PacketTransport: Send + Sync {
    fn send_to(&self, packet: &[u8], addr: SocketAddr) -> Result<(), NetworkError>;
}

/// Sender-side counters
#[derive(Debug, Default)]
pub struct SenderStats {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
}

/// UDP transport over a shared socket
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    stats: SenderStats,
}

impl UdpSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            stats: SenderStats::default(),
        }
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

impl PacketTransport for UdpSender {
    fn send_to(&self, packet: &[u8], addr: SocketAddr) -> Result<(), NetworkError> {
        if packet.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(NetworkError::PacketTooLarge(packet.len()));
        }

        match self.socket.send_to(packet, addr) {
            Ok(sent) => {
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(NetworkError::SendFailed(format!("{}: {}", addr, e)))
            }
        }
    }
}
