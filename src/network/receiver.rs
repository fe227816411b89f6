//! Datagram receive thread
//!
//! One thread per socket blocks on `recv_from` (with a short read timeout so it
//! can observe shutdown) and forwards every datagram to a crossbeam channel for
//! the decode loop.

use bytes::Bytes;
use crossbeam_channel::Sender;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::udp::MAX_DATAGRAM_SIZE;
use crate::error::{NetworkError, Result};

/// One received datagram. `from` is `None` for in-process loopback delivery.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Bytes,
    pub from: Option<SocketAddr>,
}

/// Receive-side counters
#[derive(Debug, Default)]
pub struct ReceiverStats {
    pub packets_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub receive_errors: AtomicU64,
    /// Datagrams dropped because the decode loop went away
    pub dropped: AtomicU64,
}

/// Receive thread bound to a socket
pub struct PacketReceiver {
    running: Arc<AtomicBool>,
    stats: Arc<ReceiverStats>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PacketReceiver {
    /// Spawn the receive loop
    pub fn start(socket: Arc<UdpSocket>, tx: Sender<Datagram>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ReceiverStats::default());

        let running_for_loop = running.clone();
        let stats_for_loop = stats.clone();
        let local = socket.local_addr().ok();
        let handle = thread::Builder::new()
            .name("udp-receiver".into())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

                while running_for_loop.load(Ordering::Relaxed) {
                    match socket.recv_from(&mut buf) {
                        Ok((len, from)) => {
                            stats_for_loop.packets_received.fetch_add(1, Ordering::Relaxed);
                            stats_for_loop.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                            let datagram = Datagram {
                                data: Bytes::copy_from_slice(&buf[..len]),
                                from: Some(from),
                            };
                            if tx.send(datagram).is_err() {
                                stats_for_loop.dropped.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!("Decode loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                        Err(e) => {
                            stats_for_loop.receive_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::trace!("{}", NetworkError::ReceiveFailed(e.to_string()));
                        }
                    }
                }
            })?;

        tracing::info!("Receiver started on {:?}", local);
        Ok(Self {
            running,
            stats,
            thread_handle: Some(handle),
        })
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PacketReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::udp::create_socket;
    use crossbeam_channel::bounded;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    #[test]
    fn test_receiver_forwards_datagrams() {
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let socket = Arc::new(create_socket(local, 0).unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = bounded(16);
        let mut receiver = PacketReceiver::start(socket, tx).unwrap();

        let peer = create_socket(local, 0).unwrap();
        peer.send_to(b"abc", addr).unwrap();

        let datagram = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(&datagram.data[..], b"abc");
        assert_eq!(datagram.from, peer.local_addr().ok());

        receiver.stop();
        assert_eq!(receiver.stats().packets_received.load(Ordering::Relaxed), 1);
    }
}
