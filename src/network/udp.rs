//! UDP socket setup

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

/// Largest payload a UDP/IPv4 datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Blocking receive timeout, bounds how long a receive thread takes to notice shutdown
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Create a bound UDP socket with an enlarged receive buffer
pub fn create_socket(bind: SocketAddr, recv_buffer_bytes: usize) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if recv_buffer_bytes > 0 {
        if let Err(e) = socket.set_recv_buffer_size(recv_buffer_bytes) {
            tracing::warn!("Could not set receive buffer to {} bytes: {}", recv_buffer_bytes, e);
        }
    }

    socket
        .bind(&bind.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind, e)))?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    tracing::debug!("UDP socket bound to {:?}", socket.local_addr().ok());
    Ok(socket)
}
