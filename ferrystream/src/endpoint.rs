//! Datagram endpoint -- thin wrapper over an unreliable UDP socket.
//!
//! Owns the receive buffer and the optional receive deadline. A deadline of
//! `None` blocks indefinitely; an elapsed deadline surfaces as
//! [`FerryError::Timeout`] so callers can drive retransmission from it.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::error::{FerryError, Result};

/// Size of the buffer handed to the kernel on every receive.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// An endpoint on the unreliable datagram service.
pub struct Endpoint {
    socket: UdpSocket,
    /// Deadline applied to `recv_from`; `None` blocks indefinitely.
    timeout: Option<Duration>,
    /// Reusable receive buffer.
    buf: Vec<u8>,
}

impl Endpoint {
    /// Bind to a concrete local address (acceptor side).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            timeout: None,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Bind to an OS-assigned port (initiator side).
    pub async fn ephemeral() -> Result<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket.send_to(data, addr).await?;
        Ok(())
    }

    /// Receive one datagram, honoring the configured deadline.
    pub async fn recv_from(&mut self) -> Result<(Bytes, SocketAddr)> {
        match self.timeout {
            None => {
                let (n, addr) = self.socket.recv_from(&mut self.buf).await?;
                Ok((Bytes::copy_from_slice(&self.buf[..n]), addr))
            }
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.socket.recv_from(&mut self.buf)).await {
                    Ok(recv) => {
                        let (n, addr) = recv?;
                        Ok((Bytes::copy_from_slice(&self.buf[..n]), addr))
                    }
                    Err(_) => Err(FerryError::Timeout),
                }
            }
        }
    }

    /// Set the receive deadline; `None` restores indefinite blocking.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Release the underlying socket. Dropping the endpoint has the same
    /// effect; this exists for callers that want the release to be explicit.
    pub fn close(self) {}
}
