//! Connection management: handshake and teardown.
//!
//! Ferry establishes a session with a two-packet exchange: the initiator
//! sends SYN and waits for SYN-ACK; the acceptor waits for SYN and replies.
//! Teardown is symmetric with FIN / FIN-ACK. Neither exchange retransmits:
//! a lost handshake packet leaves the waiting side blocked.

use std::net::SocketAddr;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{FerryError, Result};
use crate::packet::{Decoded, Packet, PacketType};

/// A per-peer session over the datagram endpoint.
///
/// `connected == true` implies a latched peer address. The peer is set on
/// a successful connect/accept and cleared again by teardown.
pub struct Session {
    pub(crate) endpoint: Endpoint,
    bound: bool,
    connected: bool,
    peer: Option<SocketAddr>,
}

impl Session {
    /// Bind to `addr` and prepare to accept a connection (receiver side).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::bind(addr).await?,
            bound: true,
            connected: false,
            peer: None,
        })
    }

    /// Open a session on an OS-assigned port (initiator side).
    pub async fn open() -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::ephemeral().await?,
            bound: false,
            connected: false,
            peer: None,
        })
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// The peer latched by the last successful connect/accept.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns whether a connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Establish a connection to `addr`: send SYN, await SYN-ACK.
    ///
    /// Blocks indefinitely if the SYN or the reply is lost.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.endpoint.send_to(&Packet::Syn.encode(), addr).await?;

        let (data, from) = self.endpoint.recv_from().await?;
        match Packet::decode(&data)? {
            Decoded::Valid(Packet::SynAck) => {
                self.connected = true;
                self.peer = Some(from);
                debug!(peer = %from, "connection established");
                Ok(())
            }
            other => Err(FerryError::UnexpectedPacket {
                expected: PacketType::SynAck,
                got: other.packet_type(),
            }),
        }
    }

    /// Await a SYN and reply with SYN-ACK. Returns the peer address.
    pub async fn accept(&mut self) -> Result<SocketAddr> {
        if !self.bound {
            return Err(FerryError::NotBound);
        }

        let (data, from) = self.endpoint.recv_from().await?;
        match Packet::decode(&data)? {
            Decoded::Valid(Packet::Syn) => {
                self.endpoint.send_to(&Packet::SynAck.encode(), from).await?;
                self.connected = true;
                self.peer = Some(from);
                debug!(peer = %from, "connection accepted");
                Ok(from)
            }
            other => Err(FerryError::UnexpectedPacket {
                expected: PacketType::Syn,
                got: other.packet_type(),
            }),
        }
    }

    /// Close the connection: send FIN, await FIN-ACK. No-op when not
    /// connected.
    ///
    /// Stale data-path packets still in flight (duplicate ACKs, late DATA)
    /// are discarded while waiting for the FIN-ACK.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(peer) = self.peer.filter(|_| self.connected) else {
            return Ok(());
        };

        self.endpoint.send_to(&Packet::Fin.encode(), peer).await?;

        self.await_teardown_packet(peer, PacketType::FinAck).await?;
        self.connected = false;
        self.peer = None;
        debug!(peer = %peer, "connection closed");
        Ok(())
    }

    /// Await the peer's FIN and acknowledge it. No-op when not connected.
    ///
    /// Stale data-path packets still in flight are discarded while waiting.
    pub async fn handle_disconnect(&mut self) -> Result<()> {
        let Some(peer) = self.peer.filter(|_| self.connected) else {
            return Ok(());
        };

        self.await_teardown_packet(peer, PacketType::Fin).await?;
        self.endpoint.send_to(&Packet::FinAck.encode(), peer).await?;
        self.connected = false;
        self.peer = None;
        debug!(peer = %peer, "peer disconnected");
        Ok(())
    }

    /// Block until a packet of `expected` type arrives from `peer`.
    ///
    /// Datagrams from other addresses and leftover data-path traffic
    /// (DATA, ACK, EOF, corrupt or undecodable datagrams) are skipped;
    /// another lifecycle packet is a protocol violation.
    async fn await_teardown_packet(
        &mut self,
        peer: SocketAddr,
        expected: PacketType,
    ) -> Result<()> {
        loop {
            let (data, from) = self.endpoint.recv_from().await?;
            if from != peer {
                continue;
            }
            match Packet::decode(&data) {
                Ok(Decoded::Valid(packet)) if packet.packet_type() == expected => {
                    return Ok(());
                }
                Ok(Decoded::Valid(
                    Packet::Data { .. } | Packet::Ack { .. } | Packet::Eof,
                ))
                | Ok(Decoded::Corrupt)
                | Err(_) => continue,
                Ok(other) => {
                    return Err(FerryError::UnexpectedPacket {
                        expected,
                        got: other.packet_type(),
                    });
                }
            }
        }
    }

    /// Release the socket. Any receive the peer is blocked on will fail.
    pub fn close(self) {
        self.endpoint.close();
    }

    /// The latched peer, or `NotConnected` before a handshake completes.
    pub(crate) fn require_peer(&self) -> Result<SocketAddr> {
        if !self.connected {
            return Err(FerryError::NotConnected);
        }
        self.peer.ok_or(FerryError::NotConnected)
    }
}
