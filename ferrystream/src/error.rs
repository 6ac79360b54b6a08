use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::packet::PacketType;

/// All errors produced by the Ferry transport layer.
#[derive(Debug, Error)]
pub enum FerryError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("unexpected {got} packet, expected {expected}")]
    UnexpectedPacket { expected: PacketType, got: PacketType },

    #[error("datagram from unexpected peer {0}")]
    PeerMismatch(SocketAddr),

    #[error("session is not connected")]
    NotConnected,

    #[error("socket is not bound")]
    NotBound,

    #[error("source file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("receive deadline elapsed")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FerryError>;
