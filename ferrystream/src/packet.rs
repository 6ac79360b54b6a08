use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FerryError, Result};

/// Largest DATA payload carried in a single packet.
pub const CHUNK_SIZE: usize = 1024;

/// Fixed receiver window advertised to the sender, in chunks.
pub const RECV_WINDOW_SIZE: u32 = 10;

/// Cumulative-ACK wire value meaning "nothing delivered yet" (−1 as u32).
pub const ACK_NONE: u32 = 0xFFFF_FFFF;

/// DATA header: type(1) + seq(4) + len(2) + checksum(4).
pub const DATA_HEADER_LEN: usize = 11;

/// Packet type identifiers carried in the first wire byte.
///
/// Values 0–1 and 6–7 are connection lifecycle packets, 2–5 are the
/// data path (metadata, payload, acknowledgment, end of transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Syn = 0,
    SynAck = 1,
    Metadata = 2,
    Data = 3,
    Ack = 4,
    Eof = 5,
    Fin = 6,
    FinAck = 7,
}

impl TryFrom<u8> for PacketType {
    type Error = FerryError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Syn),
            1 => Ok(PacketType::SynAck),
            2 => Ok(PacketType::Metadata),
            3 => Ok(PacketType::Data),
            4 => Ok(PacketType::Ack),
            5 => Ok(PacketType::Eof),
            6 => Ok(PacketType::Fin),
            7 => Ok(PacketType::FinAck),
            other => Err(FerryError::UnknownPacketType(other)),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Syn => write!(f, "SYN"),
            PacketType::SynAck => write!(f, "SYN-ACK"),
            PacketType::Metadata => write!(f, "METADATA"),
            PacketType::Data => write!(f, "DATA"),
            PacketType::Ack => write!(f, "ACK"),
            PacketType::Eof => write!(f, "EOF"),
            PacketType::Fin => write!(f, "FIN"),
            PacketType::FinAck => write!(f, "FIN-ACK"),
        }
    }
}

/// Additive checksum over a DATA payload: wrapping u32 sum of the bytes.
pub fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// Ferry wire packet.
///
/// Binary layout (all fields big-endian):
///
/// ```text
/// +-------+----------------------------+
/// | type  |  ... fields per type ...   |
/// | (1B)  |                            |
/// +-------+----------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// SYN: type byte only.
    Syn,
    /// SYN-ACK: type byte only.
    SynAck,
    /// METADATA: filename_len(2) + filename(N, UTF-8) + filesize(8)
    Metadata { filename: String, filesize: u64 },
    /// DATA: seq(4) + data_len(2) + checksum(4) + payload(≤1024)
    Data { seq: u32, payload: Bytes },
    /// ACK: cumulative ack number(4)
    Ack { ack: u32 },
    /// EOF: type byte only.
    Eof,
    /// FIN: type byte only.
    Fin,
    /// FIN-ACK: type byte only.
    FinAck,
}

/// Result of decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A structurally valid packet (DATA checksum verified).
    Valid(Packet),
    /// A DATA packet whose payload failed checksum or length validation.
    /// Must not be delivered; the receiver re-ACKs its last good sequence.
    Corrupt,
}

impl Decoded {
    /// The wire type this datagram declared.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Decoded::Valid(p) => p.packet_type(),
            Decoded::Corrupt => PacketType::Data,
        }
    }
}

impl Packet {
    /// Return the packet type discriminant.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Syn => PacketType::Syn,
            Packet::SynAck => PacketType::SynAck,
            Packet::Metadata { .. } => PacketType::Metadata,
            Packet::Data { .. } => PacketType::Data,
            Packet::Ack { .. } => PacketType::Ack,
            Packet::Eof => PacketType::Eof,
            Packet::Fin => PacketType::Fin,
            Packet::FinAck => PacketType::FinAck,
        }
    }

    /// Encode this packet into a byte buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode into a pre-allocated `BytesMut`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.packet_type() as u8);
        match self {
            Packet::Syn | Packet::SynAck | Packet::Eof | Packet::Fin | Packet::FinAck => {}
            Packet::Metadata { filename, filesize } => {
                buf.put_u16(filename.len() as u16);
                buf.put_slice(filename.as_bytes());
                buf.put_u64(*filesize);
            }
            Packet::Data { seq, payload } => {
                buf.put_u32(*seq);
                buf.put_u16(payload.len() as u16);
                buf.put_u32(checksum(payload));
                buf.put_slice(payload);
            }
            Packet::Ack { ack } => {
                buf.put_u32(*ack);
            }
        }
    }

    /// The total number of bytes this packet will occupy when encoded.
    pub fn encoded_len(&self) -> usize {
        // 1 byte for the type tag in every variant
        1 + match self {
            Packet::Syn | Packet::SynAck | Packet::Eof | Packet::Fin | Packet::FinAck => 0,
            Packet::Metadata { filename, .. } => 2 + filename.len() + 8,
            Packet::Data { payload, .. } => 4 + 2 + 4 + payload.len(),
            Packet::Ack { .. } => 4,
        }
    }

    /// Decode a packet from the given byte buffer.
    ///
    /// DATA packets have their checksum recomputed; a mismatch (or a declared
    /// payload length exceeding the buffer) yields `Decoded::Corrupt` rather
    /// than an error, since the datagram itself parsed.
    pub fn decode(mut data: &[u8]) -> Result<Decoded> {
        if data.is_empty() {
            return Err(FerryError::MalformedPacket {
                expected: 1,
                actual: 0,
            });
        }

        let packet_type = PacketType::try_from(data[0])?;
        data = &data[1..];

        match packet_type {
            PacketType::Syn => Ok(Decoded::Valid(Packet::Syn)),
            PacketType::SynAck => Ok(Decoded::Valid(Packet::SynAck)),
            PacketType::Eof => Ok(Decoded::Valid(Packet::Eof)),
            PacketType::Fin => Ok(Decoded::Valid(Packet::Fin)),
            PacketType::FinAck => Ok(Decoded::Valid(Packet::FinAck)),
            PacketType::Metadata => {
                Self::ensure_len(data, 2)?;
                let filename_len = (&data[0..2]).get_u16() as usize;
                let data = &data[2..];
                Self::ensure_len(data, filename_len + 8)?;
                let filename = std::str::from_utf8(&data[..filename_len])
                    .map_err(|_| {
                        FerryError::InvalidFilename(
                            String::from_utf8_lossy(&data[..filename_len]).into_owned(),
                        )
                    })?
                    .to_owned();
                let filesize = (&data[filename_len..filename_len + 8]).get_u64();
                Ok(Decoded::Valid(Packet::Metadata { filename, filesize }))
            }
            PacketType::Data => {
                Self::ensure_len(data, 10)?; // 4+2+4
                let seq = (&data[0..4]).get_u32();
                let data_len = (&data[4..6]).get_u16() as usize;
                let declared = (&data[6..10]).get_u32();
                let data = &data[10..];
                if data.len() < data_len {
                    return Ok(Decoded::Corrupt);
                }
                let payload = &data[..data_len];
                if checksum(payload) != declared {
                    return Ok(Decoded::Corrupt);
                }
                Ok(Decoded::Valid(Packet::Data {
                    seq,
                    payload: Bytes::copy_from_slice(payload),
                }))
            }
            PacketType::Ack => {
                Self::ensure_len(data, 4)?;
                let ack = (&data[0..4]).get_u32();
                Ok(Decoded::Valid(Packet::Ack { ack }))
            }
        }
    }

    fn ensure_len(data: &[u8], needed: usize) -> Result<()> {
        if data.len() < needed {
            Err(FerryError::MalformedPacket {
                expected: needed,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    }
}
