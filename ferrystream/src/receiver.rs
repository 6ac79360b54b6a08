//! Cumulative-ACK receiver engine.
//!
//! In-order delivery with an out-of-order reassembly buffer: arriving DATA
//! is held in a `BTreeMap` until the next expected sequence shows up, then
//! the contiguous prefix drains into the delivered list. Every DATA packet
//! (including corrupt ones) is answered with the cumulative ACK of the last
//! in-order sequence delivered, or the sentinel when nothing has been.
//!
//! [`ReceiverState`] is the pure state machine; [`receive_file`] drives it
//! over a connected [`Session`] until EOF, then writes the file out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::chunk;
use crate::error::{FerryError, Result};
use crate::packet::{Decoded, Packet, PacketType, ACK_NONE, RECV_WINDOW_SIZE};
use crate::session::Session;

/// Pure receiver state.
///
/// Invariants: every buffered key is strictly greater than `expected`, and
/// `expected` never decreases.
#[derive(Debug, Default)]
pub struct ReceiverState {
    /// Next in-order sequence awaited.
    expected: u32,
    /// Out-of-order holdovers awaiting the contiguous prefix.
    window: BTreeMap<u32, Bytes>,
    /// Chunks delivered in order, tagged with their sequence.
    delivered: Vec<(u32, Bytes)>,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next in-order sequence awaited.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Number of out-of-order chunks currently held.
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Cumulative ACK value: the highest in-order sequence delivered, or
    /// [`ACK_NONE`] when nothing has been.
    pub fn ack_value(&self) -> u32 {
        if self.expected == 0 {
            ACK_NONE
        } else {
            self.expected - 1
        }
    }

    /// Accept a DATA packet; returns the cumulative ACK to emit.
    ///
    /// Sequences below `expected` are duplicates of already-delivered data
    /// and sequences at or past the advertised window are refused; both
    /// still elicit the current ACK so the sender can resynchronize.
    pub fn on_data(&mut self, seq: u32, payload: Bytes) -> u32 {
        if seq >= self.expected && seq < self.expected + RECV_WINDOW_SIZE {
            self.window.entry(seq).or_insert(payload);
            while let Some(data) = self.window.remove(&self.expected) {
                self.delivered.push((self.expected, data));
                self.expected += 1;
            }
        }
        self.ack_value()
    }

    /// A DATA packet failed validation; re-ACK the last good sequence.
    pub fn on_corrupt(&self) -> u32 {
        self.ack_value()
    }

    /// Consume the state, returning delivered chunks in sequence order.
    pub fn into_chunks(mut self) -> Vec<Bytes> {
        // Delivery is ascending by construction; the sort is a guard.
        self.delivered.sort_by_key(|(seq, _)| *seq);
        self.delivered.into_iter().map(|(_, data)| data).collect()
    }
}

/// Receive one file over the connected session into `output_dir`.
///
/// Returns the path of the written file. The directory is created if
/// absent; the file is named by the basename carried in METADATA.
pub async fn receive_file(session: &mut Session, output_dir: &Path) -> Result<PathBuf> {
    let peer = session.require_peer()?;

    tokio::fs::create_dir_all(output_dir).await?;

    // The transfer opens with exactly one METADATA packet from the peer.
    let (data, from) = session.endpoint.recv_from().await?;
    if from != peer {
        return Err(FerryError::PeerMismatch(from));
    }
    let (filename, filesize) = match Packet::decode(&data)? {
        Decoded::Valid(Packet::Metadata { filename, filesize }) => (filename, filesize),
        other => {
            return Err(FerryError::UnexpectedPacket {
                expected: PacketType::Metadata,
                got: other.packet_type(),
            });
        }
    };

    let basename = Path::new(&filename)
        .file_name()
        .map(|n| n.to_owned())
        .ok_or_else(|| FerryError::InvalidFilename(filename.clone()))?;
    let output_path = output_dir.join(basename);

    debug!(file = %filename, filesize, "receiving");

    let mut state = ReceiverState::new();
    loop {
        let (data, from) = session.endpoint.recv_from().await?;
        if from != peer {
            continue;
        }
        match Packet::decode(&data) {
            Ok(Decoded::Valid(Packet::Eof)) => break,
            Ok(Decoded::Valid(Packet::Data { seq, payload })) => {
                let ack = state.on_data(seq, payload);
                session
                    .endpoint
                    .send_to(&Packet::Ack { ack }.encode(), peer)
                    .await?;
            }
            Ok(Decoded::Corrupt) => {
                let ack = state.on_corrupt();
                debug!(ack, "corrupt data packet");
                session
                    .endpoint
                    .send_to(&Packet::Ack { ack }.encode(), peer)
                    .await?;
            }
            // Anything else on the data path is a stray; drop it.
            Ok(Decoded::Valid(_)) | Err(_) => continue,
        }
    }

    let chunks = state.into_chunks();
    let received: u64 = chunks.iter().map(|c| c.len() as u64).sum();
    if received != filesize {
        warn!(expected = filesize, received, "filesize differs from metadata");
    }
    chunk::write_chunks(&output_path, &chunks).await?;

    debug!(path = %output_path.display(), bytes = received, "file written");
    Ok(output_path)
}
