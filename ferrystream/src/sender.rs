//! Sliding-window sender engine.
//!
//! Go-Back-N transmission with TCP-style congestion control: slow start,
//! congestion avoidance, fast retransmit on the third duplicate ACK and a
//! window collapse on timeout. On any loss signal `next_seq` rewinds to
//! `send_base` and the whole outstanding window is retransmitted.
//!
//! [`SenderState`] is the pure state machine; [`send_file`] drives it over a
//! connected [`Session`], alternating between bursting DATA packets into the
//! effective window and a bounded wait for one ACK.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::chunk;
use crate::congestion::CongestionWindow;
use crate::error::{FerryError, Result};
use crate::fault::{self, FaultAction, FaultInjector};
use crate::packet::{Decoded, Packet, ACK_NONE, RECV_WINDOW_SIZE};
use crate::session::Session;

/// How long the sender waits for an ACK before retransmitting.
pub const RETRANS_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of duplicate ACKs that triggers a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// How an incoming ACK affected the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The send base advanced.
    Advanced,
    /// Duplicate below the fast-retransmit threshold.
    Duplicate,
    /// Third duplicate: the outstanding window will be retransmitted.
    FastRetransmit,
    /// Stale or sentinel ACK, no effect.
    Ignored,
}

/// Pure sliding-window sender state.
///
/// Invariant: `send_base <= next_seq <= send_base + effective_window`, and
/// `send_base` never decreases.
#[derive(Debug)]
pub struct SenderState {
    /// Oldest unacknowledged sequence.
    send_base: u32,
    /// Next sequence to transmit.
    next_seq: u32,
    /// Total number of chunks in the transfer.
    total: u32,
    window: CongestionWindow,
    dup_acks: u32,
    /// Highest cumulative ACK seen; `None` until the first real ACK. The
    /// wire sentinel [`ACK_NONE`] never lands here.
    last_ack: Option<u32>,
}

impl SenderState {
    pub fn new(total: u32) -> Self {
        Self {
            send_base: 0,
            next_seq: 0,
            total,
            window: CongestionWindow::new(),
            dup_acks: 0,
            last_ack: None,
        }
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window(&self) -> &CongestionWindow {
        &self.window
    }

    /// Returns whether every chunk has been acknowledged.
    pub fn done(&self) -> bool {
        self.send_base >= self.total
    }

    /// `min(⌊cwnd⌋, RECV_WINDOW_SIZE)` in chunks.
    pub fn effective_window(&self) -> u32 {
        self.window.floor().min(RECV_WINDOW_SIZE)
    }

    /// Next sequence eligible for transmission, if the window has room.
    pub fn next_to_send(&mut self) -> Option<u32> {
        if self.next_seq < self.total && self.next_seq < self.send_base + self.effective_window()
        {
            let seq = self.next_seq;
            self.next_seq += 1;
            Some(seq)
        } else {
            None
        }
    }

    /// Classify a cumulative ACK from the wire and update the window.
    pub fn on_ack(&mut self, raw: u32) -> AckOutcome {
        // The sentinel says the receiver has delivered nothing; recovery is
        // driven by the timeout, not by rewinding on it.
        if raw == ACK_NONE {
            return AckOutcome::Ignored;
        }

        let is_new = raw >= self.send_base && self.last_ack.map_or(true, |last| raw > last);
        if is_new {
            self.send_base = raw + 1;
            self.dup_acks = 0;
            self.last_ack = Some(raw);
            self.window.on_new_ack();
            AckOutcome::Advanced
        } else if self.last_ack == Some(raw) {
            self.dup_acks += 1;
            if self.dup_acks == DUP_ACK_THRESHOLD {
                self.window.on_fast_retransmit();
                self.next_seq = self.send_base;
                AckOutcome::FastRetransmit
            } else {
                AckOutcome::Duplicate
            }
        } else {
            AckOutcome::Ignored
        }
    }

    /// Rewind to the send base after the receive deadline elapsed.
    pub fn on_timeout(&mut self) {
        self.window.on_timeout();
        self.dup_acks = 0;
        self.next_seq = self.send_base;
    }
}

/// Counters for one transfer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// DATA datagrams actually handed to the socket.
    pub packets_sent: u64,
    /// DATA datagrams sent with a flipped payload byte.
    pub packets_corrupted: u64,
    /// DATA datagrams suppressed entirely.
    pub packets_dropped: u64,
    /// Loss-recovery events (fast retransmits plus timeouts).
    pub retransmissions: u64,
}

/// Send the file at `path` over the connected session.
pub async fn send_file(session: &mut Session, path: &Path) -> Result<TransferStats> {
    transfer(session, path, None).await
}

/// Send the file at `path`, perturbing transmissions per `faults` (each
/// sequence is perturbed at most once).
pub async fn send_file_with_faults(
    session: &mut Session,
    path: &Path,
    faults: FaultInjector,
) -> Result<TransferStats> {
    transfer(session, path, Some(faults)).await
}

async fn transfer(
    session: &mut Session,
    path: &Path,
    mut faults: Option<FaultInjector>,
) -> Result<TransferStats> {
    let peer = session.require_peer()?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FerryError::InvalidFilename(path.display().to_string()))?
        .to_owned();
    let chunks = chunk::read_chunks(path).await?;
    let filesize: u64 = chunks.iter().map(|c| c.len() as u64).sum();
    let total = chunks.len() as u32;

    // Metadata goes out exactly once; it is not part of the reliable
    // sequence.
    let metadata = Packet::Metadata {
        filename: filename.clone(),
        filesize,
    };
    session.endpoint.send_to(&metadata.encode(), peer).await?;

    debug!(file = %filename, filesize, total_chunks = total, "starting transfer");

    let mut state = SenderState::new(total);
    let mut stats = TransferStats::default();

    session.endpoint.set_timeout(Some(RETRANS_TIMEOUT));

    while !state.done() {
        // Burst DATA packets up to the effective window.
        while let Some(seq) = state.next_to_send() {
            let action = faults.as_mut().map_or(FaultAction::Pass, |f| f.decide(seq));
            let packet = Packet::Data {
                seq,
                payload: chunks[seq as usize].clone(),
            };
            match action {
                FaultAction::Drop => {
                    stats.packets_dropped += 1;
                    debug!(seq, "fault injection: dropped");
                }
                FaultAction::Corrupt => {
                    let mut wire = packet.encode().to_vec();
                    fault::corrupt_wire(&mut wire);
                    session.endpoint.send_to(&wire, peer).await?;
                    stats.packets_sent += 1;
                    stats.packets_corrupted += 1;
                    debug!(seq, "fault injection: corrupted");
                }
                FaultAction::Pass => {
                    session.endpoint.send_to(&packet.encode(), peer).await?;
                    stats.packets_sent += 1;
                }
            }
        }

        // Wait for one ACK within the retransmission deadline.
        match session.endpoint.recv_from().await {
            Ok((data, from)) => {
                if from != peer {
                    continue;
                }
                if let Ok(Decoded::Valid(Packet::Ack { ack })) = Packet::decode(&data) {
                    match state.on_ack(ack) {
                        AckOutcome::FastRetransmit => {
                            stats.retransmissions += 1;
                            debug!(send_base = state.send_base(), "fast retransmit");
                        }
                        AckOutcome::Advanced
                        | AckOutcome::Duplicate
                        | AckOutcome::Ignored => {}
                    }
                }
            }
            Err(FerryError::Timeout) => {
                state.on_timeout();
                stats.retransmissions += 1;
                debug!(send_base = state.send_base(), "timeout, retransmitting");
            }
            Err(e) => return Err(e),
        }
    }

    session.endpoint.set_timeout(None);
    session.endpoint.send_to(&Packet::Eof.encode(), peer).await?;

    debug!(
        sent = stats.packets_sent,
        retransmissions = stats.retransmissions,
        "transfer complete"
    );
    Ok(stats)
}
