//! Ferry -- reliable, ordered file transfer over UDP.
//!
//! A connection-oriented transfer protocol on an unreliable datagram
//! service: a Go-Back-N sliding window with slow start, congestion
//! avoidance, fast retransmit and timeout recovery on the sending side;
//! cumulative ACKs with an out-of-order reassembly buffer and additive
//! checksum validation on the receiving side; SYN/SYN-ACK connect and
//! FIN/FIN-ACK teardown bracketing the transfer.

pub mod chunk;
pub mod congestion;
pub mod endpoint;
pub mod error;
pub mod fault;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;

// Re-export key public types at crate root.
pub use error::{FerryError, Result};
pub use fault::{FaultInjector, FaultPlan};
pub use packet::{Packet, PacketType};
pub use receiver::{receive_file, ReceiverState};
pub use sender::{send_file, send_file_with_faults, SenderState, TransferStats};
pub use session::Session;
