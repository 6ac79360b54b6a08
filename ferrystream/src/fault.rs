//! Deliberate packet perturbation for exercising loss recovery.
//!
//! The injector decorates the sender's transmit path. Each sequence is
//! perturbed at most once: once a sequence has been dropped or corrupted,
//! every later transmission of it goes out clean, so Go-Back-N recovery
//! always converges.

use std::collections::{BTreeSet, HashSet};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Wire offset XOR-flipped when corrupting a DATA packet (byte 10 of the
/// payload). Packets too short to reach it are sent unmodified.
const CORRUPT_OFFSET: usize = 21;

/// Which sequences to perturb, and how.
#[derive(Debug, Clone)]
pub enum FaultPlan {
    /// Perturb exactly the listed sequences.
    Exact {
        drop: BTreeSet<u32>,
        corrupt: BTreeSet<u32>,
    },
    /// Perturb transmissions with the given probabilities. Rates outside
    /// [0, 1] are clamped.
    Random { drop_rate: f64, corrupt_rate: f64 },
}

impl FaultPlan {
    /// Plan that drops exactly the given sequences.
    pub fn drop_seqs<I: IntoIterator<Item = u32>>(seqs: I) -> Self {
        FaultPlan::Exact {
            drop: seqs.into_iter().collect(),
            corrupt: BTreeSet::new(),
        }
    }

    /// Plan that corrupts exactly the given sequences.
    pub fn corrupt_seqs<I: IntoIterator<Item = u32>>(seqs: I) -> Self {
        FaultPlan::Exact {
            drop: BTreeSet::new(),
            corrupt: seqs.into_iter().collect(),
        }
    }
}

/// What to do with one transmission of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Transmit unmodified.
    Pass,
    /// Do not transmit at all.
    Drop,
    /// Transmit with one payload byte flipped.
    Corrupt,
}

/// Stateful injector applying a [`FaultPlan`] to outgoing DATA packets.
pub struct FaultInjector {
    plan: FaultPlan,
    /// Sequences already perturbed once; these always pass from now on.
    errored: HashSet<u32>,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            errored: HashSet::new(),
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Deterministic injector for tests.
    pub fn with_seed(plan: FaultPlan, seed: u64) -> Self {
        Self {
            plan,
            errored: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decide the fate of the next transmission of `seq`.
    pub fn decide(&mut self, seq: u32) -> FaultAction {
        if self.errored.contains(&seq) {
            return FaultAction::Pass;
        }

        let action = match &self.plan {
            FaultPlan::Exact { drop, corrupt } => {
                if drop.contains(&seq) {
                    FaultAction::Drop
                } else if corrupt.contains(&seq) {
                    FaultAction::Corrupt
                } else {
                    FaultAction::Pass
                }
            }
            FaultPlan::Random {
                drop_rate,
                corrupt_rate,
            } => {
                if self.rng.random_bool(drop_rate.clamp(0.0, 1.0)) {
                    FaultAction::Drop
                } else if self.rng.random_bool(corrupt_rate.clamp(0.0, 1.0)) {
                    FaultAction::Corrupt
                } else {
                    FaultAction::Pass
                }
            }
        };

        if action != FaultAction::Pass {
            self.errored.insert(seq);
        }
        action
    }
}

/// Flip one payload byte in an encoded DATA packet so its checksum no
/// longer matches.
pub fn corrupt_wire(wire: &mut [u8]) {
    if wire.len() > CORRUPT_OFFSET {
        wire[CORRUPT_OFFSET] ^= 0xFF;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    use crate::packet::{Decoded, Packet};

    #[test]
    fn exact_plan_picks_listed_sequences() {
        let plan = FaultPlan::Exact {
            drop: [4].into_iter().collect(),
            corrupt: [2].into_iter().collect(),
        };
        let mut inj = FaultInjector::with_seed(plan, 0);

        assert_eq!(inj.decide(0), FaultAction::Pass);
        assert_eq!(inj.decide(2), FaultAction::Corrupt);
        assert_eq!(inj.decide(4), FaultAction::Drop);
    }

    #[test]
    fn each_sequence_perturbed_at_most_once() {
        let mut inj = FaultInjector::with_seed(FaultPlan::drop_seqs([1]), 0);
        assert_eq!(inj.decide(1), FaultAction::Drop);
        // Retransmission of the same sequence goes clean.
        assert_eq!(inj.decide(1), FaultAction::Pass);
        assert_eq!(inj.decide(1), FaultAction::Pass);
    }

    #[test]
    fn certain_drop_rate_drops_first_transmission() {
        let plan = FaultPlan::Random {
            drop_rate: 1.0,
            corrupt_rate: 0.0,
        };
        let mut inj = FaultInjector::with_seed(plan, 7);
        assert_eq!(inj.decide(0), FaultAction::Drop);
        assert_eq!(inj.decide(0), FaultAction::Pass);
    }

    #[test]
    fn corrupt_wire_breaks_checksum() {
        let packet = Packet::Data {
            seq: 3,
            payload: Bytes::from(vec![0x11u8; 64]),
        };
        let mut wire = packet.encode().to_vec();
        corrupt_wire(&mut wire);

        match Packet::decode(&wire).unwrap() {
            Decoded::Corrupt => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn short_packet_is_left_intact() {
        let packet = Packet::Data {
            seq: 0,
            payload: Bytes::from_static(b"tiny"),
        };
        let mut wire = packet.encode().to_vec();
        let before = wire.clone();
        corrupt_wire(&mut wire);
        assert_eq!(wire, before);
    }
}
