//! Invariant checking framework for swarm validation.
//!
//! Invariants are checked against the peer registry after every round.

use std::fmt;

use crate::registry::PeerRegistry;

/// Violation of a swarm invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Round after which the violation was observed
    pub round: u32,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated in round {}: {}",
            self.invariant, self.round, self.description
        )
    }
}

/// Trait for checking swarm invariants.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for the registry at the end of `round`.
    ///
    /// # Errors
    /// Returns `InvariantViolation` describing the first offending peer.
    fn check(&self, registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant.
    fn violation(&self, round: u32, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            round,
        }
    }
}

/// Ensures no peer holds more pending downloads than its cap.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingCapacityInvariant;

impl Invariant for PendingCapacityInvariant {
    fn check(&self, registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation> {
        for peer in registry.iter() {
            if peer.down_pending_count() > peer.down_pending_max() as usize {
                return Err(self.violation(
                    round,
                    format!(
                        "{} has {} pending downloads, cap {}",
                        peer.id(),
                        peer.down_pending_count(),
                        peer.down_pending_max()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "PendingCapacity"
    }
}

/// Ensures free peers are known peers without an outstanding request.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreePeersSubsetInvariant;

impl Invariant for FreePeersSubsetInvariant {
    fn check(&self, registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation> {
        for peer in registry.iter() {
            for free in peer.free_peers() {
                if !peer.knows(free) {
                    return Err(self.violation(
                        round,
                        format!("{} lists unknown peer {} as free", peer.id(), free),
                    ));
                }
                if peer.has_pending_download_from(free) {
                    return Err(self.violation(
                        round,
                        format!("{} lists {} as free while waiting on it", peer.id(), free),
                    ));
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "FreePeersSubset"
    }
}

/// Ensures seeders neither wait on downloads nor queue peers for requests.
///
/// The grant queue is not checked: seeders keep serving requests queued
/// before and after completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeederQuiescenceInvariant;

impl Invariant for SeederQuiescenceInvariant {
    fn check(&self, registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation> {
        for peer in registry.iter().filter(|peer| peer.is_seeder()) {
            if peer.down_pending_count() > 0 {
                return Err(self.violation(
                    round,
                    format!(
                        "seeder {} still waits on {} downloads",
                        peer.id(),
                        peer.down_pending_count()
                    ),
                ));
            }
            if peer.free_peers().next().is_some() {
                return Err(self.violation(
                    round,
                    format!("seeder {} still has free peers", peer.id()),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SeederQuiescence"
    }
}

/// Ensures every rarity ordering is a bijection onto the piece positions.
#[derive(Debug, Clone, Copy)]
pub struct PermutationInvariant {
    piece_count: u32,
}

impl PermutationInvariant {
    /// Creates invariant for orderings over `piece_count` pieces.
    pub fn new(piece_count: u32) -> Self {
        Self { piece_count }
    }
}

impl Invariant for PermutationInvariant {
    fn check(&self, registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation> {
        for peer in registry.iter() {
            let Some(ranking) = peer.ranking() else {
                continue;
            };
            if ranking.len() != self.piece_count as usize || !ranking.is_valid() {
                return Err(self.violation(
                    round,
                    format!("{} has an invalid rarity ordering {:?}", peer.id(), ranking.weights()),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Permutation"
    }
}

#[cfg(test)]
mod tests {
    use fairswarm_core::{PeerId, PieceIndex, Strategy};

    use super::*;
    use crate::permutation::PiecePermutation;
    use crate::protocol::fixtures::{introduce, registry};
    use crate::request::{PendingRequest, RequestedPiece};

    #[test]
    fn test_fresh_registry_satisfies_everything() {
        let mut peers = registry(Strategy::FairE9, 4, 3);
        introduce(&mut peers, 2, 3);

        assert!(PendingCapacityInvariant.check(&peers, 1).is_ok());
        assert!(FreePeersSubsetInvariant.check(&peers, 1).is_ok());
        assert!(SeederQuiescenceInvariant.check(&peers, 1).is_ok());
        assert!(PermutationInvariant::new(4).check(&peers, 1).is_ok());
    }

    #[test]
    fn test_pending_capacity_violation() {
        let mut peers = registry(Strategy::Random, 4, 2);
        let peer = peers.get_mut(PeerId::new(2)).unwrap();
        peer.down_pending_max = 0;
        peer.down_pending.insert(PeerId::new(3), PendingRequest::new(RequestedPiece::Any, 1));

        let violation = PendingCapacityInvariant.check(&peers, 7).unwrap_err();
        assert_eq!(violation.invariant, "PendingCapacity");
        assert_eq!(violation.round, 7);
        assert!(violation.to_string().contains("n2"));
    }

    #[test]
    fn test_free_peer_must_be_known() {
        let mut peers = registry(Strategy::Random, 4, 2);
        peers.get_mut(PeerId::new(2)).unwrap().free_peers.push_back(PeerId::new(3));
        assert!(FreePeersSubsetInvariant.check(&peers, 1).is_err());
    }

    #[test]
    fn test_seeder_with_free_peers_is_flagged() {
        let mut peers = registry(Strategy::Random, 1, 2);
        let peer = peers.get_mut(PeerId::new(2)).unwrap();
        peer.receive_piece(PeerId::INITIAL_SOURCE, PieceIndex::new(1), 1, 1, false);
        assert!(SeederQuiescenceInvariant.check(&peers, 1).is_ok());

        peers.get_mut(PeerId::new(2)).unwrap().free_peers.push_back(PeerId::new(3));
        let violation = SeederQuiescenceInvariant.check(&peers, 1).unwrap_err();
        assert!(violation.description.contains("free peers"));
    }

    #[test]
    fn test_wrong_sized_ordering_is_flagged() {
        let mut peers = registry(Strategy::FairE9, 3, 1);
        peers.get_mut(PeerId::new(2)).unwrap().ranking = PiecePermutation::from_weights(vec![2, 1]);
        assert!(PermutationInvariant::new(3).check(&peers, 1).is_err());
    }
}
