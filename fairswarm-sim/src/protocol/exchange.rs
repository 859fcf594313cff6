//! Gossip of known peers between two peers.

use fairswarm_core::PeerId;
use tracing::trace;

use crate::registry::PeerRegistry;
use crate::rng::DeterministicRng;

/// Most peers learned from a single exchange.
pub const MAX_PEERS_PER_EXCHANGE: usize = 50;

/// Copies known peers from a random known peer and registers with it.
///
/// A peer at its known-peer capacity does nothing. A peer that knows nobody
/// learns the initial source and queries it. New peers become usable from
/// `first_use_round`. Returns the number of new relationships on both sides.
pub fn exchange_peers(
    registry: &mut PeerRegistry,
    peer: PeerId,
    first_use_round: u32,
    rng: &mut DeterministicRng,
) -> u32 {
    let partner = {
        let Some(this) = registry.get_mut(peer) else {
            return 0;
        };
        if this.known_peers.len() >= this.known_peers_max as usize {
            return 0;
        }

        if this.known_peers.is_empty() {
            this.add_known_peer(PeerId::INITIAL_SOURCE, first_use_round);
            PeerId::INITIAL_SOURCE
        } else {
            let index = rng.random_index(this.known_peers.len());
            match this.known_peers.nth_key(index) {
                Some(partner) => partner,
                None => return 0,
            }
        }
    };

    let Some((this, other)) = registry.pair_mut(peer, partner) else {
        return 0;
    };

    let mut created = 0;
    let mut learned = 0;
    for candidate in other.known_peers.keys() {
        if learned >= MAX_PEERS_PER_EXCHANGE {
            break;
        }
        if this.add_known_peer(candidate, first_use_round) {
            learned += 1;
        }
    }
    created += learned as u32;

    if other.add_known_peer(peer, first_use_round) {
        created += 1;
    }

    trace!("{} <> {} exchange, {} new", peer, partner, created);
    created
}

#[cfg(test)]
mod tests {
    use fairswarm_core::Strategy;

    use super::*;
    use crate::protocol::fixtures::{introduce, registry};

    const SOURCE: PeerId = PeerId::INITIAL_SOURCE;

    #[test]
    fn test_lonely_peer_learns_source() {
        let mut peers = registry(Strategy::Random, 2, 3);
        let mut rng = DeterministicRng::from_seed(1);
        introduce(&mut peers, 1, 3);

        let created = exchange_peers(&mut peers, PeerId::new(2), 5, &mut rng);

        // Peer 3 copied here, this peer registered on the source
        assert_eq!(created, 2);
        let peer = peers.get(PeerId::new(2)).unwrap();
        assert_eq!(peer.known_peers().collect::<Vec<_>>(), vec![SOURCE, PeerId::new(3)]);
        assert!(peers.get(SOURCE).unwrap().knows(PeerId::new(2)));
    }

    #[test]
    fn test_full_peer_skips_exchange() {
        let mut peers = registry(Strategy::Random, 2, 10);
        let mut rng = DeterministicRng::from_seed(1);
        for other in 3..=10 {
            introduce(&mut peers, 2, other);
        }

        assert_eq!(exchange_peers(&mut peers, PeerId::new(2), 2, &mut rng), 0);
        assert!(!peers.get(PeerId::new(3)).unwrap().knows(PeerId::new(2)));
    }

    #[test]
    fn test_exchange_skips_self_and_duplicates() {
        let mut peers = registry(Strategy::Random, 2, 4);
        let mut rng = DeterministicRng::from_seed(3);
        introduce(&mut peers, 2, 3);
        introduce(&mut peers, 3, 2);
        introduce(&mut peers, 3, 4);
        introduce(&mut peers, 3, 5);

        let created = exchange_peers(&mut peers, PeerId::new(2), 2, &mut rng);

        assert_eq!(created, 2);
        let peer = peers.get(PeerId::new(2)).unwrap();
        assert_eq!(
            peer.known_peers().collect::<Vec<_>>(),
            vec![PeerId::new(3), PeerId::new(4), PeerId::new(5)]
        );
    }

    #[test]
    fn test_source_without_peers_gains_nothing() {
        let mut peers = registry(Strategy::Random, 2, 1);
        let mut rng = DeterministicRng::from_seed(1);
        assert_eq!(exchange_peers(&mut peers, SOURCE, 2, &mut rng), 0);
        assert_eq!(peers.get(SOURCE).unwrap().known_peer_count(), 0);
    }

    #[test]
    fn test_copy_limit() {
        let mut peers = registry(Strategy::Random, 2, 70);
        let mut rng = DeterministicRng::from_seed(1);
        for serial in [1, 2] {
            peers.get_mut(PeerId::new(serial)).unwrap().known_peers_max = 100;
        }
        for other in 3..=71 {
            introduce(&mut peers, 1, other);
        }

        let created = exchange_peers(&mut peers, PeerId::new(2), 2, &mut rng);

        assert_eq!(created, MAX_PEERS_PER_EXCHANGE as u32 + 1);
        // The source itself plus the copied peers
        assert_eq!(
            peers.get(PeerId::new(2)).unwrap().known_peer_count(),
            MAX_PEERS_PER_EXCHANGE + 1
        );
    }
}
