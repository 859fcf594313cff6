//! Sending and expiring download requests.

use fairswarm_core::PeerId;
use tracing::trace;

use crate::registry::PeerRegistry;
use crate::request::{GrantCandidate, PendingRequest, RequestedPiece};

use super::RoundContext;

/// Expires stale requests, frees the download slots and sends new requests.
///
/// Seeders and unknown peers send nothing. Returns the number of requests
/// the strategy counts for the round report.
pub fn send_requests(
    registry: &mut PeerRegistry,
    requester: PeerId,
    ctx: &mut RoundContext<'_>,
) -> u32 {
    let Some(peer) = registry.get(requester) else {
        return 0;
    };
    if peer.is_seeder() {
        return 0;
    }

    expire_requests(registry, requester, ctx);

    let Some(peer) = registry.get_mut(requester) else {
        return 0;
    };
    peer.down_slots_occupied = 0;
    if peer.down_pending.len() >= peer.down_pending_max as usize {
        return 0;
    }

    let policies = ctx.policies;
    policies.request.fill(registry, requester, ctx)
}

/// Sends one request from `requester` to `target` and registers it remotely.
///
/// `target` leaves the requester's free peers either way. Returns false when
/// either peer is unknown or both are the same peer.
pub(crate) fn issue_request(
    registry: &mut PeerRegistry,
    requester: PeerId,
    target: PeerId,
    piece: RequestedPiece,
    ctx: &mut RoundContext<'_>,
) -> bool {
    let round = ctx.round;
    let policies = ctx.policies;

    let Some((from, to)) = registry.pair_mut(requester, target) else {
        if let Some(peer) = registry.get_mut(requester) {
            peer.take_free_peer(target);
        }
        return false;
    };

    from.take_free_peer(target);
    from.down_pending.insert(target, PendingRequest::new(piece, round));

    let weight = policies.ranking.accept_weight(to, from, piece, round);
    to.accept_request(GrantCandidate::new(requester, piece, weight, round));

    trace!("{} -> {} request ({}) weight {}", requester, target, piece, weight);
    true
}

/// Drops requests that timed out or whose piece arrived from elsewhere.
///
/// The matching grant candidate on the remote side goes too. A timed-out
/// peer is either forgotten for good or queued again as free, depending on
/// the strategy.
fn expire_requests(registry: &mut PeerRegistry, requester: PeerId, ctx: &mut RoundContext<'_>) {
    let round = ctx.round;
    let ttl = ctx.settings.request_ttl;
    let evict = ctx.policies.request.evicts_on_timeout();

    let Some(peer) = registry.get_mut(requester) else {
        return;
    };

    let expired: Vec<(PeerId, bool)> = peer
        .down_pending
        .iter()
        .filter_map(|(target, request)| {
            let timed_out = request.timed_out(round, ttl);
            let satisfied = request
                .piece
                .specific()
                .is_some_and(|piece| peer.has_piece(piece));
            (timed_out || satisfied).then_some((*target, timed_out))
        })
        .collect();
    if expired.is_empty() {
        return;
    }

    for &(target, timed_out) in &expired {
        peer.down_pending.remove(&target);
        if evict && timed_out {
            peer.known_peers.remove(&target);
        } else if !peer.free_peers.contains(&target) {
            peer.free_peers.push_back(target);
        }
    }

    for (target, timed_out) in expired {
        if let Some(remote) = registry.get_mut(target) {
            remote.up_pending.remove(&requester);
        }
        trace!(
            "{} -> {} request expired ({})",
            requester,
            target,
            if timed_out { "timeout" } else { "satisfied" }
        );
    }
}

#[cfg(test)]
mod tests {
    use fairswarm_core::{PieceIndex, Strategy};

    use super::*;
    use crate::protocol::fixtures::{Harness, give, introduce, registry};

    const SOURCE: PeerId = PeerId::INITIAL_SOURCE;

    #[test]
    fn test_wildcard_requests_drain_free_peers_in_order() {
        let mut harness = Harness::new(Strategy::Random, 4);
        let mut peers = registry(Strategy::Random, 4, 6);
        for other in [3, 4, 5, 6, 7] {
            introduce(&mut peers, 2, other);
        }

        let sent = send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));

        // Pending cap is 4
        assert_eq!(sent, 4);
        let peer = peers.get(PeerId::new(2)).unwrap();
        assert_eq!(peer.down_pending_count(), 4);
        assert_eq!(peer.free_peers().collect::<Vec<_>>(), vec![PeerId::new(7)]);
        for other in [3, 4, 5, 6] {
            let remote = peers.get(PeerId::new(other)).unwrap();
            assert!(remote.has_grant_candidate(PeerId::new(2)));
            assert!(remote.knows(PeerId::new(2)));
        }
        assert_eq!(harness.counters.requests_any, 4);
    }

    #[test]
    fn test_seeders_send_nothing() {
        let mut harness = Harness::new(Strategy::Random, 2);
        let mut peers = registry(Strategy::Random, 2, 2);
        introduce(&mut peers, 1, 2);
        assert_eq!(send_requests(&mut peers, SOURCE, &mut harness.ctx(1)), 0);
        assert!(!peers.get(PeerId::new(2)).unwrap().has_grant_candidate(SOURCE));
    }

    #[test]
    fn test_timeout_requeues_peer_and_clears_remote() {
        let mut harness = Harness::new(Strategy::Random, 4);
        let mut peers = registry(Strategy::Random, 4, 2);
        introduce(&mut peers, 2, 3);

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));
        assert!(peers.get(PeerId::new(3)).unwrap().has_grant_candidate(PeerId::new(2)));

        // ttl is 10: round 11 expires the request and immediately resends it
        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(11));
        let peer = peers.get(PeerId::new(2)).unwrap();
        let (_, request) = peer.down_pending().next().unwrap();
        assert_eq!(request.round, 11);
        let remote = peers.get(PeerId::new(3)).unwrap();
        assert_eq!(remote.up_pending().next().map(|c| c.request_round), Some(11));
    }

    #[test]
    fn test_plus_variant_evicts_on_timeout() {
        let mut harness = Harness::new(Strategy::FairE9Plus, 4);
        let mut peers = registry(Strategy::FairE9Plus, 4, 2);
        introduce(&mut peers, 2, 3);

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));
        assert!(peers.get(PeerId::new(2)).unwrap().has_pending_download_from(PeerId::new(3)));

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(11));
        let peer = peers.get(PeerId::new(2)).unwrap();
        assert!(!peer.knows(PeerId::new(3)));
        assert_eq!(peer.down_pending_count(), 0);
        assert!(!peers.get(PeerId::new(3)).unwrap().has_grant_candidate(PeerId::new(2)));
    }

    #[test]
    fn test_plain_fair_e9_keeps_timed_out_peer() {
        let mut harness = Harness::new(Strategy::FairE9, 4);
        let mut peers = registry(Strategy::FairE9, 4, 2);
        introduce(&mut peers, 2, 3);

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));
        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(11));
        let peer = peers.get(PeerId::new(2)).unwrap();
        assert!(peer.knows(PeerId::new(3)));
        assert!(peer.has_pending_download_from(PeerId::new(3)));
    }

    #[test]
    fn test_satisfied_specific_request_is_dropped() {
        let mut harness = Harness::new(Strategy::FairE9, 4);
        let mut peers = registry(Strategy::FairE9, 4, 2);
        introduce(&mut peers, 2, 3);

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));
        let (_, request) = peers
            .get(PeerId::new(2))
            .unwrap()
            .down_pending()
            .next()
            .map(|(peer, request)| (peer, *request))
            .unwrap();
        let RequestedPiece::Specific(piece) = request.piece else {
            panic!("FairE9 requests from leechers name a piece");
        };
        assert_eq!(piece, PieceIndex::new(1));

        give(&mut peers, 2, 1, 1);
        give(&mut peers, 3, 2, 1);
        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(2));

        let peer = peers.get(PeerId::new(2)).unwrap();
        let (_, request) = peer.down_pending().next().unwrap();
        assert_eq!(request.piece, RequestedPiece::Specific(PieceIndex::new(2)));
        assert_eq!(request.round, 2);
    }

    #[test]
    fn test_fair_e9_asks_source_first_without_counting_it() {
        let mut harness = Harness::new(Strategy::FairE9Butterfly, 4);
        let mut peers = registry(Strategy::FairE9Butterfly, 4, 3);
        introduce(&mut peers, 2, 1);
        introduce(&mut peers, 2, 3);
        introduce(&mut peers, 2, 4);

        let sent = send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));

        let peer = peers.get(PeerId::new(2)).unwrap();
        let to_source = peer
            .down_pending()
            .find(|(target, _)| *target == SOURCE)
            .map(|(_, request)| request.piece);
        assert_eq!(to_source, Some(RequestedPiece::Any));
        // Cap 4 with 4 missing pieces gives a target of 2 per piece: both
        // remaining free peers are asked for piece 1
        assert_eq!(sent, 2);
        assert_eq!(peer.down_pending_count(), 3);
        assert_eq!(harness.counters.requests_any, 1);
        assert_eq!(harness.counters.requests_specific, 2);
    }

    #[test]
    fn test_fair_e9_prefers_peer_ranking_piece_rarest() {
        let mut harness = Harness::new(Strategy::FairE9, 3);
        let mut peers = registry(Strategy::FairE9, 3, 3);
        for other in [3, 4] {
            introduce(&mut peers, 2, other);
        }
        // Peer 4 ranks piece 1 rarest, peer 3 ranks it last
        peers.get_mut(PeerId::new(3)).unwrap().ranking =
            crate::permutation::PiecePermutation::from_weights(vec![3, 1, 2]);
        give(&mut peers, 2, 2, 1);
        give(&mut peers, 2, 3, 1);

        send_requests(&mut peers, PeerId::new(2), &mut harness.ctx(1));
        let peer = peers.get(PeerId::new(2)).unwrap();
        let order: Vec<PeerId> = peers
            .get(PeerId::new(4))
            .unwrap()
            .up_pending()
            .map(|c| c.requester)
            .collect();
        assert_eq!(order, vec![PeerId::new(2)]);
        // Weight sum: requester 1 + peer 4's 1
        assert_eq!(
            peers.get(PeerId::new(4)).unwrap().up_pending().next().map(|c| c.weight),
            Some(2)
        );
        assert_eq!(peer.down_pending_count(), 2);
    }
}
