//! Download request fan-out policies.

use fairswarm_core::{PeerId, PieceIndex};

use crate::protocol::RoundContext;
use crate::protocol::requests::issue_request;
use crate::registry::PeerRegistry;
use crate::request::RequestedPiece;

use super::RequestPolicy;

/// Sends open requests to free peers in FIFO order.
#[derive(Debug, Default, Clone, Copy)]
pub struct WildcardFanOut;

impl RequestPolicy for WildcardFanOut {
    fn fill(
        &self,
        registry: &mut PeerRegistry,
        requester: PeerId,
        ctx: &mut RoundContext<'_>,
    ) -> u32 {
        let mut sent = 0;

        loop {
            let next = registry.get(requester).and_then(|peer| {
                if peer.down_pending.len() < peer.down_pending_max as usize {
                    peer.free_peers.front().copied()
                } else {
                    None
                }
            });
            let Some(target) = next else {
                break;
            };

            if issue_request(registry, requester, target, RequestedPiece::Any, ctx) {
                ctx.counters.requests_any += 1;
                sent += 1;
            }
        }

        sent
    }

    fn name(&self) -> &str {
        "wildcard"
    }
}

/// FairE9 fan-out: several requests per missing piece, rarest first.
///
/// The initial source always gets an open request when it is free. Every
/// missing piece, in the requester's own rarity order, is then requested
/// from up to `max(2, ceil(pending cap / missing))` peers, preferring peers
/// that rank the piece rarest themselves.
#[derive(Debug, Clone, Copy)]
pub struct RarestFirstFanOut {
    evict_on_timeout: bool,
}

impl RarestFirstFanOut {
    /// Creates the fan-out; `evict_on_timeout` selects the "plus" variant.
    pub fn new(evict_on_timeout: bool) -> Self {
        Self { evict_on_timeout }
    }

    /// Missing pieces in rarity order with their outstanding request counts.
    fn missing_pieces(registry: &PeerRegistry, requester: PeerId) -> Vec<(PieceIndex, u32)> {
        let Some(peer) = registry.get(requester) else {
            return Vec::new();
        };
        let Some(ranking) = peer.ranking() else {
            return Vec::new();
        };

        let mut outstanding = vec![0u32; ranking.len()];
        for request in peer.down_pending.values() {
            if let RequestedPiece::Specific(piece) = request.piece {
                if let Some(count) = (piece.as_u32() as usize)
                    .checked_sub(1)
                    .and_then(|slot| outstanding.get_mut(slot))
                {
                    *count += 1;
                }
            }
        }

        ranking
            .pieces_by_weight()
            .filter(|piece| !peer.has_piece(*piece))
            .map(|piece| (piece, outstanding[piece.as_u32() as usize - 1]))
            .collect()
    }

    /// Free peer that ranks `piece` rarest; weight 1 wins immediately.
    fn best_free_peer(
        registry: &PeerRegistry,
        requester: PeerId,
        piece: PieceIndex,
    ) -> Option<PeerId> {
        let peer = registry.get(requester)?;
        let mut best: Option<(PeerId, u32)> = None;

        for candidate in peer.free_peers.iter().copied() {
            let weight = registry
                .get(candidate)
                .and_then(|other| other.weight_of(piece))
                .unwrap_or(u32::MAX);
            if weight == 1 {
                return Some(candidate);
            }
            if weight < best.map_or(u32::MAX, |(_, lowest)| lowest) {
                best = Some((candidate, weight));
            }
        }

        best.map(|(candidate, _)| candidate)
    }

    fn send_for_piece(
        registry: &mut PeerRegistry,
        requester: PeerId,
        piece: PieceIndex,
        wanted: u32,
        ctx: &mut RoundContext<'_>,
    ) -> u32 {
        let mut sent = 0;

        while sent < wanted {
            let has_room = registry
                .get(requester)
                .is_some_and(|peer| peer.down_pending.len() < peer.down_pending_max as usize);
            if !has_room {
                break;
            }

            let Some(target) = Self::best_free_peer(registry, requester, piece) else {
                break;
            };
            if !issue_request(registry, requester, target, RequestedPiece::Specific(piece), ctx) {
                break;
            }

            ctx.counters.requests_specific += 1;
            sent += 1;
        }

        sent
    }
}

impl RequestPolicy for RarestFirstFanOut {
    fn fill(
        &self,
        registry: &mut PeerRegistry,
        requester: PeerId,
        ctx: &mut RoundContext<'_>,
    ) -> u32 {
        let source = PeerId::INITIAL_SOURCE;
        let source_free = registry
            .get(requester)
            .is_some_and(|peer| peer.free_peers.contains(&source));
        if source_free && issue_request(registry, requester, source, RequestedPiece::Any, ctx) {
            // Counted globally but not in the round's request total
            ctx.counters.requests_any += 1;
        }

        let missing = Self::missing_pieces(registry, requester);
        if missing.is_empty() {
            return 0;
        }

        let pending_max = registry
            .get(requester)
            .map_or(0, |peer| peer.down_pending_max);
        let target = pending_max.div_ceil(missing.len() as u32).max(2);

        let mut sent = 0;
        for (piece, outstanding) in missing {
            let exhausted = registry.get(requester).is_none_or(|peer| {
                peer.down_pending.len() >= peer.down_pending_max as usize
                    || peer.free_peers.is_empty()
            });
            if exhausted {
                break;
            }

            let wanted = target.saturating_sub(outstanding);
            if wanted == 0 {
                continue;
            }

            let piece_sent = Self::send_for_piece(registry, requester, piece, wanted, ctx);
            sent += piece_sent;
            if piece_sent < wanted {
                break;
            }
        }

        sent
    }

    fn evicts_on_timeout(&self) -> bool {
        self.evict_on_timeout
    }

    fn name(&self) -> &str {
        if self.evict_on_timeout {
            "rarest-first+evict"
        } else {
            "rarest-first"
        }
    }
}
