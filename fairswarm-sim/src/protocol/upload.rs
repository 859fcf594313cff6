//! Granting pieces to waiting requesters.

use fairswarm_core::{PeerId, PieceIndex};
use tracing::trace;

use crate::peer::Peer;
use crate::registry::PeerRegistry;
use crate::request::{GrantCandidate, RequestedPiece};
use crate::strategy::PieceSelection;

use super::RoundContext;

/// Serves waiting requesters up to the uploader's slot capacity.
///
/// Returns the number of pieces granted this round.
pub fn upload(registry: &mut PeerRegistry, uploader: PeerId, ctx: &mut RoundContext<'_>) -> u32 {
    if uploader.is_initial_source() {
        return upload_from_source(registry, uploader, ctx);
    }

    let Some(candidates) = relevant_candidates(registry, uploader, ctx) else {
        return 0;
    };
    let Some(mut free_slots) = registry.get(uploader).map(Peer::up_slots_max) else {
        return 0;
    };

    let policies = ctx.policies;
    let round = ctx.round;
    let mut granted = 0;
    let mut first_pass = true;

    // Walk the ranked list repeatedly while slots remain and a walk still grants
    while free_slots > 0 {
        let mut uploaded = false;

        for candidate in &candidates {
            if free_slots == 0 {
                break;
            }

            let piece = {
                let (Some(giver), Some(taker)) =
                    (registry.get(uploader), registry.get(candidate.requester))
                else {
                    continue;
                };
                if !taker.has_free_down_slot() {
                    continue;
                }

                let piece = match (candidate.piece, first_pass) {
                    (RequestedPiece::Specific(piece), true) => {
                        let fresh = giver.piece_round(piece).is_none_or(|r| r == round);
                        if fresh || taker.has_piece(piece) {
                            continue;
                        }
                        Some(piece)
                    }
                    _ => {
                        ctx.counters.bitmap_exchanges += 1;
                        policies.selection.pick(giver, taker, round, ctx.rng)
                    }
                };
                match piece {
                    Some(piece) => piece,
                    None => continue,
                }
            };

            free_slots -= 1;
            transfer(registry, uploader, candidate.requester, piece, ctx);

            if let Some(giver) = registry.get_mut(uploader) {
                if policies.ranking.records_credit() {
                    // Reciprocate next round
                    giver.prefer_peer(candidate.requester, round);
                }
                let key = policies.selection.histogram_key(giver, piece);
                giver.record_upload(key);
            }

            uploaded = true;
            granted += 1;
            trace!("{} <= {} ({})", candidate.requester, uploader, piece);
        }

        if first_pass {
            if !uploaded && !policies.ranking.retries_empty_first_pass() {
                break;
            }
            first_pass = false;
        } else if !uploaded {
            break;
        }
    }

    if let Some(giver) = registry.get_mut(uploader) {
        giver.uploads += u64::from(granted);
    }
    granted
}

/// Grant candidates worth serving this round, in serving order.
///
/// Candidates whose requester no longer waits on this uploader are dropped
/// from the grant queue. Busy requesters are skipped but kept. Weights are
/// refreshed and written back before ordering.
fn relevant_candidates(
    registry: &mut PeerRegistry,
    uploader: PeerId,
    ctx: &mut RoundContext<'_>,
) -> Option<Vec<GrantCandidate>> {
    let policies = ctx.policies;
    let giver = registry.get(uploader)?;
    if giver.downloaded.is_empty() || giver.up_pending.is_empty() {
        return None;
    }

    let mut stale = Vec::new();
    let mut candidates = Vec::new();
    for candidate in giver.up_pending.values() {
        let Some(taker) = registry.get(candidate.requester) else {
            stale.push(candidate.requester);
            continue;
        };
        if !taker.has_free_down_slot() {
            continue;
        }
        if taker.is_departed() || !taker.has_pending_download_from(uploader) {
            stale.push(candidate.requester);
            continue;
        }

        let mut refreshed = *candidate;
        policies.ranking.refresh_weight(giver, &mut refreshed);
        candidates.push(refreshed);
    }

    let giver = registry.get_mut(uploader)?;
    for requester in stale {
        giver.up_pending.remove(&requester);
    }
    for candidate in &candidates {
        if let Some(stored) = giver.up_pending.get_mut(&candidate.requester) {
            stored.weight = candidate.weight;
        }
    }

    if candidates.len() > 1 {
        policies.ranking.order(&mut candidates, ctx.rng);
    }
    Some(candidates)
}

/// Applies a granted piece on the requester and settles both sides.
fn transfer(
    registry: &mut PeerRegistry,
    uploader: PeerId,
    requester: PeerId,
    piece: PieceIndex,
    ctx: &mut RoundContext<'_>,
) {
    let records_credit = ctx.policies.ranking.records_credit();
    let piece_count = ctx.settings.piece_count;

    let Some(taker) = registry.get_mut(requester) else {
        return;
    };
    let abandoned = taker.receive_piece(uploader, piece, ctx.round, piece_count, records_credit);
    let completed = taker.is_seeder();

    if let Some(giver) = registry.get_mut(uploader) {
        if records_credit {
            giver.add_negative_credit(requester);
        }
        if completed {
            giver.up_pending.remove(&requester);
        }
    }

    for peer in abandoned {
        if let Some(remote) = registry.get_mut(peer) {
            remote.up_pending.remove(&requester);
        }
    }
}

/// Round-robin over the source's pieces, each to the best waiting requester.
///
/// The source does not count uploads and keeps no histogram.
fn upload_from_source(
    registry: &mut PeerRegistry,
    source: PeerId,
    ctx: &mut RoundContext<'_>,
) -> u32 {
    let policies = ctx.policies;
    let Some(peer) = registry.get(source) else {
        return 0;
    };
    let mut free_slots = peer.up_slots_max;
    let mut pieces_left = peer.downloaded.len();
    let mut granted = 0;

    loop {
        let Some(peer) = registry.get_mut(source) else {
            break;
        };
        if free_slots == 0 || peer.up_pending.is_empty() || pieces_left == 0 {
            break;
        }
        pieces_left -= 1;

        let Some(piece) = peer.downloaded.front_key() else {
            break;
        };
        peer.downloaded.move_to_back(&piece);

        let Some(recipient) = source_recipient(registry, source, piece, policies.selection.as_ref())
        else {
            continue;
        };

        if let Some(peer) = registry.get_mut(source) {
            peer.up_pending.remove(&recipient);
        }
        transfer(registry, source, recipient, piece, ctx);
        granted += 1;
        free_slots -= 1;
        trace!("{} <= s ({})", recipient, piece);
    }

    granted
}

/// First eligible requester, or under a ranking the one ranking `piece` rarest.
fn source_recipient(
    registry: &PeerRegistry,
    source: PeerId,
    piece: PieceIndex,
    selection: &dyn PieceSelection,
) -> Option<PeerId> {
    let peer = registry.get(source)?;
    let mut best: Option<(PeerId, u32)> = None;

    for requester in peer.up_pending.keys() {
        let Some(taker) = registry.get(requester) else {
            continue;
        };
        if taker.has_piece(piece) || !taker.has_free_down_slot() {
            continue;
        }

        match selection.rank(taker, piece) {
            None | Some(1) => return Some(requester),
            Some(weight) => {
                if weight < best.map_or(u32::MAX, |(_, lowest)| lowest) {
                    best = Some((requester, weight));
                }
            }
        }
    }

    best.map(|(requester, _)| requester)
}
