//! Upload ranking policies.

use crate::peer::Peer;
use crate::request::{GrantCandidate, RequestedPiece};
use crate::rng::DeterministicRng;

use super::UploadRanking;

fn by_weight(candidates: &mut [GrantCandidate]) {
    // Stable: equal weights keep registration order
    candidates.sort_by_key(|candidate| candidate.weight);
}

/// Serves waiting requests in a uniformly random order.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRanking;

impl UploadRanking for RandomRanking {
    fn accept_weight(&self, _: &Peer, _: &Peer, _: RequestedPiece, round: u32) -> i64 {
        i64::from(round)
    }

    fn order(&self, candidates: &mut [GrantCandidate], rng: &mut DeterministicRng) {
        rng.shuffle(candidates);
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// FairE9 ranking: the sum of both peers' rarity weight for the piece.
///
/// A pair that both consider a piece rare is served first. Open requests
/// are weighted by the round they were sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightRanking;

impl UploadRanking for WeightRanking {
    fn accept_weight(
        &self,
        uploader: &Peer,
        requester: &Peer,
        piece: RequestedPiece,
        round: u32,
    ) -> i64 {
        match piece {
            RequestedPiece::Specific(piece) => {
                let own = uploader.weight_of(piece).unwrap_or(0);
                let theirs = requester.weight_of(piece).unwrap_or(0);
                i64::from(own) + i64::from(theirs)
            }
            RequestedPiece::Any => i64::from(round),
        }
    }

    fn order(&self, candidates: &mut [GrantCandidate], _: &mut DeterministicRng) {
        by_weight(candidates);
    }

    fn retries_empty_first_pass(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "weight"
    }
}

/// eMule-style queue: waiting time discounted by the credit a requester earned.
#[derive(Debug, Default, Clone, Copy)]
pub struct CreditRanking;

impl UploadRanking for CreditRanking {
    fn accept_weight(&self, _: &Peer, _: &Peer, _: RequestedPiece, round: u32) -> i64 {
        i64::from(round)
    }

    fn refresh_weight(&self, uploader: &Peer, candidate: &mut GrantCandidate) {
        // Each uploaded piece is worth three rounds of waiting
        if let Some(credit) = uploader.positive_credit(candidate.requester) {
            candidate.weight = i64::from(candidate.request_round) - 3 * credit / 10;
        }
    }

    fn order(&self, candidates: &mut [GrantCandidate], _: &mut DeterministicRng) {
        by_weight(candidates);
    }

    fn records_credit(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "credit"
    }
}

/// BitTorrent-style tit-for-tat: net givers are served first.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitForTatRanking;

impl UploadRanking for TitForTatRanking {
    fn accept_weight(&self, _: &Peer, _: &Peer, _: RequestedPiece, _: u32) -> i64 {
        0
    }

    fn refresh_weight(&self, uploader: &Peer, candidate: &mut GrantCandidate) {
        let requester = candidate.requester;
        candidate.weight = match (
            uploader.positive_credit(requester),
            uploader.negative_credit(requester),
        ) {
            (None, _) => 0,
            (Some(given), None) => -given,
            (Some(given), Some(taken)) if taken != 0 => -given * 10 / taken,
            (Some(given), Some(_)) => -given,
        };
    }

    fn order(&self, candidates: &mut [GrantCandidate], _: &mut DeterministicRng) {
        by_weight(candidates);
    }

    fn records_credit(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "tit-for-tat"
    }
}
