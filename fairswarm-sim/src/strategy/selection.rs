//! Piece selection for open requests.

use fairswarm_core::PieceIndex;

use crate::peer::Peer;
use crate::rng::DeterministicRng;

use super::PieceSelection;

/// Pieces the uploader held before `round` that the requester still misses.
fn eligible<'a>(
    uploader: &'a Peer,
    requester: &'a Peer,
    round: u32,
) -> impl Iterator<Item = PieceIndex> + 'a {
    uploader
        .downloaded
        .iter()
        .filter(move |(piece, obtained)| **obtained != round && !requester.has_piece(*piece))
        .map(|(piece, _)| piece)
}

/// Uniform choice among eligible pieces.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformSelection;

impl PieceSelection for UniformSelection {
    fn pick(
        &self,
        uploader: &Peer,
        requester: &Peer,
        round: u32,
        rng: &mut DeterministicRng,
    ) -> Option<PieceIndex> {
        let candidates: Vec<PieceIndex> = eligible(uploader, requester, round).collect();
        rng.choose(&candidates).copied()
    }

    fn rank(&self, _: &Peer, _: PieceIndex) -> Option<u32> {
        None
    }

    fn histogram_key(&self, _: &Peer, piece: PieceIndex) -> u32 {
        piece.as_u32()
    }

    fn name(&self) -> &str {
        "uniform"
    }
}

/// Personalised rarest-first: the eligible piece the requester ranks rarest.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonalRarestSelection;

impl PieceSelection for PersonalRarestSelection {
    fn pick(
        &self,
        uploader: &Peer,
        requester: &Peer,
        round: u32,
        _: &mut DeterministicRng,
    ) -> Option<PieceIndex> {
        let mut best: Option<(PieceIndex, u32)> = None;
        for piece in eligible(uploader, requester, round) {
            let Some(weight) = requester.weight_of(piece) else {
                continue;
            };
            if best.is_none_or(|(_, lowest)| weight < lowest) {
                best = Some((piece, weight));
            }
        }
        best.map(|(piece, _)| piece)
    }

    fn rank(&self, peer: &Peer, piece: PieceIndex) -> Option<u32> {
        Some(peer.weight_of(piece).unwrap_or(u32::MAX))
    }

    fn histogram_key(&self, uploader: &Peer, piece: PieceIndex) -> u32 {
        uploader.weight_of(piece).unwrap_or(0)
    }

    fn name(&self) -> &str {
        "personal-rarest"
    }
}
