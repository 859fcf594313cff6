//! Request and grant bookkeeping shared by both sides of an exchange.

use std::fmt;

use fairswarm_core::{PeerId, PieceIndex};

/// Piece named by a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestedPiece {
    /// Any piece the uploader has and the requester lacks
    Any,
    /// One particular piece
    Specific(PieceIndex),
}

impl RequestedPiece {
    pub fn specific(self) -> Option<PieceIndex> {
        match self {
            RequestedPiece::Any => None,
            RequestedPiece::Specific(piece) => Some(piece),
        }
    }
}

impl fmt::Display for RequestedPiece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedPiece::Any => write!(f, "any"),
            RequestedPiece::Specific(piece) => write!(f, "{piece}"),
        }
    }
}

/// Outstanding download request, held by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub piece: RequestedPiece,
    /// Round the request was sent
    pub round: u32,
}

impl PendingRequest {
    pub fn new(piece: RequestedPiece, round: u32) -> Self {
        Self { piece, round }
    }

    /// True once the request has waited `ttl` rounds or more.
    pub fn timed_out(&self, round: u32, ttl: u32) -> bool {
        self.round.saturating_add(ttl) <= round
    }
}

/// Request waiting for a grant, held by the uploader.
///
/// Candidates are ordered by `weight` ascending; lower weights are served
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantCandidate {
    pub requester: PeerId,
    pub piece: RequestedPiece,
    pub weight: i64,
    /// Round the underlying request was sent
    pub request_round: u32,
}

impl GrantCandidate {
    pub fn new(requester: PeerId, piece: RequestedPiece, weight: i64, request_round: u32) -> Self {
        Self {
            requester,
            piece,
            weight,
            request_round,
        }
    }
}

impl fmt::Display for GrantCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.requester, self.piece, self.weight)
    }
}
