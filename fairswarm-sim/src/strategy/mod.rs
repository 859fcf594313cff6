//! Strategy policies.
//!
//! Each of the six strategies is a combination of three small capabilities
//! chosen once per run: how a leecher fans out download requests, how an
//! uploader orders the requests waiting for it, and which piece an uploader
//! sends when the requester left the choice open.

pub mod ranking;
pub mod request;
pub mod selection;

use std::fmt;

use fairswarm_core::{PeerId, PieceIndex, Strategy};

use crate::peer::Peer;
use crate::protocol::RoundContext;
use crate::registry::PeerRegistry;
use crate::request::{GrantCandidate, RequestedPiece};
use crate::rng::DeterministicRng;

pub use ranking::{CreditRanking, RandomRanking, TitForTatRanking, WeightRanking};
pub use request::{RarestFirstFanOut, WildcardFanOut};
pub use selection::{PersonalRarestSelection, UniformSelection};

/// How a leecher fills its pending downloads.
pub trait RequestPolicy: Send + Sync + fmt::Debug {
    /// Sends new requests until the pending cap or the free peers run out.
    ///
    /// Returns the number of requests counted for the round report.
    fn fill(
        &self,
        registry: &mut PeerRegistry,
        requester: PeerId,
        ctx: &mut RoundContext<'_>,
    ) -> u32;

    /// True when a timed-out peer is dropped from the known peers for good.
    fn evicts_on_timeout(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// How an uploader weighs and orders waiting requests.
pub trait UploadRanking: Send + Sync + fmt::Debug {
    /// Weight stored when a request is registered.
    fn accept_weight(
        &self,
        uploader: &Peer,
        requester: &Peer,
        piece: RequestedPiece,
        round: u32,
    ) -> i64;

    /// Recomputes a weight right before ranking.
    fn refresh_weight(&self, _uploader: &Peer, _candidate: &mut GrantCandidate) {}

    /// Puts candidates in serving order.
    fn order(&self, candidates: &mut [GrantCandidate], rng: &mut DeterministicRng);

    /// True when a second pass follows a first pass that granted nothing.
    fn retries_empty_first_pass(&self) -> bool {
        false
    }

    /// True when transfers are recorded in the credit ledgers.
    fn records_credit(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Which piece an uploader picks for an open request.
pub trait PieceSelection: Send + Sync + fmt::Debug {
    /// Picks among pieces the uploader held before `round` and the requester lacks.
    fn pick(
        &self,
        uploader: &Peer,
        requester: &Peer,
        round: u32,
        rng: &mut DeterministicRng,
    ) -> Option<PieceIndex>;

    /// Preference of `peer` for `piece`; `None` when the strategy has no ranking.
    fn rank(&self, peer: &Peer, piece: PieceIndex) -> Option<u32>;

    /// Key under which an upload of `piece` is counted in the histogram.
    fn histogram_key(&self, uploader: &Peer, piece: PieceIndex) -> u32;

    fn name(&self) -> &str;
}

/// The three capabilities of one strategy.
#[derive(Debug)]
pub struct Policies {
    strategy: Strategy,
    pub request: Box<dyn RequestPolicy>,
    pub ranking: Box<dyn UploadRanking>,
    pub selection: Box<dyn PieceSelection>,
}

impl Policies {
    /// Creates the policy set of a named strategy.
    pub fn for_strategy(strategy: Strategy) -> Self {
        let (request, ranking, selection): (
            Box<dyn RequestPolicy>,
            Box<dyn UploadRanking>,
            Box<dyn PieceSelection>,
        ) = match strategy {
            Strategy::Random => (
                Box::new(WildcardFanOut),
                Box::new(RandomRanking),
                Box::new(UniformSelection),
            ),
            Strategy::FairE9 | Strategy::FairE9Butterfly => (
                Box::new(RarestFirstFanOut::new(false)),
                Box::new(WeightRanking),
                Box::new(PersonalRarestSelection),
            ),
            Strategy::FairE9Plus => (
                Box::new(RarestFirstFanOut::new(true)),
                Box::new(WeightRanking),
                Box::new(PersonalRarestSelection),
            ),
            Strategy::Emule => (
                Box::new(WildcardFanOut),
                Box::new(CreditRanking),
                Box::new(UniformSelection),
            ),
            Strategy::Bt => (
                Box::new(WildcardFanOut),
                Box::new(TitForTatRanking),
                Box::new(UniformSelection),
            ),
        };

        Self {
            strategy,
            request,
            ranking,
            selection,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

impl fmt::Display for Policies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (requests: {}, ranking: {}, pieces: {})",
            self.strategy,
            self.request.name(),
            self.ranking.name(),
            self.selection.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_sets_per_strategy() {
        let plus = Policies::for_strategy(Strategy::FairE9Plus);
        assert!(plus.request.evicts_on_timeout());
        assert!(plus.ranking.retries_empty_first_pass());
        assert!(!plus.ranking.records_credit());

        let fair = Policies::for_strategy(Strategy::FairE9);
        assert!(!fair.request.evicts_on_timeout());

        for strategy in [Strategy::Emule, Strategy::Bt] {
            let policies = Policies::for_strategy(strategy);
            assert!(policies.ranking.records_credit());
            assert_eq!(policies.selection.name(), "uniform");
        }

        let random = Policies::for_strategy(Strategy::Random);
        assert!(!random.ranking.records_credit());
        assert_eq!(random.strategy(), Strategy::Random);
    }
}
