//! Protocol operations of a single round.
//!
//! Every operation acts on one peer and, for the duration of one synchronous
//! interaction, its immediate counterpart. No operation touches a third
//! peer's state except to unlink a peer that just became a seeder.

pub mod exchange;
pub mod requests;
pub mod upload;

use fairswarm_core::{ProtocolConfig, Strategy};

use crate::rng::DeterministicRng;
use crate::strategy::Policies;
use crate::swarm::SwarmCounters;

pub use exchange::{MAX_PEERS_PER_EXCHANGE, exchange_peers};
pub use requests::send_requests;
pub use upload::upload;

/// Run-wide parameters the protocol operations read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub strategy: Strategy,
    pub piece_count: u32,
    pub request_ttl: u32,
}

impl ProtocolSettings {
    pub fn new(protocol: &ProtocolConfig, piece_count: u32) -> Self {
        Self {
            strategy: protocol.strategy,
            piece_count,
            request_ttl: protocol.request_ttl,
        }
    }
}

/// Everything an operation needs besides the peers themselves.
#[derive(Debug)]
pub struct RoundContext<'a> {
    pub round: u32,
    pub rng: &'a mut DeterministicRng,
    pub counters: &'a mut SwarmCounters,
    pub policies: &'a Policies,
    pub settings: &'a ProtocolSettings,
}
