//! Fairswarm Simulation - round-based model of piece exchange swarms.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! One initial source holds every piece of a file; every other peer starts
//! empty and trades pieces with the peers it knows about until the whole
//! swarm has converged. The simulator compares incentive strategies by how
//! fast that happens and how evenly the upload effort is spread.
//!
//! # Features
//!
//! - **Deterministic Execution**: Same seed always produces identical results
//! - **Six Strategies**: Random, three FairE9 variants, eMule credit, BitTorrent tit-for-tat
//! - **Churn and Special Peers**: Leaving seeders, free riders, late joiners
//! - **Invariant Checking**: Validate protocol bookkeeping after every round
//!
//! # Example
//!
//! ```rust,no_run
//! use fairswarm_core::{Strategy, SwarmConfig};
//! use fairswarm_sim::Swarm;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SwarmConfig::small_swarm(Strategy::FairE9Butterfly);
//! let mut swarm = Swarm::new(config)?;
//!
//! let summary = swarm.run_for(1_000)?;
//! println!("Converged after {} rounds", summary.rounds);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Peer arena**: every peer lives in one registry indexed by serial; all
//!   relationships are serials, never references
//! - **Strategy policies**: request fan-out, upload ranking and piece
//!   selection, chosen once per run
//! - **Protocol**: request, upload and peer-exchange operations that mutate a
//!   peer and its immediate counterpart
//! - **Swarm**: the round loop, activation, churn and statistics

pub mod error;
pub mod invariants;
pub mod peer;
pub mod permutation;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod rng;
pub mod strategy;
pub mod swarm;

pub use error::SimulationError;
pub use invariants::{
    FreePeersSubsetInvariant, Invariant, InvariantViolation, PendingCapacityInvariant,
    PermutationInvariant, SeederQuiescenceInvariant,
};
pub use peer::{Completion, Lifecycle, Peer};
pub use permutation::PiecePermutation;
pub use registry::PeerRegistry;
pub use request::{GrantCandidate, PendingRequest, RequestedPiece};
pub use rng::DeterministicRng;
pub use strategy::Policies;
pub use swarm::{RoundReport, RunSummary, SpecialGroupSummary, Swarm, SwarmCounters};
