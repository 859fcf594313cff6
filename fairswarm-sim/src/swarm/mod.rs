//! Round-loop orchestration.
//!
//! A round runs five phases in a fixed order: activation, requests (with
//! occasional peer exchange), uploads, seeder churn and statistics. Within a
//! phase peers act in increasing serial order.

mod special;
mod stats;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use fairswarm_core::{PeerId, Strategy, SwarmConfig};
use tracing::{debug, info, trace, warn};

use crate::error::SimulationError;
use crate::invariants::{
    FreePeersSubsetInvariant, Invariant, InvariantViolation, PendingCapacityInvariant,
    PermutationInvariant, SeederQuiescenceInvariant,
};
use crate::peer::{Lifecycle, Peer};
use crate::permutation::{self, PiecePermutation};
use crate::protocol::{self, ProtocolSettings, RoundContext};
use crate::registry::PeerRegistry;
use crate::rng::DeterministicRng;
use crate::strategy::Policies;

pub use special::REFERENCE_PEER;
pub use stats::{RoundReport, RunSummary, SpecialGroupSummary, SwarmCounters};

use stats::RoundTotals;

/// Maximum number of invariant violations before stopping the run.
const MAX_INVARIANT_VIOLATIONS: usize = 10;

/// A whole swarm and the round loop driving it.
pub struct Swarm {
    config: SwarmConfig,
    registry: PeerRegistry,
    /// Activation pool; sampled peers rotate to the back
    active: Vec<PeerId>,
    rng: DeterministicRng,
    policies: Policies,
    settings: ProtocolSettings,
    counters: SwarmCounters,
    round: u32,
    piece_time_secs: u64,
    invariants: Vec<Arc<dyn Invariant>>,
    violations: Vec<InvariantViolation>,
}

impl Swarm {
    /// Builds the population described by `config`, seeded from its seed.
    ///
    /// # Errors
    /// - `SimulationError::InvalidConfig` - Configuration failed validation
    pub fn new(config: SwarmConfig) -> Result<Self, SimulationError> {
        let rng = DeterministicRng::from_seed(config.simulation.seed);
        Self::with_rng(config, rng)
    }

    /// Builds the population drawing every random decision from `rng`.
    ///
    /// # Errors
    /// - `SimulationError::InvalidConfig` - Configuration failed validation
    pub fn with_rng(config: SwarmConfig, mut rng: DeterministicRng) -> Result<Self, SimulationError> {
        config.validate()?;

        let strategy = config.protocol.strategy;
        let piece_count = config.population.piece_count;
        let mut registry = PeerRegistry::new();

        let mut source = Peer::builder(PeerId::INITIAL_SOURCE)
            .up_slots(config.population.source_up_slots)
            .known_peers_max(config.protocol.known_peers_max);
        if let Some(ranking) = rarity_ordering(strategy, piece_count, &mut rng) {
            source = source.ranking(ranking);
        }
        let mut source = source.build();
        source.make_initial_source(piece_count);
        registry.push(source);

        for serial in 2..=config.population.peer_count {
            let down = &config.population.down_slots;
            let up = &config.population.up_slots;
            let mut builder = Peer::builder(PeerId::new(serial))
                .down_slots(rng.random_gaussian(down.mean, down.spread))
                .up_slots(rng.random_gaussian(up.mean, up.spread))
                .down_pending_max(config.protocol.down_pending_max)
                .known_peers_max(config.protocol.known_peers_max);
            if let Some(ranking) = rarity_ordering(strategy, piece_count, &mut rng) {
                builder = builder.ranking(ranking);
            }
            registry.push(builder.build());
        }

        if let Some(special) = config.population.special {
            special::apply(&mut registry, special);
        }

        let settings = ProtocolSettings::new(&config.protocol, piece_count);
        let piece_time_secs = config.simulation.piece_time_secs(piece_count);

        Ok(Self {
            registry,
            active: Vec::new(),
            rng,
            policies: Policies::for_strategy(strategy),
            settings,
            counters: SwarmCounters::default(),
            round: 0,
            piece_time_secs,
            invariants: Vec::new(),
            violations: Vec::new(),
            config,
        })
    }

    /// Adds an invariant to check after every round.
    pub fn add_invariant(&mut self, invariant: Arc<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Adds the protocol bookkeeping invariants.
    pub fn add_default_invariants(&mut self) {
        self.add_invariant(Arc::new(PendingCapacityInvariant));
        self.add_invariant(Arc::new(FreePeersSubsetInvariant));
        self.add_invariant(Arc::new(SeederQuiescenceInvariant));
        self.add_invariant(Arc::new(PermutationInvariant::new(
            self.config.population.piece_count,
        )));
    }

    /// Runs exactly one round.
    ///
    /// # Errors
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn step(&mut self) -> Result<RoundReport, SimulationError> {
        self.round += 1;
        let round = self.round;
        self.activate_peers(round);

        let ids: Vec<PeerId> = self.registry.ids().collect();
        let exchange_period = u64::from(self.config.protocol.rounds_per_peer_exchange);
        let mut totals = RoundTotals::default();

        {
            let mut ctx = RoundContext {
                round,
                rng: &mut self.rng,
                counters: &mut self.counters,
                policies: &self.policies,
                settings: &self.settings,
            };

            for &id in &ids {
                if !self.registry.get(id).is_some_and(Peer::is_active) {
                    continue;
                }
                totals.requests += protocol::send_requests(&mut self.registry, id, &mut ctx);
                if ctx.rng.random_range(0, exchange_period) == 0 {
                    totals.exchanges +=
                        protocol::exchange_peers(&mut self.registry, id, round + 1, ctx.rng);
                }
            }

            for &id in &ids {
                if self.registry.get(id).is_some_and(Peer::is_active) {
                    totals.uploads += protocol::upload(&mut self.registry, id, &mut ctx);
                }
            }
        }

        totals.seeders = self.churn_seeders(&ids, round);
        totals.active_peers = self.active.len();

        let report = stats::round_report(
            &self.registry,
            round,
            self.piece_time_secs,
            self.config.population.piece_count,
            totals,
        );
        debug!(
            "Round {}: {:.2}% complete, {} peers, {} seeders, {} requests, {} uploads, {} exchanges",
            round,
            report.completion_percent,
            report.active_peers,
            report.seeders,
            report.requests,
            report.uploads,
            report.exchanges
        );

        self.check_invariants()?;
        Ok(report)
    }

    /// Runs until every active peer is a seeder.
    ///
    /// A configuration that never converges never returns.
    ///
    /// # Errors
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run(&mut self) -> Result<RunSummary, SimulationError> {
        self.run_with(None, |_| {})
    }

    /// Runs until convergence or until `max_rounds` more rounds have passed.
    ///
    /// # Errors
    /// - `SimulationError::RoundLimitExceeded` - Swarm did not converge in time
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run_for(&mut self, max_rounds: u32) -> Result<RunSummary, SimulationError> {
        self.run_with(Some(max_rounds), |_| {})
    }

    /// Runs like `run_for`, handing every round report to `observer`.
    ///
    /// Without a limit the run is unbounded.
    ///
    /// # Errors
    /// - `SimulationError::RoundLimitExceeded` - Swarm did not converge in time
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run_with<F>(
        &mut self,
        max_rounds: Option<u32>,
        mut observer: F,
    ) -> Result<RunSummary, SimulationError>
    where
        F: FnMut(&RoundReport),
    {
        info!(
            "Starting swarm: {}, {} peers, {} pieces, seed {}",
            self.policies,
            self.registry.len(),
            self.config.population.piece_count,
            self.rng.seed()
        );

        let mut executed = 0;
        loop {
            if max_rounds.is_some_and(|max| executed >= max) {
                warn!("Swarm did not converge within {} rounds", executed);
                return Err(SimulationError::RoundLimitExceeded { rounds: executed });
            }

            let report = self.step()?;
            executed += 1;
            observer(&report);

            if report.converged() {
                break;
            }
        }

        info!("Swarm converged after {} rounds", self.round);
        Ok(self.summary())
    }

    /// End-of-run statistics for the rounds executed so far.
    pub fn summary(&self) -> RunSummary {
        stats::run_summary(
            &self.registry,
            self.config.protocol.strategy,
            self.config.population.piece_count,
            self.round,
            self.counters,
        )
    }

    /// Latency and uploads grouped by perturbation factor.
    ///
    /// Empty when no special peers are configured.
    pub fn special_peer_summary(&self) -> Vec<SpecialGroupSummary> {
        match self.config.population.special {
            Some(special) => special::summarize(&self.registry, special.kind),
            None => Vec::new(),
        }
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.registry.get(id)
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Last round executed; 0 before the first step.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn active_peer_count(&self) -> usize {
        self.active.len()
    }

    pub fn counters(&self) -> &SwarmCounters {
        &self.counters
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    /// Invariant violations recorded so far.
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Activates peers starting this round, each seeded with known peers
    /// sampled without replacement from the active pool.
    fn activate_peers(&mut self, round: u32) {
        if self.active.len() == self.registry.len() {
            return;
        }

        let sample_size = self.config.protocol.initial_known_peers as usize;
        for index in 0..self.registry.len() {
            let id = PeerId::new(index as u32 + 1);
            let starting = self.registry.get(id).is_some_and(|peer| {
                peer.lifecycle() == Lifecycle::Inactive && peer.start_round() == round
            });
            if !starting {
                continue;
            }

            let pool = self.active.len();
            let mut sampled = Vec::with_capacity(sample_size.min(pool));
            for taken in 0..sample_size.min(pool) {
                let pick = self.active.remove(self.rng.random_index(pool - taken));
                self.active.push(pick);
                sampled.push(pick);
            }

            if let Some(peer) = self.registry.get_mut(id) {
                peer.activate();
                for known in sampled {
                    peer.add_known_peer(known, round);
                }
            }
            self.active.push(id);
            trace!("{} joined in round {}", id, round);
        }
    }

    /// Lets active seeders other than the initial source leave at random.
    ///
    /// Returns the number of active seeders that stayed.
    fn churn_seeders(&mut self, ids: &[PeerId], round: u32) -> usize {
        let leave_percent = u64::from(self.config.protocol.churn_seeder_leave_percent);
        let mut stayed = 0;

        for &id in ids {
            let Some(peer) = self.registry.get(id) else {
                continue;
            };
            if !peer.is_active() || !peer.is_seeder() {
                continue;
            }

            if !peer.is_initial_source() && self.rng.random_range(0, 100) < leave_percent {
                self.depart(id, round);
            } else {
                stayed += 1;
            }
        }

        stayed
    }

    /// Removes a peer from the swarm and from every other peer's state.
    fn depart(&mut self, id: PeerId, round: u32) {
        if let Some(peer) = self.registry.get_mut(id) {
            peer.depart(round);
        }
        self.active.retain(|active| *active != id);
        for peer in self.registry.iter_mut() {
            peer.forget_peer(id);
        }
        debug!("{} left the swarm in round {}", id, round);
    }

    /// Checks all invariants.
    fn check_invariants(&mut self) -> Result<(), SimulationError> {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(&self.registry, self.round) {
                warn!("{}", violation);
                self.violations.push(violation);

                if self.violations.len() >= MAX_INVARIANT_VIOLATIONS {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: self.violations.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Private rarity ordering a new peer gets under `strategy`.
fn rarity_ordering(
    strategy: Strategy,
    piece_count: u32,
    rng: &mut DeterministicRng,
) -> Option<PiecePermutation> {
    match strategy {
        Strategy::FairE9Butterfly => {
            let seed = permutation::random_seed(piece_count, rng);
            Some(PiecePermutation::butterfly(piece_count, seed))
        }
        Strategy::FairE9 | Strategy::FairE9Plus => {
            Some(PiecePermutation::shuffled(piece_count, rng))
        }
        Strategy::Random | Strategy::Emule | Strategy::Bt => None,
    }
}
