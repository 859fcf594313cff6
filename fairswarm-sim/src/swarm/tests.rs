//! Scenario tests for the round loop.

use fairswarm_core::{PieceIndex, SpecialKind, SpecialPeers};

use super::*;

fn small(strategy: Strategy) -> SwarmConfig {
    SwarmConfig::small_swarm(strategy)
}

fn all_leechers_complete(swarm: &Swarm) -> bool {
    let piece_count = swarm.config().population.piece_count;
    swarm.peers().iter().all(|peer| {
        peer.is_seeder() && PieceIndex::all(piece_count).all(|piece| peer.has_piece(piece))
    })
}

/// Always fails, to exercise the violation limit.
struct Broken;

impl Invariant for Broken {
    fn check(&self, _registry: &PeerRegistry, round: u32) -> Result<(), InvariantViolation> {
        Err(self.violation(round, "always broken".to_string()))
    }

    fn name(&self) -> &str {
        "Broken"
    }
}

#[test]
fn test_random_small_swarm_converges() {
    let mut swarm = Swarm::new(small(Strategy::Random)).unwrap();
    swarm.add_default_invariants();

    let summary = swarm.run_for(1_000).unwrap();

    assert!(all_leechers_complete(&swarm));
    assert_eq!(summary.rounds, swarm.round());
    // Two download slots per round and five pieces
    assert!(summary.rounds >= 3);
    // The source alone would need twelve rounds for 45 transfers at four a round
    assert!(summary.rounds <= 40, "took {} rounds", summary.rounds);
    assert_eq!(swarm.active_peer_count(), 10);
    assert!(swarm.violations().is_empty());
    assert!(summary.average_latency >= 3.0);
    assert!(summary.average_latency <= f64::from(summary.rounds));
    for peer in swarm.peers().iter().filter(|peer| !peer.is_initial_source()) {
        let completed = peer.completed_round().unwrap();
        assert!((3..=summary.rounds).contains(&completed));
    }
}

#[test]
fn test_butterfly_orderings_are_valid_and_swarm_converges() {
    let mut swarm = Swarm::new(small(Strategy::FairE9Butterfly)).unwrap();
    swarm.add_default_invariants();

    for peer in swarm.peers().iter() {
        let mut weights = peer.ranking().unwrap().weights().to_vec();
        weights.sort_unstable();
        assert_eq!(weights, vec![1, 2, 3, 4, 5]);
    }

    swarm.run_for(1_000).unwrap();
    assert!(all_leechers_complete(&swarm));
    assert!(swarm.violations().is_empty());
}

#[test]
fn test_full_churn_unlinks_departed_seeders() {
    let mut config = small(Strategy::Random);
    config.protocol.churn_seeder_leave_percent = 100;
    config.population.source_up_slots = 9;
    let mut swarm = Swarm::new(config).unwrap();
    swarm.add_default_invariants();

    swarm.run_for(1_000).unwrap();

    assert_eq!(swarm.active_peer_count(), 1);
    let departed: Vec<PeerId> = (2..=10).map(PeerId::new).collect();
    for id in &departed {
        let peer = swarm.peer(*id).unwrap();
        assert!(peer.is_departed());
        assert!(peer.is_seeder());
        // Every seeder leaves in the round it completed
        assert!(peer.departure_round().is_some());
        assert_eq!(peer.departure_round(), peer.completed_round());
    }
    assert_eq!(swarm.peer(PeerId::INITIAL_SOURCE).unwrap().departure_round(), None);
    for peer in swarm.peers().iter() {
        for gone in &departed {
            assert!(!peer.knows(*gone));
            assert!(peer.free_peers().all(|free| free != *gone));
            assert!(!peer.has_grant_candidate(*gone));
            assert!(!peer.has_pending_download_from(*gone));
        }
    }
}

#[test]
fn test_same_seed_reproduces_run() {
    let run = || {
        let mut config = small(Strategy::FairE9);
        config.simulation.seed = 99;
        Swarm::new(config).unwrap().run_for(1_000).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_injected_rng_overrides_config_seed() {
    let config = small(Strategy::Random);
    let mut seeded = Swarm::new(config.clone()).unwrap();
    let mut injected =
        Swarm::with_rng(config.clone(), DeterministicRng::from_seed(config.simulation.seed))
            .unwrap();
    assert_eq!(seeded.run_for(1_000).unwrap(), injected.run_for(1_000).unwrap());
}

#[test]
fn test_credit_ledgers_balance_per_transfer() {
    let mut swarm = Swarm::new(small(Strategy::Emule)).unwrap();
    swarm.run_for(1_000).unwrap();

    let ids: Vec<PeerId> = swarm.peers().ids().collect();
    let mut positive = 0;
    let mut negative = 0;
    for peer in swarm.peers().iter() {
        for other in &ids {
            positive += peer.positive_credit(*other).unwrap_or(0);
            negative += peer.negative_credit(*other).unwrap_or(0);
        }
    }

    // Nine leechers, five pieces each, ten credit per transfer
    assert_eq!(positive, 450);
    assert_eq!(negative, 450);
}

#[test]
fn test_pending_downloads_never_exceed_cap() {
    let mut swarm = Swarm::new(small(Strategy::FairE9Plus)).unwrap();
    for _ in 0..200 {
        let report = swarm.step().unwrap();
        for peer in swarm.peers().iter() {
            assert!(peer.down_pending_count() <= peer.down_pending_max() as usize);
        }
        if report.converged() {
            break;
        }
    }
    assert!(all_leechers_complete(&swarm));
}

#[test]
fn test_first_round_report() {
    let mut swarm = Swarm::new(small(Strategy::Random)).unwrap();
    let report = swarm.step().unwrap();

    assert_eq!(report.round, 1);
    assert_eq!(report.elapsed_secs, 800);
    assert_eq!(report.active_peers, 10);
    assert_eq!(report.seeders, 1);
    assert!(report.requests >= 9);
    // Only the source has anything to give
    assert!((1..=4).contains(&report.uploads));
    assert!(!report.converged());
}

#[test]
fn test_round_limit_is_an_error() {
    let mut swarm = Swarm::new(small(Strategy::Random)).unwrap();
    let result = swarm.run_for(1);
    assert!(matches!(
        result,
        Err(SimulationError::RoundLimitExceeded { rounds: 1 })
    ));
}

#[test]
fn test_too_many_violations_abort_the_run() {
    let mut swarm = Swarm::new(small(Strategy::Random)).unwrap();
    for _ in 0..MAX_INVARIANT_VIOLATIONS {
        swarm.add_invariant(Arc::new(Broken));
    }

    let result = swarm.run_for(100);
    assert!(matches!(
        result,
        Err(SimulationError::TooManyInvariantViolations { count: 10 })
    ));
    assert_eq!(swarm.round(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = small(Strategy::Random);
    config.population.peer_count = 0;
    assert!(matches!(
        Swarm::new(config),
        Err(SimulationError::InvalidConfig(_))
    ));
}

#[test]
fn test_lone_source_converges_in_first_round() {
    let mut config = small(Strategy::Bt);
    config.population.peer_count = 1;
    let summary = Swarm::new(config).unwrap().run_for(10).unwrap();
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.upload_max, 0);
}

#[test]
fn test_new_comers_join_on_schedule() {
    let mut config = small(Strategy::Random);
    config.population.peer_count = 30;
    config.population.special = Some(SpecialPeers {
        kind: SpecialKind::NewComers,
        count: 20,
    });
    let mut swarm = Swarm::new(config).unwrap();

    swarm.step().unwrap();
    // Serials 5..=24 start in rounds 4 to 31
    assert_eq!(swarm.active_peer_count(), 10);
    assert_eq!(swarm.peer(PeerId::new(5)).unwrap().lifecycle(), Lifecycle::Inactive);

    for _ in 0..3 {
        swarm.step().unwrap();
    }
    assert_eq!(swarm.active_peer_count(), 12);
    assert!(swarm.peer(PeerId::new(6)).unwrap().is_active());
    assert!(swarm.peer(PeerId::new(6)).unwrap().known_peer_count() > 0);
}

#[test]
fn test_free_riders_upload_nothing() {
    let mut config = small(Strategy::Random);
    config.population.peer_count = 20;
    config.population.special = Some(SpecialPeers {
        kind: SpecialKind::FreeRiders,
        count: 2,
    });
    let mut swarm = Swarm::new(config).unwrap();
    swarm.run_for(2_000).unwrap();

    // Start serial (20 - 2) / 2 = 9
    for serial in 9..=10 {
        assert_eq!(swarm.peer(PeerId::new(serial)).unwrap().uploads(), 0);
    }
    assert!(all_leechers_complete(&swarm));

    let groups = swarm.special_peer_summary();
    assert_eq!(groups[0].factor, 0.0);
    assert_eq!(groups[0].peers, 2);
    assert_eq!(groups[0].upload_sum, 0);
    assert_eq!(groups.iter().map(|group| group.peers).sum::<u32>(), 19);
}
