//! Round reports and end-of-run statistics.

use std::collections::BTreeMap;

use fairswarm_core::{SpecialKind, Strategy};
use serde::Serialize;

use crate::registry::PeerRegistry;

/// Global counters accumulated over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwarmCounters {
    /// Requests naming a specific piece
    pub requests_specific: u64,
    /// Requests leaving the piece to the uploader
    pub requests_any: u64,
    /// Comparisons of an uploader's pieces against a requester's
    pub bitmap_exchanges: u64,
}

/// One line of the per-round table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub round: u32,
    pub elapsed_secs: u64,
    pub completion_percent: f64,
    pub active_peers: usize,
    pub seeders: usize,
    /// Active peers holding at least one piece
    pub sources: usize,
    pub requests: u32,
    pub uploads: u32,
    pub exchanges: u32,
    pub average_known_peers: f64,
    pub average_up_pending: f64,
    pub average_down_pending: f64,
    pub min_pieces: usize,
    pub behind_20: usize,
    pub behind_40: usize,
}

impl RoundReport {
    /// True when every active peer holds the whole file.
    pub fn converged(&self) -> bool {
        self.seeders == self.active_peers
    }
}

/// Phase totals of one round, before aggregation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RoundTotals {
    pub requests: u32,
    pub uploads: u32,
    pub exchanges: u32,
    pub seeders: usize,
    pub active_peers: usize,
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub strategy: Strategy,
    pub peer_count: u32,
    pub piece_count: u32,
    pub rounds: u32,
    pub average_latency: f64,
    pub latency_stdev: f64,
    pub upload_stdev: f64,
    pub upload_max: u64,
    /// Distinct histogram keys served per non-source peer
    pub average_distinct_uploads: f64,
    pub counters: SwarmCounters,
    /// Uploads by piece, or by rarity position under the FairE9 family
    pub upload_histogram: BTreeMap<u32, u64>,
}

/// Peers sharing one perturbation factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialGroupSummary {
    pub kind: SpecialKind,
    /// Property value relative to the reference peer
    pub factor: f32,
    pub peers: u32,
    pub latency_sum: u64,
    pub upload_sum: u64,
}

impl SpecialGroupSummary {
    pub fn average_latency(&self) -> f64 {
        ratio(self.latency_sum as f64, f64::from(self.peers))
    }

    pub fn average_uploads(&self) -> f64 {
        ratio(self.upload_sum as f64, f64::from(self.peers))
    }
}

/// Divides, yielding zero for an empty denominator.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Average pieces held, excluding the source's pieces but not the source.
pub(crate) fn average_downloaded(registry: &PeerRegistry) -> f64 {
    let total: usize = registry
        .iter()
        .filter(|peer| !peer.is_initial_source())
        .map(|peer| peer.piece_count())
        .sum();
    ratio(total as f64, registry.len() as f64)
}

pub(crate) fn round_report(
    registry: &PeerRegistry,
    round: u32,
    piece_time_secs: u64,
    piece_count: u32,
    totals: RoundTotals,
) -> RoundReport {
    let population = registry.len() as f64;
    let average = average_downloaded(registry);

    let sources = registry
        .iter()
        .filter(|peer| peer.is_active() && peer.is_source())
        .count();
    let known: usize = registry.iter().map(|peer| peer.known_peer_count()).sum();
    let up_pending: usize = registry.iter().map(|peer| peer.up_pending_count()).sum();
    let down_pending: usize = registry.iter().map(|peer| peer.down_pending_count()).sum();
    let min_pieces = registry
        .iter()
        .map(|peer| peer.piece_count())
        .fold(piece_count as usize, usize::min);

    RoundReport {
        round,
        elapsed_secs: u64::from(round) * piece_time_secs,
        completion_percent: ratio(average * 100.0, f64::from(piece_count)),
        active_peers: totals.active_peers,
        seeders: totals.seeders,
        sources,
        requests: totals.requests,
        uploads: totals.uploads,
        exchanges: totals.exchanges,
        average_known_peers: ratio(known as f64, population),
        average_up_pending: ratio(up_pending as f64, population),
        average_down_pending: ratio(down_pending as f64, population),
        min_pieces,
        behind_20: peers_behind(registry, (average - 20.0) as i64),
        behind_40: peers_behind(registry, (average - 40.0) as i64),
    }
}

/// Peers holding fewer than `threshold` pieces.
fn peers_behind(registry: &PeerRegistry, threshold: i64) -> usize {
    registry
        .iter()
        .filter(|peer| (peer.piece_count() as i64) < threshold)
        .count()
}

pub(crate) fn run_summary(
    registry: &PeerRegistry,
    strategy: Strategy,
    piece_count: u32,
    rounds: u32,
    counters: SwarmCounters,
) -> RunSummary {
    let population = registry.len() as f64;
    let others = population - 1.0;

    let (latency_sum, latency_count) = registry
        .iter()
        .map(|peer| peer.latency())
        .filter(|latency| *latency > 0)
        .fold((0u64, 0u64), |(sum, count), latency| {
            (sum + u64::from(latency), count + 1)
        });
    let average_latency = ratio(latency_sum as f64, latency_count as f64);

    let non_source = || registry.iter().filter(|peer| !peer.is_initial_source());

    let latency_squares: f64 = non_source()
        .map(|peer| (f64::from(peer.latency()) - average_latency).powi(2))
        .sum();

    let expected_uploads = ratio(others * f64::from(piece_count), population);
    let upload_squares: f64 = non_source()
        .map(|peer| (peer.uploads() as f64 - expected_uploads).powi(2))
        .sum();

    let distinct: usize = non_source().map(|peer| peer.distinct_uploads()).sum();

    let mut upload_histogram = BTreeMap::new();
    for peer in registry.iter() {
        for (key, count) in peer.upload_histogram() {
            *upload_histogram.entry(*key).or_insert(0) += count;
        }
    }

    RunSummary {
        strategy,
        peer_count: registry.len() as u32,
        piece_count,
        rounds,
        average_latency,
        latency_stdev: ratio(latency_squares, others).sqrt(),
        upload_stdev: ratio(upload_squares, others).sqrt(),
        upload_max: non_source().map(|peer| peer.uploads()).max().unwrap_or(0),
        average_distinct_uploads: ratio(distinct as f64, others),
        counters,
        upload_histogram,
    }
}
