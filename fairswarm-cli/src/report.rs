//! Tab-separated rendering of round reports and run summaries.
//!
//! Output goes to stdout so it can be pasted into a spreadsheet; logging
//! stays on stderr.

use std::io::{self, Write};

use fairswarm_core::SwarmConfig;
use fairswarm_sim::{RoundReport, RunSummary, SpecialGroupSummary};

const ROUND_HEADER: &str = "Round\tSeconds\tProgress\tPeers\tSeeds\tSources\tRequests\tUploads\t\
                            Exchanges\tKnown\tUp-pending\tDown-pending\tMin-piece\tBehind-20\tBehind-40";

const SUMMARY_HEADER: &str = "Rounds\tLatency\tLatency stdev\tUp stdev\tUp max\tUp uniq\tSystem\t\
                              Peers\tPieces\tDown pending\tKnown max\tKnown init\tRequest TTL\t\
                              Seeders churn\tSpecial\tRounds exchange\tReq spec\tReq any\tBitmaps";

const COMPARE_HEADER: &str =
    "System\tRounds\tLatency\tLatency stdev\tUp stdev\tUp max\tUp uniq\tReq spec\tReq any\tBitmaps";

pub fn write_round_header(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{ROUND_HEADER}")
}

pub fn write_round(out: &mut impl Write, report: &RoundReport) -> io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.1}\t{:.1}\t{:.1}\t{}\t{}\t{}",
        report.round,
        report.elapsed_secs,
        report.completion_percent,
        report.active_peers,
        report.seeders,
        report.sources,
        report.requests,
        report.uploads,
        report.exchanges,
        report.average_known_peers,
        report.average_up_pending,
        report.average_down_pending,
        report.min_pieces,
        report.behind_20,
        report.behind_40
    )
}

/// Writes the one-line run summary together with the settings that produced it.
pub fn write_summary(
    out: &mut impl Write,
    summary: &RunSummary,
    config: &SwarmConfig,
) -> io::Result<()> {
    let special = config.population.special.map_or(0, |special| special.count);
    writeln!(out)?;
    writeln!(out, "{SUMMARY_HEADER}")?;
    writeln!(
        out,
        "{}\t{:.2}\t{:.2}\t{:.2}\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        summary.rounds,
        summary.average_latency,
        summary.latency_stdev,
        summary.upload_stdev,
        summary.upload_max,
        summary.average_distinct_uploads,
        summary.strategy,
        summary.peer_count,
        summary.piece_count,
        config.protocol.down_pending_max,
        config.protocol.known_peers_max,
        config.protocol.initial_known_peers,
        config.protocol.request_ttl,
        config.protocol.churn_seeder_leave_percent,
        special,
        config.protocol.rounds_per_peer_exchange,
        summary.counters.requests_specific,
        summary.counters.requests_any,
        summary.counters.bitmap_exchanges
    )
}

/// Uploads by rarity position (FairE9 family) or by piece.
pub fn write_histogram(out: &mut impl Write, summary: &RunSummary) -> io::Result<()> {
    let title = if summary.strategy.is_fair_e9() {
        "Uploads by Position"
    } else {
        "Uploads by Piece"
    };
    writeln!(out)?;
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.len()))?;
    for (key, count) in &summary.upload_histogram {
        writeln!(out, "{key}\t{count}")?;
    }
    Ok(())
}

pub fn write_special_groups(out: &mut impl Write, groups: &[SpecialGroupSummary]) -> io::Result<()> {
    let Some(first) = groups.first() else {
        return Ok(());
    };

    writeln!(out)?;
    writeln!(out, "Special peers, {}", first.kind)?;
    writeln!(out, "================================")?;
    writeln!(out, "Factor\tPeers\tLatency sum\tLatency\tUpload sum\tUploads")?;
    for group in groups {
        writeln!(
            out,
            "{:.2}\t{}\t{}\t{:.2}\t{}\t{:.2}",
            group.factor,
            group.peers,
            group.latency_sum,
            group.average_latency(),
            group.upload_sum,
            group.average_uploads()
        )?;
    }
    Ok(())
}

/// One row per strategy, in the order the runs were made.
pub fn write_comparison(out: &mut impl Write, summaries: &[RunSummary]) -> io::Result<()> {
    writeln!(out, "{COMPARE_HEADER}")?;
    for summary in summaries {
        writeln!(
            out,
            "{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{}\t{:.2}\t{}\t{}\t{}",
            summary.strategy,
            summary.rounds,
            summary.average_latency,
            summary.latency_stdev,
            summary.upload_stdev,
            summary.upload_max,
            summary.average_distinct_uploads,
            summary.counters.requests_specific,
            summary.counters.requests_any,
            summary.counters.bitmap_exchanges
        )?;
    }
    Ok(())
}
