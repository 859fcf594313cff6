//! CLI command implementations

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use fairswarm_core::{SpecialKind, SpecialPeers, Strategy, SwarmConfig};
use fairswarm_sim::{RunSummary, Swarm};
use tracing::info;

use crate::report;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one strategy and print the per-round table
    Run {
        #[command(flatten)]
        swarm: SwarmArgs,
        /// Print uploads by rarity position (or by piece)
        #[arg(long)]
        histogram: bool,
        /// Emit the summary as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Run every strategy on the same population and seed
    Compare {
        #[command(flatten)]
        swarm: SwarmArgs,
        /// Emit the summaries as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Population and protocol flags shared by every command.
///
/// Values are layered: defaults or `--config`, then `FAIRSWARM_*`
/// environment variables, then these flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SwarmArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Incentive strategy
    #[arg(short, long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Number of peers, the initial source included
    #[arg(short, long)]
    pub peers: Option<u32>,

    /// Number of pieces in the shared file
    #[arg(long)]
    pub pieces: Option<u32>,

    /// Seed for the run's random source
    #[arg(long)]
    pub seed: Option<u64>,

    /// Chance (percent) that a seeder leaves in a round
    #[arg(long)]
    pub churn: Option<u32>,

    /// Property to perturb on a range of peers
    #[arg(long, value_enum, requires = "special_count")]
    pub special: Option<SpecialKind>,

    /// Number of special peers
    #[arg(long, requires = "special")]
    pub special_count: Option<u32>,

    /// Give up after this many rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,
}

impl SwarmArgs {
    /// Resolves the layered configuration and validates it.
    ///
    /// # Errors
    /// - Configuration file cannot be read or parsed
    /// - An environment override does not parse
    /// - The resulting configuration is invalid
    pub fn load_config(&self) -> anyhow::Result<SwarmConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = SwarmConfig::from_json_file(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                config.apply_env_overrides(|name| std::env::var(name).ok())?;
                config
            }
            None => SwarmConfig::from_env()?,
        };
        self.apply_flags(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_flags(&self, config: &mut SwarmConfig) {
        if let Some(strategy) = self.strategy {
            config.protocol.strategy = strategy;
        }
        if let Some(peers) = self.peers {
            config.population.peer_count = peers;
        }
        if let Some(pieces) = self.pieces {
            config.population.piece_count = pieces;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(churn) = self.churn {
            config.protocol.churn_seeder_leave_percent = churn;
        }
        if let (Some(kind), Some(count)) = (self.special, self.special_count) {
            config.population.special = Some(SpecialPeers { kind, count });
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            swarm,
            histogram,
            json,
        } => run_swarm(&swarm, histogram, json),
        Commands::Compare { swarm, json } => compare_strategies(&swarm, json),
    }
}

/// Runs one swarm, streaming the round table to stdout.
///
/// # Errors
/// - Configuration errors from `SwarmArgs::load_config`
/// - `SimulationError` - Round limit exceeded or too many invariant violations
/// - Writing to stdout failed
pub fn run_swarm(args: &SwarmArgs, histogram: bool, json: bool) -> anyhow::Result<()> {
    let config = args.load_config()?;
    let mut swarm = Swarm::new(config.clone())?;
    swarm.add_default_invariants();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !json {
        report::write_round_header(&mut out)?;
    }
    let mut write_error = None;
    let summary = swarm.run_with(args.max_rounds, |round| {
        if json || write_error.is_some() {
            return;
        }
        if let Err(error) = report::write_round(&mut out, round) {
            write_error = Some(error);
        }
    })?;
    if let Some(error) = write_error {
        return Err(error.into());
    }

    let groups = swarm.special_peer_summary();
    if json {
        let document = serde_json::json!({
            "summary": summary,
            "special_peers": groups,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&document)?)?;
        return Ok(());
    }

    if histogram {
        report::write_histogram(&mut out, &summary)?;
    }
    report::write_special_groups(&mut out, &groups)?;
    report::write_summary(&mut out, &summary, &config)?;
    out.flush()?;
    Ok(())
}

/// Runs all six strategies on one configuration and tabulates their summaries.
///
/// # Errors
/// - Configuration errors from `SwarmArgs::load_config`
/// - Any strategy's run failed
/// - Writing to stdout failed
pub fn compare_strategies(args: &SwarmArgs, json: bool) -> anyhow::Result<()> {
    let base = args.load_config()?;
    let mut summaries: Vec<RunSummary> = Vec::with_capacity(Strategy::ALL.len());

    for strategy in Strategy::ALL {
        let mut config = base.clone();
        config.protocol.strategy = strategy;

        let mut swarm = Swarm::new(config)?;
        let summary = swarm
            .run_with(args.max_rounds, |_| {})
            .with_context(|| format!("{strategy} run failed"))?;
        info!("{} finished in {} rounds", strategy, summary.rounds);
        summaries.push(summary);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&summaries)?)?;
    } else {
        report::write_comparison(&mut out, &summaries)?;
    }
    out.flush()?;
    Ok(())
}
