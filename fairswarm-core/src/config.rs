//! Centralized configuration for fairswarm runs.
//!
//! A run reads its configuration once and never mutates it. Defaults mirror
//! the reference experiment: a large butterfly swarm with no churn.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{SpecialKind, Strategy};

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("Invalid value for {variable}: {value}")]
    InvalidEnvValue { variable: String, value: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Central configuration for a single simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub population: PopulationConfig,
    pub protocol: ProtocolConfig,
    pub simulation: SimulationConfig,
}

/// Mean and spread from which a per-peer slot count is sampled.
///
/// The spread is used as a variance: samples are `mean + N(0,1) * sqrt(spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotDistribution {
    pub mean: u32,
    pub spread: u32,
}

impl SlotDistribution {
    /// Every peer gets exactly `slots`.
    pub fn fixed(slots: u32) -> Self {
        Self {
            mean: slots,
            spread: 0,
        }
    }
}

/// One-time perturbation of a contiguous range of peers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecialPeers {
    pub kind: SpecialKind,
    pub count: u32,
}

/// Who takes part in the swarm and how much bandwidth they have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Number of peers, the initial source included
    pub peer_count: u32,
    /// Number of pieces in the shared file
    pub piece_count: u32,
    /// Download slots of a normal peer
    pub down_slots: SlotDistribution,
    /// Upload slots of a normal peer
    pub up_slots: SlotDistribution,
    /// Upload slots of the initial source
    pub source_up_slots: u32,
    /// Optional special peers, applied once at setup
    pub special: Option<SpecialPeers>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            peer_count: 10_000,
            piece_count: 200,
            down_slots: SlotDistribution {
                mean: 10,
                spread: 4,
            },
            up_slots: SlotDistribution {
                mean: 10,
                spread: 4,
            },
            source_up_slots: 30,
            special: None,
        }
    }
}

/// Protocol parameters shared by every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Incentive strategy run by every peer
    pub strategy: Strategy,
    /// Maximum number of peers a peer may know
    pub known_peers_max: u32,
    /// Maximum number of outstanding download requests
    pub down_pending_max: u32,
    /// Rounds a request may stay unanswered
    pub request_ttl: u32,
    /// Chance (percent) that a seeder leaves in a round
    pub churn_seeder_leave_percent: u32,
    /// A peer exchange happens once per this many rounds on average
    pub rounds_per_peer_exchange: u32,
    /// Known peers sampled when a peer activates
    pub initial_known_peers: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::FairE9Butterfly,
            known_peers_max: 20,
            down_pending_max: 100,
            request_ttl: 200,
            churn_seeder_leave_percent: 0,
            rounds_per_peer_exchange: 2,
            initial_known_peers: 5,
        }
    }
}

/// Run-level settings that do not change protocol behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the run's random source
    pub seed: u64,
    /// File size in megabytes, used for the elapsed-time column only
    pub file_size_mb: u32,
    /// Speed of a single slot in kbit/s, used for the elapsed-time column only
    pub slot_speed_kbps: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            file_size_mb: 250,
            slot_speed_kbps: 500,
        }
    }
}

impl SimulationConfig {
    /// Seconds needed to move one piece over one slot.
    pub fn piece_time_secs(&self, piece_count: u32) -> u64 {
        if piece_count == 0 || self.slot_speed_kbps == 0 {
            return 0;
        }
        let piece_size_bytes = u64::from(self.file_size_mb) * 1_000_000 / u64::from(piece_count);
        piece_size_bytes * 8 / (u64::from(self.slot_speed_kbps) * 1000)
    }
}

impl SwarmConfig {
    /// Small swarm for tests and demos: one source, nine leechers, five pieces.
    pub fn small_swarm(strategy: Strategy) -> Self {
        Self {
            population: PopulationConfig {
                peer_count: 10,
                piece_count: 5,
                down_slots: SlotDistribution::fixed(2),
                up_slots: SlotDistribution::fixed(2),
                source_up_slots: 4,
                special: None,
            },
            protocol: ProtocolConfig {
                strategy,
                known_peers_max: 5,
                down_pending_max: 5,
                request_ttl: 50,
                churn_seeder_leave_percent: 0,
                rounds_per_peer_exchange: 1,
                initial_known_peers: 1,
            },
            simulation: SimulationConfig::default(),
        }
    }

    /// Loads a JSON configuration file; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` - File cannot be read
    /// - `ConfigError::Parse` - File is not valid configuration JSON
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidEnvValue` - A set variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `FAIRSWARM_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidEnvValue` - A present variable does not parse
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FAIRSWARM_PEERS") {
            self.population.peer_count = parse_env("FAIRSWARM_PEERS", &value)?;
        }
        if let Some(value) = lookup("FAIRSWARM_PIECES") {
            self.population.piece_count = parse_env("FAIRSWARM_PIECES", &value)?;
        }
        if let Some(value) = lookup("FAIRSWARM_STRATEGY") {
            self.protocol.strategy = parse_env("FAIRSWARM_STRATEGY", &value)?;
        }
        if let Some(value) = lookup("FAIRSWARM_REQUEST_TTL") {
            self.protocol.request_ttl = parse_env("FAIRSWARM_REQUEST_TTL", &value)?;
        }
        if let Some(value) = lookup("FAIRSWARM_CHURN_PERCENT") {
            self.protocol.churn_seeder_leave_percent =
                parse_env("FAIRSWARM_CHURN_PERCENT", &value)?;
        }
        if let Some(value) = lookup("FAIRSWARM_SEED") {
            self.simulation.seed = parse_env("FAIRSWARM_SEED", &value)?;
        }
        Ok(())
    }

    /// Rejects configurations the round loop cannot run.
    ///
    /// Special-peer ranges larger than the population are a caller
    /// precondition and are not checked here.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` - A parameter is outside its usable range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };

        if self.population.peer_count == 0 {
            return invalid("peer_count must include at least the initial source");
        }
        if self.population.piece_count == 0 {
            return invalid("piece_count must be positive");
        }
        if self.protocol.rounds_per_peer_exchange == 0 {
            return invalid("rounds_per_peer_exchange must be positive");
        }
        if self.protocol.request_ttl == 0 {
            return invalid("request_ttl must be positive");
        }
        if self.protocol.churn_seeder_leave_percent > 100 {
            return invalid("churn_seeder_leave_percent cannot exceed 100");
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(variable: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            variable: variable.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_default_matches_reference_experiment() {
        let config = SwarmConfig::default();
        assert_eq!(config.population.peer_count, 10_000);
        assert_eq!(config.population.piece_count, 200);
        assert_eq!(config.protocol.strategy, Strategy::FairE9Butterfly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_piece_time_matches_reference_formula() {
        let simulation = SimulationConfig::default();
        // 250 MB / 200 pieces = 1.25 MB, at 500 kbit/s = 20 seconds
        assert_eq!(simulation.piece_time_secs(200), 20);
        assert_eq!(simulation.piece_time_secs(0), 0);
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let mut config = SwarmConfig::small_swarm(Strategy::Random);
        config.protocol.rounds_per_peer_exchange = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        let mut config = SwarmConfig::small_swarm(Strategy::Random);
        config.protocol.churn_seeder_leave_percent = 101;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::small_swarm(Strategy::Random);
        config.population.piece_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_leaves_special_range_to_caller() {
        let mut config = SwarmConfig::small_swarm(Strategy::Random);
        config.population.special = Some(SpecialPeers {
            kind: SpecialKind::FreeRiders,
            count: 1_000,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FAIRSWARM_PEERS", "50"),
            ("FAIRSWARM_STRATEGY", "emule"),
            ("FAIRSWARM_SEED", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = SwarmConfig::default();
        config
            .apply_env_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.population.peer_count, 50);
        assert_eq!(config.protocol.strategy, Strategy::Emule);
        assert_eq!(config.simulation.seed, 7);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = SwarmConfig::default();
        let result = config.apply_env_overrides(|name| {
            (name == "FAIRSWARM_PIECES").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnvValue { .. })));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "protocol": { "strategy": "bt", "request_ttl": 30 } }"#;
        let config: SwarmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.protocol.strategy, Strategy::Bt);
        assert_eq!(config.protocol.request_ttl, 30);
        assert_eq!(config.protocol.known_peers_max, 20);
        assert_eq!(config.population.piece_count, 200);
    }
}
