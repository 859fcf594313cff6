//! Errors surfaced by the simulation engine.

use fairswarm_core::ConfigError;
use thiserror::Error;

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration was rejected before the swarm was built
    #[error("Invalid swarm configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Swarm did not converge within the caller's round limit
    #[error("Swarm did not converge within {rounds} rounds")]
    RoundLimitExceeded {
        /// Rounds executed before giving up
        rounds: u32,
    },

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },
}
