//! Fairswarm Core - shared building blocks of the swarm fairness simulator
//!
//! This crate holds what every other fairswarm crate agrees on: peer and
//! piece identifiers, the incentive strategy selector, the run configuration
//! and tracing setup. It contains no simulation logic.

pub mod config;
pub mod tracing_setup;
pub mod types;

pub use config::{
    ConfigError, PopulationConfig, ProtocolConfig, SimulationConfig, SlotDistribution,
    SpecialPeers, SwarmConfig,
};
pub use types::{PeerId, PieceIndex, SpecialKind, Strategy};
