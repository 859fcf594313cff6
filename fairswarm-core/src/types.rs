//! Identifiers and strategy selectors shared by every fairswarm crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 1-based serial number of a peer.
///
/// Serial 1 is always the initial source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The distinguished peer that starts with every piece.
    pub const INITIAL_SOURCE: PeerId = PeerId(1);

    /// Creates a peer identifier from its serial.
    pub fn new(serial: u32) -> Self {
        Self(serial)
    }

    /// Returns the underlying serial.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// True for the initial source.
    pub fn is_initial_source(self) -> bool {
        self == Self::INITIAL_SOURCE
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// 1-based index of a piece of the shared file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from a 1-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Iterates every piece of a file split into `piece_count` pieces.
    pub fn all(piece_count: u32) -> impl Iterator<Item = PieceIndex> {
        (1..=piece_count).map(PieceIndex)
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incentive strategy run by every peer of a swarm.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Random selection of peers and pieces.
    #[value(name = "random")]
    Random,
    /// FairE9 without eviction of known peers whose requests time out.
    #[value(name = "faire9")]
    FairE9,
    /// FairE9 that permanently drops peers whose requests time out.
    #[value(name = "faire9plus")]
    FairE9Plus,
    /// FairE9 with butterfly rarity permutations.
    #[value(name = "faire9butterfly")]
    FairE9Butterfly,
    /// eMule-style waiting time discounted by credit.
    #[value(name = "emule")]
    Emule,
    /// BitTorrent-style tit-for-tat.
    #[value(name = "bt")]
    Bt,
}

impl Strategy {
    /// Every strategy, in the order reports list them.
    pub const ALL: [Strategy; 6] = [
        Strategy::Random,
        Strategy::FairE9,
        Strategy::FairE9Plus,
        Strategy::FairE9Butterfly,
        Strategy::Emule,
        Strategy::Bt,
    ];

    /// True for the weight/permutation based family.
    pub fn is_fair_e9(self) -> bool {
        matches!(
            self,
            Strategy::FairE9 | Strategy::FairE9Plus | Strategy::FairE9Butterfly
        )
    }

    /// Upper-case name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Random => "RANDOM",
            Strategy::FairE9 => "FAIRE9",
            Strategy::FairE9Plus => "FAIRE9PLUS",
            Strategy::FairE9Butterfly => "FAIRE9BUTTERFLY",
            Strategy::Emule => "EMULE",
            Strategy::Bt => "BT",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid strategy: {s}"))
    }
}

/// Property perturbed on a contiguous range of peers before a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKind {
    /// Multiplies both the known-peers and the pending-downloads maxima.
    PendingAndKnown,
    /// Multiplies upload slots; the last two bands are 0.75 and 0 (free riders).
    UpSlots,
    /// Multiplies download slots.
    DownSlots,
    /// Sets upload slots to zero.
    FreeRiders,
    /// Delays activation in ten staggered bands.
    NewComers,
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpecialKind::PendingAndKnown => "PENDING_AND_KNOWN",
            SpecialKind::UpSlots => "UP_SLOTS",
            SpecialKind::DownSlots => "DOWN_SLOTS",
            SpecialKind::FreeRiders => "FREE_RIDERS",
            SpecialKind::NewComers => "NEW_COMERS",
        };
        f.write_str(name)
    }
}
