//! One-time perturbation of a contiguous range of peers.
//!
//! A range of `count` serials centred in the population gets a property
//! scaled in bands relative to the reference peer (serial 2). Serials that
//! fall outside the population are skipped.

use fairswarm_core::{PeerId, SpecialKind, SpecialPeers};
use tracing::debug;

use crate::peer::Peer;
use crate::registry::PeerRegistry;

use super::stats::SpecialGroupSummary;

/// Serial whose values define "normal".
pub const REFERENCE_PEER: PeerId = PeerId(2);

const SCALE_FACTORS: [f32; 6] = [0.2, 0.4, 0.5, 2.0, 3.0, 5.0];
const UP_SLOT_FACTORS: [f32; 6] = [0.2, 0.4, 0.5, 2.0, 0.75, 0.0];
const NEW_COMER_BANDS: u32 = 10;
const NEW_COMER_DELAY: u32 = 3;

/// Walks the perturbed serial range, skipping serials without a peer.
struct RangeCursor {
    next: i64,
}

impl RangeCursor {
    fn next_peer<'a>(&mut self, registry: &'a mut PeerRegistry) -> Option<&'a mut Peer> {
        let serial = u32::try_from(self.next).ok();
        self.next += 1;
        registry.get_mut(PeerId::new(serial?))
    }
}

/// Applies the perturbation to the freshly built population.
pub(crate) fn apply(registry: &mut PeerRegistry, special: SpecialPeers) {
    let Some(normal) = registry.get(REFERENCE_PEER).cloned() else {
        return;
    };

    let population = registry.len() as i64;
    let mut cursor = RangeCursor {
        next: (population - i64::from(special.count)) / 2,
    };

    match special.kind {
        SpecialKind::PendingAndKnown => {
            let band = special.count / SCALE_FACTORS.len() as u32;
            for factor in SCALE_FACTORS {
                let known = scale(factor, normal.known_peers_max);
                let pending = scale(factor, normal.down_pending_max);
                for _ in 0..band {
                    if let Some(peer) = cursor.next_peer(registry) {
                        peer.known_peers_max = known;
                        peer.set_special_value(SpecialKind::PendingAndKnown, pending);
                    }
                }
            }
        }
        SpecialKind::UpSlots | SpecialKind::DownSlots => {
            let factors = if special.kind == SpecialKind::UpSlots {
                UP_SLOT_FACTORS
            } else {
                SCALE_FACTORS
            };
            let band = special.count / factors.len() as u32;
            let normal_value = normal.special_value(special.kind);
            for factor in factors {
                let value = scale(factor, normal_value);
                for _ in 0..band {
                    if let Some(peer) = cursor.next_peer(registry) {
                        peer.set_special_value(special.kind, value);
                    }
                }
            }
        }
        SpecialKind::FreeRiders => {
            for _ in 0..special.count {
                if let Some(peer) = cursor.next_peer(registry) {
                    peer.set_special_value(SpecialKind::FreeRiders, 0);
                }
            }
        }
        SpecialKind::NewComers => {
            let band = special.count / NEW_COMER_BANDS;
            for j in 1..=NEW_COMER_BANDS {
                for _ in 0..band {
                    if let Some(peer) = cursor.next_peer(registry) {
                        peer.set_special_value(SpecialKind::NewComers, 1 + j * NEW_COMER_DELAY);
                    }
                }
            }
        }
    }

    debug!("Applied {} special peers ({:?})", special.count, special.kind);
}

/// Truncating float scaling, as the perturbation bands define it.
fn scale(factor: f32, value: u32) -> u32 {
    (factor * value as f32) as u32
}

/// Groups non-source peers by their value relative to the reference peer.
///
/// Returns nothing when the reference peer is missing or its value is zero.
pub(crate) fn summarize(registry: &PeerRegistry, kind: SpecialKind) -> Vec<SpecialGroupSummary> {
    let Some(normal) = registry.get(REFERENCE_PEER).map(|peer| peer.special_value(kind)) else {
        return Vec::new();
    };
    if normal == 0 {
        return Vec::new();
    }

    let mut groups: Vec<SpecialGroupSummary> = Vec::new();
    for peer in registry.iter().filter(|peer| !peer.is_initial_source()) {
        let factor = peer.special_value(kind) as f32 / normal as f32;
        let index = match groups.iter().position(|group| group.factor == factor) {
            Some(index) => index,
            None => {
                groups.push(SpecialGroupSummary {
                    kind,
                    factor,
                    peers: 0,
                    latency_sum: 0,
                    upload_sum: 0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[index];
        group.peers += 1;
        group.latency_sum += u64::from(peer.latency());
        group.upload_sum += peer.uploads();
    }

    groups.sort_by(|a, b| a.factor.total_cmp(&b.factor));
    groups
}
