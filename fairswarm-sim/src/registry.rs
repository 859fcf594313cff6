//! Arena holding every peer of a swarm, indexed by serial.

use fairswarm_core::PeerId;

use crate::peer::Peer;

/// Owns all peers. Serial `n` lives at index `n - 1`.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a peer; its serial must be the next free one.
    pub(crate) fn push(&mut self, peer: Peer) {
        debug_assert_eq!(peer.id().as_u32() as usize, self.peers.len() + 1);
        self.peers.push(peer);
    }

    fn slot(id: PeerId) -> Option<usize> {
        (id.as_u32() as usize).checked_sub(1)
    }

    /// Looks up a peer; unknown serials yield `None`.
    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(Self::slot(id)?)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        let slot = Self::slot(id)?;
        self.peers.get_mut(slot)
    }

    /// Mutable access to two distinct peers at once.
    pub fn pair_mut(&mut self, first: PeerId, second: PeerId) -> Option<(&mut Peer, &mut Peer)> {
        let a = Self::slot(first)?;
        let b = Self::slot(second)?;
        if a == b || a >= self.peers.len() || b >= self.peers.len() {
            return None;
        }

        if a < b {
            let (left, right) = self.peers.split_at_mut(b);
            Some((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.peers.split_at_mut(a);
            Some((&mut right[0], &mut left[b]))
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers in increasing serial order.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> + '_ {
        self.peers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> + '_ {
        self.peers.iter_mut()
    }

    /// Every serial in increasing order.
    pub fn ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().map(Peer::id)
    }
}
