//! Per-peer protocol state.
//!
//! A `Peer` never holds references to other peers. Every relationship is a
//! `PeerId` resolved through the `PeerRegistry`, so unlinking a departed peer
//! is plain key removal.

mod ordered;

use std::collections::{BTreeMap, HashMap, VecDeque};

use fairswarm_core::{PeerId, PieceIndex, SpecialKind};

pub use ordered::OrderedMap;

use crate::permutation::PiecePermutation;
use crate::request::{GrantCandidate, PendingRequest};

/// Credit granted per transferred piece under the credit strategies.
pub const CREDIT_PER_PIECE: i64 = 10;

/// Whether a peer currently takes part in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not yet reached its start round
    Inactive,
    Active,
    /// Left through churn in the given round; never revived
    Departed(u32),
}

/// Download progress of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Leecher,
    /// Pre-seeded with every piece
    InitialSource,
    /// Completed the file in the given round
    SeederSince(u32),
}

/// One participant of the swarm.
#[derive(Debug, Clone)]
pub struct Peer {
    pub(crate) id: PeerId,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) start_round: u32,
    pub(crate) completion: Completion,

    // Capacities
    pub(crate) down_slots_max: u32,
    pub(crate) down_slots_occupied: u32,
    pub(crate) up_slots_max: u32,
    pub(crate) down_pending_max: u32,
    pub(crate) known_peers_max: u32,

    /// Private rarity ordering, FairE9 family only
    pub(crate) ranking: Option<PiecePermutation>,
    /// Piece -> round obtained; order doubles as the source's rotation queue
    pub(crate) downloaded: OrderedMap<PieceIndex, u32>,

    // Relationships
    /// Peer -> first usable round, in discovery order
    pub(crate) known_peers: OrderedMap<PeerId, u32>,
    /// Known peers without an outstanding request from this peer
    pub(crate) free_peers: VecDeque<PeerId>,
    pub(crate) down_pending: BTreeMap<PeerId, PendingRequest>,
    pub(crate) up_pending: OrderedMap<PeerId, GrantCandidate>,
    /// Credit earned by peers that uploaded to this peer
    pub(crate) credits_pos: HashMap<PeerId, i64>,
    /// Credit owed to peers that downloaded from this peer
    pub(crate) credits_neg: HashMap<PeerId, i64>,

    // Fairness accounting
    pub(crate) uploads: u64,
    pub(crate) upload_histogram: BTreeMap<u32, u64>,
}

impl Peer {
    /// Returns builder for a peer with the given serial.
    pub fn builder(id: PeerId) -> PeerBuilder {
        PeerBuilder::new(id)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn start_round(&self) -> u32 {
        self.start_round
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn is_departed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Departed(_))
    }

    /// Round this peer left the swarm, if it has.
    pub fn departure_round(&self) -> Option<u32> {
        match self.lifecycle {
            Lifecycle::Departed(round) => Some(round),
            _ => None,
        }
    }

    /// Round this peer obtained its last piece; `None` for the source and leechers.
    pub fn completed_round(&self) -> Option<u32> {
        match self.completion {
            Completion::SeederSince(round) => Some(round),
            _ => None,
        }
    }

    pub fn is_initial_source(&self) -> bool {
        self.id.is_initial_source()
    }

    /// True once the peer holds every piece, the initial source included.
    pub fn is_seeder(&self) -> bool {
        self.completion != Completion::Leecher
    }

    /// True once the peer holds at least one piece.
    pub fn is_source(&self) -> bool {
        !self.downloaded.is_empty()
    }

    pub fn has_piece(&self, piece: PieceIndex) -> bool {
        self.downloaded.contains_key(&piece)
    }

    pub fn has_free_down_slot(&self) -> bool {
        self.down_slots_occupied < self.down_slots_max
    }

    pub fn piece_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Pieces held, in the order they were obtained (or rotated).
    pub fn pieces(&self) -> impl Iterator<Item = PieceIndex> + '_ {
        self.downloaded.keys()
    }

    /// Round in which `piece` was obtained.
    pub fn piece_round(&self, piece: PieceIndex) -> Option<u32> {
        self.downloaded.get(&piece).copied()
    }

    pub fn ranking(&self) -> Option<&PiecePermutation> {
        self.ranking.as_ref()
    }

    /// Rarity weight of `piece` under this peer's ordering.
    pub fn weight_of(&self, piece: PieceIndex) -> Option<u32> {
        self.ranking.as_ref()?.weight_of(piece)
    }

    pub fn down_slots_max(&self) -> u32 {
        self.down_slots_max
    }

    pub fn up_slots_max(&self) -> u32 {
        self.up_slots_max
    }

    pub fn down_pending_max(&self) -> u32 {
        self.down_pending_max
    }

    pub fn known_peers_max(&self) -> u32 {
        self.known_peers_max
    }

    pub fn knows(&self, peer: PeerId) -> bool {
        self.known_peers.contains_key(&peer)
    }

    pub fn known_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.known_peers.keys()
    }

    pub fn known_peer_count(&self) -> usize {
        self.known_peers.len()
    }

    pub fn free_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.free_peers.iter().copied()
    }

    pub fn down_pending(&self) -> impl Iterator<Item = (PeerId, &PendingRequest)> + '_ {
        self.down_pending.iter().map(|(peer, request)| (*peer, request))
    }

    pub fn down_pending_count(&self) -> usize {
        self.down_pending.len()
    }

    pub fn has_pending_download_from(&self, peer: PeerId) -> bool {
        self.down_pending.contains_key(&peer)
    }

    pub fn up_pending(&self) -> impl Iterator<Item = &GrantCandidate> + '_ {
        self.up_pending.values()
    }

    pub fn up_pending_count(&self) -> usize {
        self.up_pending.len()
    }

    pub fn has_grant_candidate(&self, requester: PeerId) -> bool {
        self.up_pending.contains_key(&requester)
    }

    /// Credit `peer` earned by uploading to this peer.
    pub fn positive_credit(&self, peer: PeerId) -> Option<i64> {
        self.credits_pos.get(&peer).copied()
    }

    /// Credit this peer earned by uploading to `peer`.
    pub fn negative_credit(&self, peer: PeerId) -> Option<i64> {
        self.credits_neg.get(&peer).copied()
    }

    /// Pieces uploaded to other peers. The initial source does not count.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Uploads keyed by piece, or by rarity position under FairE9.
    pub fn upload_histogram(&self) -> &BTreeMap<u32, u64> {
        &self.upload_histogram
    }

    /// Number of distinct histogram keys served.
    pub fn distinct_uploads(&self) -> usize {
        self.upload_histogram.len()
    }

    /// Rounds from activation to completion; 0 for the source and leechers.
    pub fn latency(&self) -> u32 {
        self.completed_round()
            .map_or(0, |round| (round + 1).saturating_sub(self.start_round))
    }

    /// Turns this peer into the initial source holding all pieces.
    pub(crate) fn make_initial_source(&mut self, piece_count: u32) {
        self.completion = Completion::InitialSource;
        self.down_slots_max = 0;
        self.down_pending_max = 0;
        for piece in PieceIndex::all(piece_count) {
            self.downloaded.insert(piece, 0);
        }
    }

    pub(crate) fn activate(&mut self) {
        self.lifecycle = Lifecycle::Active;
    }

    pub(crate) fn depart(&mut self, round: u32) {
        self.lifecycle = Lifecycle::Departed(round);
    }

    /// Learns `peer` unless already known, full, or `peer` is this peer.
    ///
    /// Seeders learn peers but never queue them for requests.
    pub(crate) fn add_known_peer(&mut self, peer: PeerId, first_use_round: u32) -> bool {
        if self.known_peers.len() >= self.known_peers_max as usize
            || peer == self.id
            || self.known_peers.contains_key(&peer)
        {
            return false;
        }

        self.known_peers.insert(peer, first_use_round);
        if !self.is_seeder() {
            self.free_peers.push_back(peer);
        }
        true
    }

    /// Registers a grant candidate, keeping an existing one for the same piece.
    pub(crate) fn accept_request(&mut self, candidate: GrantCandidate) {
        let replace = self
            .up_pending
            .get(&candidate.requester)
            .is_none_or(|existing| existing.piece != candidate.piece);
        if replace {
            self.up_pending.insert(candidate.requester, candidate);
        }

        self.add_known_peer(candidate.requester, candidate.request_round);
    }

    /// Moves `peer` to the front of the free queue, learning it if needed.
    pub(crate) fn prefer_peer(&mut self, peer: PeerId, round: u32) {
        if self.is_seeder() {
            self.add_known_peer(peer, round);
            return;
        }

        let learned = self.add_known_peer(peer, round);
        if let Some(position) = self.free_peers.iter().position(|p| *p == peer) {
            self.free_peers.remove(position);
            self.free_peers.push_front(peer);
        } else if learned {
            self.free_peers.push_front(peer);
        }
    }

    pub(crate) fn take_free_peer(&mut self, peer: PeerId) -> bool {
        match self.free_peers.iter().position(|p| *p == peer) {
            Some(position) => {
                self.free_peers.remove(position);
                true
            }
            None => false,
        }
    }

    /// Applies a granted piece and returns the peers whose grant queues must
    /// drop this peer because it just became a seeder.
    pub(crate) fn receive_piece(
        &mut self,
        from: PeerId,
        piece: PieceIndex,
        round: u32,
        piece_count: u32,
        record_credit: bool,
    ) -> Vec<PeerId> {
        self.down_slots_occupied += 1;
        self.downloaded.insert(piece, round);

        if !self.is_seeder() && self.knows(from) && !self.free_peers.contains(&from) {
            self.free_peers.push_back(from);
        }
        self.down_pending.remove(&from);

        if record_credit {
            *self.credits_pos.entry(from).or_insert(0) += CREDIT_PER_PIECE;
        }

        if !self.is_seeder() && self.downloaded.len() >= piece_count as usize {
            return self.become_seeder(round);
        }
        Vec::new()
    }

    fn become_seeder(&mut self, round: u32) -> Vec<PeerId> {
        self.completion = Completion::SeederSince(round);
        self.free_peers.clear();
        let abandoned = self.down_pending.keys().copied().collect();
        self.down_pending.clear();
        abandoned
    }

    pub(crate) fn add_negative_credit(&mut self, peer: PeerId) {
        *self.credits_neg.entry(peer).or_insert(0) += CREDIT_PER_PIECE;
    }

    pub(crate) fn record_upload(&mut self, histogram_key: u32) {
        *self.upload_histogram.entry(histogram_key).or_insert(0) += 1;
    }

    /// Removes every trace of a departed peer.
    pub(crate) fn forget_peer(&mut self, peer: PeerId) {
        self.down_pending.remove(&peer);
        self.take_free_peer(peer);
        self.up_pending.remove(&peer);
        self.known_peers.remove(&peer);
        self.credits_pos.remove(&peer);
        self.credits_neg.remove(&peer);
    }

    /// Value of the property a special-peer kind perturbs.
    pub fn special_value(&self, kind: SpecialKind) -> u32 {
        match kind {
            SpecialKind::PendingAndKnown => self.down_pending_max,
            SpecialKind::UpSlots | SpecialKind::FreeRiders => self.up_slots_max,
            SpecialKind::DownSlots => self.down_slots_max,
            SpecialKind::NewComers => self.start_round,
        }
    }

    pub(crate) fn set_special_value(&mut self, kind: SpecialKind, value: u32) {
        match kind {
            SpecialKind::PendingAndKnown => self.down_pending_max = value,
            SpecialKind::UpSlots => self.up_slots_max = value,
            SpecialKind::FreeRiders => self.up_slots_max = 0,
            SpecialKind::DownSlots => self.down_slots_max = value,
            SpecialKind::NewComers => self.start_round = value,
        }
    }
}

/// Builder for configuring a peer before it joins the registry.
#[derive(Debug, Clone)]
pub struct PeerBuilder {
    id: PeerId,
    start_round: u32,
    down_slots: u32,
    up_slots: u32,
    down_pending_max: u32,
    known_peers_max: u32,
    ranking: Option<PiecePermutation>,
}

impl PeerBuilder {
    fn new(id: PeerId) -> Self {
        Self {
            id,
            start_round: 1,
            down_slots: 0,
            up_slots: 0,
            down_pending_max: 0,
            known_peers_max: 0,
            ranking: None,
        }
    }

    /// Sets the round in which the peer activates.
    pub fn start_round(mut self, round: u32) -> Self {
        self.start_round = round;
        self
    }

    pub fn down_slots(mut self, slots: u32) -> Self {
        self.down_slots = slots;
        self
    }

    pub fn up_slots(mut self, slots: u32) -> Self {
        self.up_slots = slots;
        self
    }

    pub fn down_pending_max(mut self, max: u32) -> Self {
        self.down_pending_max = max;
        self
    }

    pub fn known_peers_max(mut self, max: u32) -> Self {
        self.known_peers_max = max;
        self
    }

    /// Sets the private rarity ordering used by the FairE9 family.
    pub fn ranking(mut self, ranking: PiecePermutation) -> Self {
        self.ranking = Some(ranking);
        self
    }

    /// Creates an inactive leecher with the configured settings.
    pub fn build(self) -> Peer {
        Peer {
            id: self.id,
            lifecycle: Lifecycle::Inactive,
            start_round: self.start_round,
            completion: Completion::Leecher,
            down_slots_max: self.down_slots,
            down_slots_occupied: 0,
            up_slots_max: self.up_slots,
            down_pending_max: self.down_pending_max,
            known_peers_max: self.known_peers_max,
            ranking: self.ranking,
            downloaded: OrderedMap::new(),
            known_peers: OrderedMap::new(),
            free_peers: VecDeque::new(),
            down_pending: BTreeMap::new(),
            up_pending: OrderedMap::new(),
            credits_pos: HashMap::new(),
            credits_neg: HashMap::new(),
            uploads: 0,
            upload_histogram: BTreeMap::new(),
        }
    }
}
