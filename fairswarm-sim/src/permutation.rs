//! Per-peer piece rarity orderings.
//!
//! Every FairE9 peer holds a private bijection between pieces and weights.
//! Weight 1 is the piece the peer treats as rarest. The butterfly generator
//! derives the bijection from the bits of a seed so that peers with different
//! low-order bits diverge near the top of the recursion.

use fairswarm_core::PieceIndex;

use crate::rng::DeterministicRng;

/// Builds the butterfly permutation of `1..=piece_count` for `seed`.
///
/// Element `i` of the result is the value placed at 1-based position
/// `i + 1`. Each level of the recursion consumes the lowest unused bit of the
/// seed: a zero bit pulls the even-offset elements of the range to the front,
/// a one bit pulls the odd-offset elements. Seeds in `[0, 2^(P-1))` yield
/// pairwise distinct permutations.
pub fn generate(piece_count: u32, seed: u64) -> Vec<u32> {
    let mut values: Vec<u32> = (1..=piece_count).collect();
    if values.len() > 1 {
        let last = values.len() - 1;
        interleave(&mut values, 0, last, seed);
    }
    values
}

fn interleave(values: &mut Vec<u32>, from: usize, to: usize, seed: u64) -> u64 {
    if to <= from {
        return seed;
    }

    let even_first = seed & 1 == 0;
    let remaining = seed >> 1;
    let mid = from + (to - from) / 2;

    if even_first {
        // First element already sits at the front
        for i in 1..=(to - from) / 2 {
            let element = values.remove(from + 2 * i);
            values.insert(from + i, element);
        }
    } else {
        for i in 1..=(to - from + 1) / 2 {
            let element = values.remove(from + 2 * i - 1);
            values.insert(from + i - 1, element);
        }
    }

    let remaining = interleave(values, from, mid, remaining);
    interleave(values, mid + 1, to, remaining)
}

/// Draws a butterfly seed covering every permutation of `piece_count` pieces.
pub fn random_seed(piece_count: u32, rng: &mut DeterministicRng) -> u64 {
    let raw = rng.random_u64();
    if piece_count >= 64 {
        raw
    } else {
        raw & ((1u64 << piece_count) - 1)
    }
}

/// A peer's private rarity ordering and its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiecePermutation {
    /// `weight_by_piece[p - 1]` is the weight of piece `p`
    weight_by_piece: Vec<u32>,
    /// `piece_by_weight[w - 1]` is the piece with weight `w`
    piece_by_weight: Vec<u32>,
}

impl PiecePermutation {
    /// Wraps a weight table, rejecting anything that is not a bijection onto `1..=len`.
    pub fn from_weights(weight_by_piece: Vec<u32>) -> Option<Self> {
        let len = weight_by_piece.len();
        let mut piece_by_weight = vec![0u32; len];

        for (offset, &weight) in weight_by_piece.iter().enumerate() {
            let slot = (weight as usize).checked_sub(1)?;
            if slot >= len || piece_by_weight[slot] != 0 {
                return None;
            }
            piece_by_weight[slot] = offset as u32 + 1;
        }

        Some(Self {
            weight_by_piece,
            piece_by_weight,
        })
    }

    /// Butterfly ordering for `seed`.
    pub fn butterfly(piece_count: u32, seed: u64) -> Self {
        Self::from_bijection(generate(piece_count, seed))
    }

    /// Uniformly random ordering built with an inside-out shuffle.
    pub fn shuffled(piece_count: u32, rng: &mut DeterministicRng) -> Self {
        let size = piece_count as usize;
        let mut weights = vec![0u32; size + 1];

        for i in 1..=size {
            let pos = rng.random_range(1, i as u64 + 1) as usize;
            if pos == i {
                weights[i] = i as u32;
            } else {
                weights[i] = weights[pos];
                weights[pos] = i as u32;
            }
        }

        weights.remove(0);
        Self::from_bijection(weights)
    }

    // Generators above only ever produce bijections
    fn from_bijection(weight_by_piece: Vec<u32>) -> Self {
        let mut piece_by_weight = vec![0u32; weight_by_piece.len()];
        for (offset, &weight) in weight_by_piece.iter().enumerate() {
            piece_by_weight[weight as usize - 1] = offset as u32 + 1;
        }
        Self {
            weight_by_piece,
            piece_by_weight,
        }
    }

    /// Number of pieces covered.
    pub fn len(&self) -> usize {
        self.weight_by_piece.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weight_by_piece.is_empty()
    }

    /// Weight of `piece`, or `None` outside `1..=len`.
    pub fn weight_of(&self, piece: PieceIndex) -> Option<u32> {
        let slot = (piece.as_u32() as usize).checked_sub(1)?;
        self.weight_by_piece.get(slot).copied()
    }

    /// Pieces from rarest (weight 1) to most common.
    pub fn pieces_by_weight(&self) -> impl Iterator<Item = PieceIndex> + '_ {
        self.piece_by_weight.iter().copied().map(PieceIndex::new)
    }

    /// Raw weights in piece order.
    pub fn weights(&self) -> &[u32] {
        &self.weight_by_piece
    }

    /// True when both tables are mutual inverses over `1..=len`.
    pub fn is_valid(&self) -> bool {
        let len = self.len();
        if self.piece_by_weight.len() != len {
            return false;
        }
        self.weight_by_piece.iter().enumerate().all(|(offset, &weight)| {
            weight >= 1
                && weight as usize <= len
                && self.piece_by_weight[weight as usize - 1] == offset as u32 + 1
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_four_pieces_matches_reference_enumeration() {
        let expected = [
            [1, 3, 2, 4],
            [2, 4, 1, 3],
            [3, 1, 2, 4],
            [4, 2, 1, 3],
            [1, 3, 4, 2],
            [2, 4, 3, 1],
            [3, 1, 4, 2],
            [4, 2, 3, 1],
        ];

        for (seed, expected) in expected.iter().enumerate() {
            assert_eq!(generate(4, seed as u64), expected.to_vec(), "seed {seed}");
        }
    }

    #[test]
    fn test_low_bit_diverges_at_root() {
        for seed in 0..8u64 {
            if seed & 1 == 0 {
                assert_ne!(generate(4, seed), generate(4, seed | 1));
            }
        }
    }

    #[test]
    fn test_odd_sizes() {
        assert_eq!(generate(3, 0), vec![1, 3, 2]);
        assert_eq!(generate(3, 1), vec![2, 1, 3]);
        assert_eq!(generate(3, 2), vec![3, 1, 2]);
        assert_eq!(generate(3, 3), vec![1, 2, 3]);
        assert_eq!(generate(5, 0), vec![1, 5, 3, 2, 4]);
        assert_eq!(generate(1, 0), vec![1]);
        assert_eq!(generate(2, 1), vec![2, 1]);
        assert!(generate(0, 7).is_empty());
    }

    #[test]
    fn test_seed_space_gives_distinct_permutations() {
        for piece_count in 1..=8u32 {
            let seeds = 1u64 << (piece_count - 1);
            let distinct: HashSet<Vec<u32>> =
                (0..seeds).map(|seed| generate(piece_count, seed)).collect();
            assert_eq!(distinct.len() as u64, seeds, "P = {piece_count}");
        }
    }

    #[test]
    fn test_inverse_lookup() {
        let permutation = PiecePermutation::butterfly(4, 1);
        // [2, 4, 1, 3]: piece 3 has weight 1
        assert_eq!(permutation.weight_of(PieceIndex::new(3)), Some(1));
        assert_eq!(permutation.weight_of(PieceIndex::new(0)), None);
        assert_eq!(permutation.weight_of(PieceIndex::new(5)), None);
        let order: Vec<u32> = permutation.pieces_by_weight().map(|p| p.as_u32()).collect();
        assert_eq!(order, vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_from_weights_rejects_non_bijections() {
        assert!(PiecePermutation::from_weights(vec![1, 1, 2]).is_none());
        assert!(PiecePermutation::from_weights(vec![0, 1]).is_none());
        assert!(PiecePermutation::from_weights(vec![1, 3]).is_none());
        assert!(PiecePermutation::from_weights(vec![2, 1]).is_some());
    }

    #[test]
    fn test_random_seed_respects_piece_count() {
        let mut rng = DeterministicRng::from_seed(3);
        for _ in 0..100 {
            assert!(random_seed(5, &mut rng) < 32);
        }
    }

    proptest! {
        #[test]
        fn butterfly_is_bijection(piece_count in 1u32..=96, seed in any::<u64>()) {
            let permutation = PiecePermutation::butterfly(piece_count, seed);
            prop_assert_eq!(permutation.len(), piece_count as usize);
            prop_assert!(permutation.is_valid());
        }

        #[test]
        fn shuffle_is_bijection(piece_count in 0u32..=64, rng_seed in any::<u64>()) {
            let mut rng = DeterministicRng::from_seed(rng_seed);
            let permutation = PiecePermutation::shuffled(piece_count, &mut rng);
            prop_assert!(permutation.is_valid());
            let rebuilt = PiecePermutation::from_weights(permutation.weights().to_vec());
            prop_assert_eq!(rebuilt, Some(permutation));
        }
    }
}
