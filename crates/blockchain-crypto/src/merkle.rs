// blockchain-crypto/src/merkle.rs

use crate::{hash::double_sha256, Hash};

/// Merkle tree over transaction ids.
///
/// Levels are stored bottom up. An odd node at any level is paired with
/// itself, and an empty tree has the zero hash as its root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    pub fn from_hashes(leaves: &[Hash]) -> Self {
        let mut levels = vec![leaves.to_vec()];

        while levels.last().map_or(false, |level| level.len() > 1) {
            let below = &levels[levels.len() - 1];
            let next = below
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    Self::combine_hashes(pair[0], *right)
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first().copied())
            .unwrap_or_else(Hash::zero)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    fn combine_hashes(left: Hash, right: Hash) -> Hash {
        let mut combined = Vec::with_capacity(64);
        combined.extend_from_slice(left.as_bytes());
        combined.extend_from_slice(right.as_bytes());
        double_sha256(&combined)
    }
}

/// Root of the tree built over `leaves`
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    MerkleTree::from_hashes(leaves).root()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash {
        double_sha256(&[n])
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merkle_root(&[]), Hash::zero());
        assert_eq!(merkle_root(&[leaf(1)]), leaf(1));
        assert_eq!(MerkleTree::from_hashes(&[leaf(1)]).depth(), 0);
    }

    #[test]
    fn test_odd_leaf_is_duplicated() {
        let three = MerkleTree::from_hashes(&[leaf(1), leaf(2), leaf(3)]);
        let four = MerkleTree::from_hashes(&[leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(three.root(), four.root());
        assert_eq!(three.leaf_count(), 3);
        assert_eq!(three.depth(), 2);
    }

    #[test]
    fn test_order_matters() {
        assert_ne!(
            merkle_root(&[leaf(1), leaf(2)]),
            merkle_root(&[leaf(2), leaf(1)])
        );
    }
}
