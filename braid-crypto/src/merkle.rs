use braid_types::primitives::{Hash, ZERO_HASH};

use crate::hash::blake3_hash_multi;

/// Root of a binary Merkle tree over `leaves`.
///
/// Odd nodes are paired with themselves. The empty tree has the zero hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return ZERO_HASH;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                blake3_hash_multi(&[&pair[0], right])
            })
            .collect();
    }
    level[0]
}
