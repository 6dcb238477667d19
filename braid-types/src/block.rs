use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;
use crate::tx::Transaction;

/// Header of a block on any braid chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: Height,
    #[serde(with = "crate::primitives::serde_hex")]
    pub prev_hash: Hash,
    pub timestamp: Timestamp,
    /// Address of the validator that produced the block.
    #[serde(with = "crate::primitives::serde_hex")]
    pub proposer: Address,
    /// Merkle root of the transaction hashes.
    #[serde(with = "crate::primitives::serde_hex")]
    pub tx_root: Hash,
}

impl BlockHeader {
    /// Deterministic header hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.chain_id.len() as u32).to_le_bytes());
        hasher.update(self.chain_id.as_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.prev_hash);
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&self.proposer);
        hasher.update(&self.tx_root);
        *hasher.finalize().as_bytes()
    }
}

/// A block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn height(&self) -> Height {
        self.header.height
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// A committed transaction together with where it landed.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct IndexedTx {
    pub chain_id: String,
    pub height: Height,
    #[serde(with = "crate::primitives::serde_hex")]
    pub block_hash: Hash,
    pub tx: Transaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(height: Height) -> BlockHeader {
        BlockHeader {
            chain_id: "braid-main".to_string(),
            height,
            prev_hash: [0u8; 32],
            timestamp: 1_700_000_000,
            proposer: [1u8; 20],
            tx_root: [2u8; 32],
        }
    }

    #[test]
    fn test_header_hash_deterministic() {
        assert_eq!(make_header(5).hash(), make_header(5).hash());
    }

    #[test]
    fn test_header_hash_covers_fields() {
        let base = make_header(5);
        let mut other = base.clone();
        other.height = 6;
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.chain_id = "child-1".to_string();
        assert_ne!(base.hash(), other.hash());

        let mut other = base.clone();
        other.proposer = [9u8; 20];
        assert_ne!(base.hash(), other.hash());
    }
}
