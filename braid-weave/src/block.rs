use braid_crypto::merkle::merkle_root;
use braid_types::block::{Block, BlockHeader};
use braid_types::constants::MAX_TXS_PER_BLOCK;
use braid_types::epoch::Epoch;
use braid_types::primitives::*;
use braid_types::tx::Transaction;

use crate::error::WeaveError;

/// Merkle root of the transaction hashes, in block order.
pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
    let hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
    merkle_root(&hashes)
}

/// Build the block following `parent` (or the first block if `None`).
pub fn build_block(
    chain_id: &str,
    parent: Option<&BlockHeader>,
    transactions: Vec<Transaction>,
    proposer: Address,
    timestamp: Timestamp,
) -> Block {
    let (height, prev_hash) = match parent {
        Some(parent) => (parent.height + 1, parent.hash()),
        None => (0, ZERO_HASH),
    };
    let header = BlockHeader {
        chain_id: chain_id.to_string(),
        height,
        prev_hash,
        timestamp,
        proposer,
        tx_root: compute_tx_root(&transactions),
    };
    Block {
        header,
        transactions,
    }
}

/// Check a block's linkage, size, transaction root and proposer.
pub fn verify_block(
    block: &Block,
    chain_id: &str,
    parent: Option<&BlockHeader>,
    epoch: &Epoch,
) -> Result<(), WeaveError> {
    let header = &block.header;
    if header.chain_id != chain_id {
        return Err(WeaveError::invalid_block(format!(
            "block for {} submitted to {}",
            header.chain_id, chain_id
        )));
    }
    if block.transactions.len() > MAX_TXS_PER_BLOCK {
        return Err(WeaveError::invalid_block(format!(
            "too many transactions: {} > {}",
            block.transactions.len(),
            MAX_TXS_PER_BLOCK
        )));
    }
    match parent {
        Some(parent) => {
            if header.height != parent.height + 1 {
                return Err(WeaveError::invalid_block(format!(
                    "height {} does not follow {}",
                    header.height, parent.height
                )));
            }
            if header.prev_hash != parent.hash() {
                return Err(WeaveError::invalid_block("prev_hash does not match parent"));
            }
            if header.timestamp < parent.timestamp {
                return Err(WeaveError::invalid_block(format!(
                    "timestamp {} is before parent timestamp {}",
                    header.timestamp, parent.timestamp
                )));
            }
        }
        None => {
            if header.height != 0 || header.prev_hash != ZERO_HASH {
                return Err(WeaveError::invalid_block(
                    "first block must be height 0 with a zero prev_hash",
                ));
            }
        }
    }
    if header.tx_root != compute_tx_root(&block.transactions) {
        return Err(WeaveError::invalid_block("tx_root mismatch"));
    }
    if !epoch.is_validator(&header.proposer) {
        return Err(WeaveError::invalid_block(format!(
            "proposer {} is not a validator of epoch {}",
            hex::encode(header.proposer),
            epoch.number
        )));
    }
    Ok(())
}
