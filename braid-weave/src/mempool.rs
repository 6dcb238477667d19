use std::collections::{HashSet, VecDeque};

use braid_types::primitives::TxHash;
use braid_types::tx::Transaction;

use crate::error::WeaveError;

/// Pending transactions awaiting inclusion, in arrival order.
pub struct Mempool {
    queue: VecDeque<(TxHash, Transaction)>,
    /// Hashes currently queued, for dedup.
    known: HashSet<TxHash>,
    /// Maximum number of queued transactions.
    max_size: usize,
}

impl Mempool {
    /// Create a new mempool with the given capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            known: HashSet::new(),
            max_size,
        }
    }

    /// Queue a transaction. Returns `false` if it is already queued.
    pub fn add(&mut self, tx: Transaction) -> Result<bool, WeaveError> {
        let hash = tx.hash();
        if self.known.contains(&hash) {
            return Ok(false);
        }
        if self.queue.len() >= self.max_size {
            return Err(WeaveError::MempoolFull);
        }
        self.known.insert(hash);
        self.queue.push_back((hash, tx));
        Ok(true)
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.known.contains(hash)
    }

    /// Take up to `max_txs` transactions, oldest first. The rest stay queued.
    pub fn drain_for_block(&mut self, max_txs: usize) -> Vec<Transaction> {
        let take = self.queue.len().min(max_txs);
        self.queue
            .drain(..take)
            .map(|(hash, tx)| {
                self.known.remove(&hash);
                tx
            })
            .collect()
    }

    /// Put drained transactions back at the front, keeping their order.
    /// Capacity is not enforced; hashes queued meanwhile are skipped.
    pub fn requeue(&mut self, txs: Vec<Transaction>) {
        for tx in txs.into_iter().rev() {
            let hash = tx.hash();
            if self.known.insert(hash) {
                self.queue.push_front((hash, tx));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use braid_types::identity::{IdentitySignature, PublicIdentity};

    use super::*;

    fn make_tx(nonce: u64) -> Transaction {
        Transaction {
            chain_id: "braid-main".to_string(),
            from: [1u8; 20],
            nonce,
            payload: vec![0x00],
            signer: PublicIdentity::Ed25519([2u8; 32]),
            signature: IdentitySignature::Ed25519([0u8; 64]),
        }
    }

    #[test]
    fn test_add_and_drain() {
        let mut pool = Mempool::new(100);
        assert!(pool.add(make_tx(0)).unwrap());
        assert!(pool.add(make_tx(1)).unwrap());
        assert_eq!(pool.len(), 2);

        let txs = pool.drain_for_block(10);
        assert_eq!(txs.iter().map(|t| t.nonce).collect::<Vec<_>>(), vec![0, 1]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_dedup_by_hash() {
        let mut pool = Mempool::new(100);
        assert!(pool.add(make_tx(0)).unwrap());
        assert!(!pool.add(make_tx(0)).unwrap());
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&make_tx(0).hash()));
    }

    #[test]
    fn test_capacity_limits() {
        let mut pool = Mempool::new(2);
        pool.add(make_tx(0)).unwrap();
        pool.add(make_tx(1)).unwrap();
        assert!(matches!(pool.add(make_tx(2)), Err(WeaveError::MempoolFull)));
        // A duplicate is not a new entry.
        assert!(!pool.add(make_tx(1)).unwrap());
    }

    #[test]
    fn test_drain_preserves_excess() {
        let mut pool = Mempool::new(100);
        for nonce in 0..10 {
            pool.add(make_tx(nonce)).unwrap();
        }
        let txs = pool.drain_for_block(3);
        assert_eq!(txs.len(), 3);
        assert_eq!(pool.len(), 7);
        assert!(!pool.contains(&make_tx(0).hash()));
        // Drained hashes may be queued again.
        assert!(pool.add(make_tx(0)).unwrap());
    }

    #[test]
    fn test_requeue_restores_drained_order() {
        let mut pool = Mempool::new(3);
        for nonce in 0..3 {
            pool.add(make_tx(nonce)).unwrap();
        }
        let drained = pool.drain_for_block(2);
        pool.add(make_tx(3)).unwrap();
        pool.add(make_tx(0)).unwrap();

        pool.requeue(drained);
        assert_eq!(pool.len(), 4);
        let txs = pool.drain_for_block(10);
        assert_eq!(
            txs.iter().map(|t| t.nonce).collect::<Vec<_>>(),
            vec![1, 2, 3, 0]
        );
    }
}
