//! Typed view over the durable chain-info table.
//!
//! Every key starts with a short ASCII prefix followed by a length-prefixed
//! chain id, so records of different chains never share a scan range.

use borsh::{BorshDeserialize, BorshSerialize};

use braid_types::block::{Block, BlockHeader, IndexedTx};
use braid_types::chain::{ChildChainRecord, CrossChainTxState};
use braid_types::epoch::{Epoch, RevealedVote, RewardScheme, VoteCommitment};
use braid_types::primitives::{Address, Height, TxHash};
use braid_types::proof::{AnchorCheckpoint, ChildChainProofData};

use crate::error::StorageError;
use crate::traits::KvStore;

const CHILD_CHAIN_PREFIX: &[u8] = b"cc:rec:";
const PROOF_PREFIX: &[u8] = b"cc:proof:";
const ANCHOR_PREFIX: &[u8] = b"cc:anchor:";
const VOTE_PREFIX: &[u8] = b"ep:vote:";
const REVEAL_PREFIX: &[u8] = b"ep:reveal:";
const EPOCH_PREFIX: &[u8] = b"ep:epoch:";
const CURRENT_EPOCH_PREFIX: &[u8] = b"ep:current:";
const REWARD_SCHEME_PREFIX: &[u8] = b"ep:scheme:";
const FROM_CHILD_PREFIX: &[u8] = b"xc:from:";
const TO_CHILD_PREFIX: &[u8] = b"xc:to:";
const TX_PREFIX: &[u8] = b"tx:";
const BLOCK_PREFIX: &[u8] = b"chain:block:";
const HEAD_PREFIX: &[u8] = b"chain:head:";
const STATE_PREFIX: &[u8] = b"chain:state:";

const LEDGER_USED: u8 = 1;
const LEDGER_UNUSED: u8 = 0;

/// Direction of a cross-chain replay ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDirection {
    /// Child chain txs consumed on the main chain (withdrawals).
    FromChildChain,
    /// Main chain txs consumed on a child chain (deposits).
    ToChildChain,
}

impl LedgerDirection {
    fn prefix(&self) -> &'static [u8] {
        match self {
            LedgerDirection::FromChildChain => FROM_CHILD_PREFIX,
            LedgerDirection::ToChildChain => TO_CHILD_PREFIX,
        }
    }
}

fn chain_key(prefix: &[u8], chain_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 2 + chain_id.len() + 40);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&(chain_id.len() as u16).to_be_bytes());
    key.extend_from_slice(chain_id.as_bytes());
    key
}

fn epoch_key(prefix: &[u8], chain_id: &str, epoch: u64) -> Vec<u8> {
    let mut key = chain_key(prefix, chain_id);
    key.extend_from_slice(&epoch.to_be_bytes());
    key
}

fn ledger_key(direction: LedgerDirection, from: &Address, chain_id: &str, tx_hash: &TxHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(direction.prefix().len() + 20);
    key.extend_from_slice(direction.prefix());
    key.extend_from_slice(from);
    let mut key = chain_key(&key, chain_id);
    key.extend_from_slice(tx_hash);
    key
}

/// Chain-info store: child chain records, vote state, replay ledgers,
/// anchored proofs, transaction index, epochs and chain heads.
pub struct ChainInfoStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> ChainInfoStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn get_value<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.store.get(key)? {
            Some(bytes) => T::try_from_slice(&bytes).map(Some).map_err(|e| {
                StorageError::DeserializationError {
                    key: String::from_utf8_lossy(key).into_owned(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    fn put_value<T: BorshSerialize>(&self, key: &[u8], value: &T) -> Result<(), StorageError> {
        let bytes = borsh::to_vec(value).map_err(|e| StorageError::SerializationError {
            reason: e.to_string(),
        })?;
        self.store.put(key, &bytes)
    }

    fn scan_values<T: BorshDeserialize>(&self, prefix: &[u8]) -> Result<Vec<T>, StorageError> {
        self.store
            .prefix_scan(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                T::try_from_slice(&bytes).map_err(|e| StorageError::DeserializationError {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    // ─── Child Chains ────────────────────────────────────────────────────────

    pub fn get_child_chain(&self, chain_id: &str) -> Result<Option<ChildChainRecord>, StorageError> {
        self.get_value(&chain_key(CHILD_CHAIN_PREFIX, chain_id))
    }

    pub fn put_child_chain(&self, record: &ChildChainRecord) -> Result<(), StorageError> {
        self.put_value(&chain_key(CHILD_CHAIN_PREFIX, &record.chain_id), record)
    }

    pub fn child_chain_exists(&self, chain_id: &str) -> Result<bool, StorageError> {
        self.store.exists(&chain_key(CHILD_CHAIN_PREFIX, chain_id))
    }

    /// All child chain records, ordered by key (chain id length, then id).
    pub fn child_chains(&self) -> Result<Vec<ChildChainRecord>, StorageError> {
        self.scan_values(CHILD_CHAIN_PREFIX)
    }

    // ─── Epoch Votes ─────────────────────────────────────────────────────────

    fn vote_key(prefix: &[u8], chain_id: &str, epoch: u64, voter: &Address) -> Vec<u8> {
        let mut key = epoch_key(prefix, chain_id, epoch);
        key.extend_from_slice(voter);
        key
    }

    pub fn get_vote(
        &self,
        chain_id: &str,
        epoch: u64,
        voter: &Address,
    ) -> Result<Option<VoteCommitment>, StorageError> {
        self.get_value(&Self::vote_key(VOTE_PREFIX, chain_id, epoch, voter))
    }

    pub fn put_vote(&self, vote: &VoteCommitment) -> Result<(), StorageError> {
        let key = Self::vote_key(VOTE_PREFIX, &vote.chain_id, vote.epoch, &vote.voter);
        self.put_value(&key, vote)
    }

    pub fn delete_vote(&self, chain_id: &str, epoch: u64, voter: &Address) -> Result<(), StorageError> {
        self.store
            .delete(&Self::vote_key(VOTE_PREFIX, chain_id, epoch, voter))
    }

    /// Commitments of one epoch, ordered by voter address.
    pub fn votes_for_epoch(&self, chain_id: &str, epoch: u64) -> Result<Vec<VoteCommitment>, StorageError> {
        self.scan_values(&epoch_key(VOTE_PREFIX, chain_id, epoch))
    }

    pub fn get_reveal(
        &self,
        chain_id: &str,
        epoch: u64,
        voter: &Address,
    ) -> Result<Option<RevealedVote>, StorageError> {
        self.get_value(&Self::vote_key(REVEAL_PREFIX, chain_id, epoch, voter))
    }

    pub fn put_reveal(&self, reveal: &RevealedVote) -> Result<(), StorageError> {
        let key = Self::vote_key(REVEAL_PREFIX, &reveal.chain_id, reveal.epoch, &reveal.voter);
        self.put_value(&key, reveal)
    }

    pub fn delete_reveal(&self, chain_id: &str, epoch: u64, voter: &Address) -> Result<(), StorageError> {
        self.store
            .delete(&Self::vote_key(REVEAL_PREFIX, chain_id, epoch, voter))
    }

    /// Reveals of one epoch, ordered by voter address.
    pub fn reveals_for_epoch(&self, chain_id: &str, epoch: u64) -> Result<Vec<RevealedVote>, StorageError> {
        self.scan_values(&epoch_key(REVEAL_PREFIX, chain_id, epoch))
    }

    // ─── Replay Ledgers ──────────────────────────────────────────────────────

    pub fn ledger_state(
        &self,
        direction: LedgerDirection,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, StorageError> {
        let key = ledger_key(direction, from, chain_id, tx_hash);
        Ok(match self.store.get(&key)?.as_deref() {
            None => CrossChainTxState::Unknown,
            Some([LEDGER_USED]) => CrossChainTxState::Used,
            Some(_) => CrossChainTxState::Unused,
        })
    }

    /// Record a ledger entry. Never moves an entry from used back to unused.
    pub fn mark_ledger(
        &self,
        direction: LedgerDirection,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), StorageError> {
        let key = ledger_key(direction, from, chain_id, tx_hash);
        if used {
            return self.store.put(&key, &[LEDGER_USED]);
        }
        if self.store.exists(&key)? {
            return Ok(());
        }
        self.store.put(&key, &[LEDGER_UNUSED])
    }

    // ─── Anchored Proofs ─────────────────────────────────────────────────────

    pub fn get_checkpoint(&self, chain_id: &str) -> Result<Option<AnchorCheckpoint>, StorageError> {
        self.get_value(&chain_key(ANCHOR_PREFIX, chain_id))
    }

    /// Persist a proof under its first header height and advance the
    /// checkpoint.
    pub fn save_proof(
        &self,
        proof: &ChildChainProofData,
        checkpoint: &AnchorCheckpoint,
    ) -> Result<(), StorageError> {
        let first = proof.first_height().unwrap_or(checkpoint.height);
        self.put_value(&epoch_key(PROOF_PREFIX, &proof.chain_id, first), proof)?;
        self.put_value(&chain_key(ANCHOR_PREFIX, &proof.chain_id), checkpoint)
    }

    pub fn get_proof(
        &self,
        chain_id: &str,
        first_height: Height,
    ) -> Result<Option<ChildChainProofData>, StorageError> {
        self.get_value(&epoch_key(PROOF_PREFIX, chain_id, first_height))
    }

    // ─── Transaction Index ───────────────────────────────────────────────────

    pub fn index_tx(&self, entry: &IndexedTx) -> Result<(), StorageError> {
        let mut key = chain_key(TX_PREFIX, &entry.chain_id);
        key.extend_from_slice(&entry.tx.hash());
        self.put_value(&key, entry)
    }

    pub fn get_tx(&self, chain_id: &str, tx_hash: &TxHash) -> Result<Option<IndexedTx>, StorageError> {
        let mut key = chain_key(TX_PREFIX, chain_id);
        key.extend_from_slice(tx_hash);
        self.get_value(&key)
    }

    // ─── Epochs ──────────────────────────────────────────────────────────────

    pub fn put_epoch(&self, epoch: &Epoch) -> Result<(), StorageError> {
        self.put_value(&epoch_key(EPOCH_PREFIX, &epoch.chain_id, epoch.number), epoch)
    }

    pub fn get_epoch(&self, chain_id: &str, number: u64) -> Result<Option<Epoch>, StorageError> {
        self.get_value(&epoch_key(EPOCH_PREFIX, chain_id, number))
    }

    pub fn set_current_epoch(&self, chain_id: &str, number: u64) -> Result<(), StorageError> {
        self.put_value(&chain_key(CURRENT_EPOCH_PREFIX, chain_id), &number)
    }

    pub fn current_epoch(&self, chain_id: &str) -> Result<Option<Epoch>, StorageError> {
        match self.get_value::<u64>(&chain_key(CURRENT_EPOCH_PREFIX, chain_id))? {
            Some(number) => self.get_epoch(chain_id, number),
            None => Ok(None),
        }
    }

    pub fn put_reward_scheme(&self, chain_id: &str, scheme: &RewardScheme) -> Result<(), StorageError> {
        self.put_value(&chain_key(REWARD_SCHEME_PREFIX, chain_id), scheme)
    }

    pub fn get_reward_scheme(&self, chain_id: &str) -> Result<Option<RewardScheme>, StorageError> {
        self.get_value(&chain_key(REWARD_SCHEME_PREFIX, chain_id))
    }

    // ─── Blocks and State ────────────────────────────────────────────────────

    /// Save a block and make its header the chain head.
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let chain_id = &block.header.chain_id;
        self.put_value(&epoch_key(BLOCK_PREFIX, chain_id, block.height()), block)?;
        self.put_value(&chain_key(HEAD_PREFIX, chain_id), &block.header)
    }

    pub fn load_block(&self, chain_id: &str, height: Height) -> Result<Option<Block>, StorageError> {
        self.get_value(&epoch_key(BLOCK_PREFIX, chain_id, height))
    }

    pub fn head(&self, chain_id: &str) -> Result<Option<BlockHeader>, StorageError> {
        self.get_value(&chain_key(HEAD_PREFIX, chain_id))
    }

    /// Opaque world-state snapshot, written with each block.
    pub fn put_state(&self, chain_id: &str, snapshot: &[u8]) -> Result<(), StorageError> {
        self.store.put(&chain_key(STATE_PREFIX, chain_id), snapshot)
    }

    pub fn get_state(&self, chain_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.store.get(&chain_key(STATE_PREFIX, chain_id))
    }
}
