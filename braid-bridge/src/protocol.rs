//! The cross-chain capability handed to every transaction handler.

use braid_types::block::{Block, BlockHeader, IndexedTx};
use braid_types::chain::{ChildChainRecord, ChildChainValidator, CrossChainTxState};
use braid_types::epoch::{Epoch, RevealedVote, RewardScheme, VotingWindow};
use braid_types::primitives::{Address, Amount, Hash, Height, TxHash};
use braid_types::proof::{AnchorCheckpoint, ChildChainProofData};
use braid_types::tx::{CreateChildChainParams, JoinChildChainParams, RevealVoteParams};

use crate::error::BridgeError;
use crate::pending::PendingOps;

/// Read access to deposits locked in world state.
pub trait DepositView {
    /// Amount `address` currently has locked for `chain_id`.
    fn locked_deposit(&self, chain_id: &str, address: &Address) -> Amount;
}

/// A child chain cleared for launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedChain {
    pub chain_id: String,
    pub validators: Vec<ChildChainValidator>,
    /// Borsh encoding of `validators`, handed to the child chain's genesis.
    pub validator_blob: Vec<u8>,
}

/// Outcome of the per-height launch decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchDecision {
    pub launched: Vec<LaunchedChain>,
    pub rejected: Vec<String>,
}

impl LaunchDecision {
    pub fn is_empty(&self) -> bool {
        self.launched.is_empty() && self.rejected.is_empty()
    }

    pub fn launched_ids(&self) -> Vec<&str> {
        self.launched.iter().map(|c| c.chain_id.as_str()).collect()
    }
}

/// Everything needed to resume a chain after restart.
#[derive(Debug, Clone)]
pub struct StoredChain {
    pub head: BlockHeader,
    pub state_snapshot: Vec<u8>,
    pub epoch: Epoch,
    pub reward_scheme: RewardScheme,
}

/// Cross-chain protocol: child chain admission, epoch voting, proof
/// anchoring and the replay ledgers.
///
/// `validate_*`/`can_*` methods check against committed state and never
/// write. The apply methods check against committed state plus `ops` and
/// queue a [`PendingOp`](crate::pending::PendingOp); nothing is written
/// until [`commit_block`](CrossChainHelper::commit_block). Every method
/// runs under one exclusive lock.
pub trait CrossChainHelper: Send + Sync {
    /// Id of the chain this helper runs on.
    fn chain_id(&self) -> &str;

    fn main_chain_id(&self) -> &str;

    fn is_main_chain(&self) -> bool {
        self.chain_id() == self.main_chain_id()
    }

    fn voting_window(&self) -> VotingWindow;

    // ─── Child Chain Lifecycle ───────────────────────────────────────────────

    fn can_create_child_chain(
        &self,
        from: &Address,
        params: &CreateChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn create_child_chain(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        params: &CreateChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn validate_join_child_chain(
        &self,
        from: &Address,
        params: &JoinChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn join_child_chain(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        params: &JoinChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError>;

    /// Decide which pending child chains launch or fail at `height`.
    /// Reads committed state only.
    fn ready_for_launch_child_chain(
        &self,
        height: Height,
        deposits: &dyn DepositView,
    ) -> Result<LaunchDecision, BridgeError>;

    /// Apply a launch decision. Records already decided are left alone.
    fn process_post_pending_data(
        &self,
        height: Height,
        decision: &LaunchDecision,
    ) -> Result<Vec<ChildChainRecord>, BridgeError>;

    fn child_chain(&self, chain_id: &str) -> Result<Option<ChildChainRecord>, BridgeError>;

    // ─── Epoch Voting ────────────────────────────────────────────────────────

    fn validate_vote_next_epoch(
        &self,
        ep: &Epoch,
        from: &Address,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn vote_next_epoch(
        &self,
        ops: &mut PendingOps,
        ep: &Epoch,
        from: &Address,
        vote_hash: Hash,
        tx_hash: TxHash,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn validate_reveal_vote(
        &self,
        ep: &Epoch,
        from: &Address,
        params: &RevealVoteParams,
        height: Height,
    ) -> Result<(), BridgeError>;

    fn reveal_vote(
        &self,
        ops: &mut PendingOps,
        ep: &Epoch,
        from: &Address,
        params: &RevealVoteParams,
        tx_hash: TxHash,
        height: Height,
    ) -> Result<(), BridgeError>;

    /// Revealed votes of `epoch`, the candidates for the following epoch.
    fn epoch_candidates(&self, chain_id: &str, epoch: u64) -> Result<Vec<RevealedVote>, BridgeError>;

    /// Drop every commitment and reveal of `epoch`. Returns how many
    /// commitments were never revealed.
    fn clear_epoch_votes(&self, chain_id: &str, epoch: u64) -> Result<usize, BridgeError>;

    // ─── Transaction Lookup ──────────────────────────────────────────────────

    fn get_tx_from_main_chain(&self, tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError>;

    fn get_tx_from_child_chain(
        &self,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<Option<IndexedTx>, BridgeError>;

    // ─── Proof Anchoring ─────────────────────────────────────────────────────

    /// Decode and verify a proof blob against the last anchored checkpoint.
    fn verify_child_chain_proof_data(
        &self,
        proof_bytes: &[u8],
    ) -> Result<ChildChainProofData, BridgeError>;

    fn save_child_chain_proof_data_to_main_chain(
        &self,
        ops: &mut PendingOps,
        proof_bytes: &[u8],
        height: Height,
    ) -> Result<(), BridgeError>;

    fn checkpoint(&self, chain_id: &str) -> Result<Option<AnchorCheckpoint>, BridgeError>;

    // ─── Replay Ledgers ──────────────────────────────────────────────────────

    fn validate_from_child_chain_tx(
        &self,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, BridgeError>;

    fn mark_from_child_chain_tx(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), BridgeError>;

    fn validate_to_child_chain_tx(
        &self,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, BridgeError>;

    fn mark_to_child_chain_tx(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), BridgeError>;

    // ─── Persistence ─────────────────────────────────────────────────────────

    /// Re-check and write `ops` together with the block, its transaction
    /// index and the state snapshot, as one atomic batch.
    fn commit_block(
        &self,
        ops: PendingOps,
        block: &Block,
        state_snapshot: &[u8],
    ) -> Result<(), BridgeError>;

    /// Persist epoch bookkeeping and the post-hook state snapshot atomically.
    /// `ended` is the epoch that just closed, if any; `epoch` becomes current.
    fn save_epoch_state(
        &self,
        ended: Option<&Epoch>,
        epoch: &Epoch,
        reward_scheme: &RewardScheme,
        state_snapshot: &[u8],
    ) -> Result<(), BridgeError>;

    fn load_chain(&self) -> Result<Option<StoredChain>, BridgeError>;
}
