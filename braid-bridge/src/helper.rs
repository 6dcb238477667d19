use std::sync::{Arc, Mutex, MutexGuard};

use borsh::BorshDeserialize;
use tracing::{debug, info, warn};

use braid_storage::{BatchWriter, ChainInfoStore, LedgerDirection, StagedStore, StorageError};
use braid_types::block::{Block, IndexedTx};
use braid_types::chain::{ChildChainRecord, ChildChainStatus, CrossChainTxState};
use braid_types::epoch::{Epoch, RevealedVote, RewardScheme, VotingWindow};
use braid_types::primitives::*;
use braid_types::proof::{AnchorCheckpoint, ChildChainProofData};
use braid_types::tx::{CreateChildChainParams, JoinChildChainParams, RevealVoteParams};

use crate::client::ChainClient;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::pending::{PendingOp, PendingOps};
use crate::protocol::{CrossChainHelper, DepositView, LaunchDecision, LaunchedChain, StoredChain};
use crate::rules;

type StagedView<'a, S> = ChainInfoStore<StagedStore<'a, S>>;

/// [`CrossChainHelper`] over a local chain-info store.
///
/// One mutex guards the store. Lookups on other chains go through `client`.
pub struct BridgeHelper<S: BatchWriter> {
    chain_id: String,
    config: BridgeConfig,
    window: VotingWindow,
    store: Mutex<ChainInfoStore<S>>,
    client: Arc<dyn ChainClient>,
}

impl<S: BatchWriter> BridgeHelper<S> {
    pub fn new(
        chain_id: impl Into<String>,
        config: BridgeConfig,
        window: VotingWindow,
        store: S,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            config,
            window,
            store: Mutex::new(ChainInfoStore::new(store)),
            client,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChainInfoStore<S>>, BridgeError> {
        self.store.lock().map_err(|_| BridgeError::LockPoisoned)
    }

    /// Committed state with `ops` replayed on top.
    fn pending_view<'a>(
        &self,
        store: &'a ChainInfoStore<S>,
        ops: &PendingOps,
    ) -> Result<StagedView<'a, S>, BridgeError> {
        let view = ChainInfoStore::new(StagedStore::new(store.inner()));
        for op in ops.iter() {
            rules::write_op(&view, &self.config, op)?;
        }
        Ok(view)
    }

    fn require_main_chain(&self, operation: &str) -> Result<(), BridgeError> {
        if self.chain_id == self.config.main_chain_id {
            Ok(())
        } else {
            Err(BridgeError::InvalidReference {
                reason: format!("{} is only accepted on {}", operation, self.config.main_chain_id),
            })
        }
    }

    fn decode_proof(&self, proof_bytes: &[u8]) -> Result<ChildChainProofData, BridgeError> {
        ChildChainProofData::try_from_slice(proof_bytes).map_err(|e| BridgeError::ProofInvalid {
            chain_id: String::new(),
            height: 0,
            reason: format!("undecodable proof: {}", e),
        })
    }

    fn ledger_state(
        &self,
        direction: LedgerDirection,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, BridgeError> {
        let store = self.lock()?;
        Ok(store.ledger_state(direction, from, chain_id, tx_hash)?)
    }

    fn mark_ledger(
        &self,
        ops: &mut PendingOps,
        direction: LedgerDirection,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        if used {
            let view = self.pending_view(&store, ops)?;
            rules::check_unused(&view, direction, from, chain_id, tx_hash)?;
        }
        ops.push(PendingOp::MarkLedger {
            direction,
            from: *from,
            chain_id: chain_id.to_string(),
            tx_hash: *tx_hash,
            used,
        });
        Ok(())
    }

    fn write_staged(&self, store: &ChainInfoStore<S>, view: StagedView<'_, S>) -> Result<(), BridgeError> {
        let batch = view.into_inner().into_batch()?;
        store.inner().write_batch(batch)?;
        Ok(())
    }
}

impl<S: BatchWriter> CrossChainHelper for BridgeHelper<S> {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn main_chain_id(&self) -> &str {
        &self.config.main_chain_id
    }

    fn voting_window(&self) -> VotingWindow {
        self.window
    }

    fn can_create_child_chain(
        &self,
        _from: &Address,
        params: &CreateChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError> {
        self.require_main_chain("create-child-chain")?;
        let store = self.lock()?;
        rules::check_create(&*store, &self.config, params, height)
    }

    fn create_child_chain(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        params: &CreateChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError> {
        self.require_main_chain("create-child-chain")?;
        let store = self.lock()?;
        let view = self.pending_view(&store, ops)?;
        rules::check_create(&view, &self.config, params, height)?;
        debug!(chain_id = %params.chain_id, height, "child chain creation admitted");
        ops.push(PendingOp::CreateChildChain {
            owner: *from,
            params: params.clone(),
            height,
        });
        Ok(())
    }

    fn validate_join_child_chain(
        &self,
        from: &Address,
        params: &JoinChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError> {
        self.require_main_chain("join-child-chain")?;
        let store = self.lock()?;
        rules::check_join(&*store, from, params, height).map(|_| ())
    }

    fn join_child_chain(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        params: &JoinChildChainParams,
        height: Height,
    ) -> Result<(), BridgeError> {
        self.require_main_chain("join-child-chain")?;
        let store = self.lock()?;
        let view = self.pending_view(&store, ops)?;
        rules::check_join(&view, from, params, height)?;
        debug!(
            chain_id = %params.chain_id,
            validator = %rules::hex_addr(from),
            deposit = params.deposit_amount,
            "validator join admitted"
        );
        ops.push(PendingOp::JoinChildChain {
            from: *from,
            params: params.clone(),
            height,
        });
        Ok(())
    }

    fn ready_for_launch_child_chain(
        &self,
        height: Height,
        deposits: &dyn DepositView,
    ) -> Result<LaunchDecision, BridgeError> {
        let store = self.lock()?;
        let mut decision = LaunchDecision::default();
        for record in store.child_chains()? {
            if record.status != ChildChainStatus::Pending || height < record.end_block {
                continue;
            }
            let validators: Vec<_> = record
                .validators
                .iter()
                .filter(|v| deposits.locked_deposit(&record.chain_id, &v.address) >= v.deposit_amount)
                .cloned()
                .collect();
            if validators.len() >= record.min_validators as usize {
                let validator_blob =
                    borsh::to_vec(&validators).map_err(|e| StorageError::SerializationError {
                        reason: e.to_string(),
                    })?;
                decision.launched.push(LaunchedChain {
                    chain_id: record.chain_id,
                    validators,
                    validator_blob,
                });
            } else {
                decision.rejected.push(record.chain_id);
            }
        }
        Ok(decision)
    }

    fn process_post_pending_data(
        &self,
        height: Height,
        decision: &LaunchDecision,
    ) -> Result<Vec<ChildChainRecord>, BridgeError> {
        let store = self.lock()?;
        let view = ChainInfoStore::new(StagedStore::new(store.inner()));
        let mut decided = Vec::new();

        for launched in &decision.launched {
            let Some(mut record) = view.get_child_chain(&launched.chain_id)? else {
                continue;
            };
            if record.status != ChildChainStatus::Pending {
                continue;
            }
            record.status = ChildChainStatus::Launched;
            record.validators = launched.validators.clone();
            record.decided_at = Some(height);
            view.put_child_chain(&record)?;
            info!(
                chain_id = %record.chain_id,
                validators = record.validators.len(),
                height,
                "child chain launched"
            );
            decided.push(record);
        }
        for chain_id in &decision.rejected {
            let Some(mut record) = view.get_child_chain(chain_id)? else {
                continue;
            };
            if record.status != ChildChainStatus::Pending {
                continue;
            }
            record.status = ChildChainStatus::Rejected;
            record.decided_at = Some(height);
            view.put_child_chain(&record)?;
            info!(
                chain_id = %record.chain_id,
                joined = record.validators.len(),
                required = record.min_validators,
                height,
                "child chain rejected"
            );
            decided.push(record);
        }

        self.write_staged(&store, view)?;
        Ok(decided)
    }

    fn child_chain(&self, chain_id: &str) -> Result<Option<ChildChainRecord>, BridgeError> {
        let store = self.lock()?;
        Ok(store.get_child_chain(chain_id)?)
    }

    fn validate_vote_next_epoch(
        &self,
        ep: &Epoch,
        from: &Address,
        height: Height,
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        rules::check_vote(&*store, &self.chain_id, &self.window, ep, from, height)
    }

    fn vote_next_epoch(
        &self,
        ops: &mut PendingOps,
        ep: &Epoch,
        from: &Address,
        vote_hash: Hash,
        tx_hash: TxHash,
        height: Height,
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        let view = self.pending_view(&store, ops)?;
        rules::check_vote(&view, &self.chain_id, &self.window, ep, from, height)?;
        debug!(chain_id = %ep.chain_id, epoch = ep.number, voter = %rules::hex_addr(from), "vote committed");
        ops.push(PendingOp::VoteNextEpoch(rules::make_vote(ep, from, vote_hash, tx_hash)));
        Ok(())
    }

    fn validate_reveal_vote(
        &self,
        ep: &Epoch,
        from: &Address,
        params: &RevealVoteParams,
        height: Height,
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        rules::check_reveal(&*store, &self.chain_id, &self.window, ep, from, params, height)
            .map(|_| ())
    }

    fn reveal_vote(
        &self,
        ops: &mut PendingOps,
        ep: &Epoch,
        from: &Address,
        params: &RevealVoteParams,
        tx_hash: TxHash,
        height: Height,
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        let view = self.pending_view(&store, ops)?;
        let (pubkey, vote_hash) = rules::check_reveal(
            &view,
            &self.chain_id,
            &self.window,
            ep,
            from,
            params,
            height,
        )?;
        debug!(
            chain_id = %ep.chain_id,
            epoch = ep.number,
            voter = %rules::hex_addr(from),
            deposit = params.deposit_amount,
            "vote revealed"
        );
        ops.push(PendingOp::RevealVote {
            reveal: rules::make_reveal(ep, from, pubkey, params.deposit_amount, tx_hash),
            vote_hash,
        });
        Ok(())
    }

    fn epoch_candidates(&self, chain_id: &str, epoch: u64) -> Result<Vec<RevealedVote>, BridgeError> {
        let store = self.lock()?;
        Ok(store.reveals_for_epoch(chain_id, epoch)?)
    }

    fn clear_epoch_votes(&self, chain_id: &str, epoch: u64) -> Result<usize, BridgeError> {
        let store = self.lock()?;
        let view = ChainInfoStore::new(StagedStore::new(store.inner()));
        let unrevealed = view.votes_for_epoch(chain_id, epoch)?;
        for vote in &unrevealed {
            view.delete_vote(chain_id, epoch, &vote.voter)?;
        }
        for reveal in view.reveals_for_epoch(chain_id, epoch)? {
            view.delete_reveal(chain_id, epoch, &reveal.voter)?;
        }
        self.write_staged(&store, view)?;
        Ok(unrevealed.len())
    }

    fn get_tx_from_main_chain(&self, tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError> {
        let main = self.config.main_chain_id.as_str();
        if self.chain_id == main {
            let store = self.lock()?;
            return Ok(store.get_tx(main, tx_hash)?);
        }
        self.client.get_tx(main, tx_hash)
    }

    fn get_tx_from_child_chain(
        &self,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<Option<IndexedTx>, BridgeError> {
        if self.chain_id == chain_id {
            let store = self.lock()?;
            return Ok(store.get_tx(chain_id, tx_hash)?);
        }
        self.client.get_tx(chain_id, tx_hash)
    }

    fn verify_child_chain_proof_data(
        &self,
        proof_bytes: &[u8],
    ) -> Result<ChildChainProofData, BridgeError> {
        let proof = self.decode_proof(proof_bytes)?;
        let store = self.lock()?;
        if let Err(e) = rules::verify_proof(&*store, &self.config, &proof) {
            if let BridgeError::ProofInvalid { chain_id, height, reason } = &e {
                warn!(chain_id = %chain_id, height, reason = %reason, "child chain proof rejected");
            }
            return Err(e);
        }
        Ok(proof)
    }

    fn save_child_chain_proof_data_to_main_chain(
        &self,
        ops: &mut PendingOps,
        proof_bytes: &[u8],
        height: Height,
    ) -> Result<(), BridgeError> {
        self.require_main_chain("anchor-child-chain-proof")?;
        let proof = self.decode_proof(proof_bytes)?;
        let store = self.lock()?;
        let view = self.pending_view(&store, ops)?;
        match rules::verify_proof(&view, &self.config, &proof) {
            Ok(verified) => {
                info!(
                    chain_id = %proof.chain_id,
                    height = verified.height,
                    anchored_at = height,
                    validator_epoch = verified.validators.as_ref().map(|(epoch, _)| *epoch),
                    "child chain proof accepted"
                );
            }
            Err(e) => {
                if let BridgeError::ProofInvalid { chain_id, height, reason } = &e {
                    warn!(chain_id = %chain_id, height, reason = %reason, "child chain proof rejected");
                }
                return Err(e);
            }
        }
        ops.push(PendingOp::SaveProof {
            proof,
            anchored_at: height,
        });
        Ok(())
    }

    fn checkpoint(&self, chain_id: &str) -> Result<Option<AnchorCheckpoint>, BridgeError> {
        let store = self.lock()?;
        Ok(store.get_checkpoint(chain_id)?)
    }

    fn validate_from_child_chain_tx(
        &self,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, BridgeError> {
        self.ledger_state(LedgerDirection::FromChildChain, from, chain_id, tx_hash)
    }

    fn mark_from_child_chain_tx(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), BridgeError> {
        self.mark_ledger(ops, LedgerDirection::FromChildChain, from, chain_id, tx_hash, used)
    }

    fn validate_to_child_chain_tx(
        &self,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
    ) -> Result<CrossChainTxState, BridgeError> {
        self.ledger_state(LedgerDirection::ToChildChain, from, chain_id, tx_hash)
    }

    fn mark_to_child_chain_tx(
        &self,
        ops: &mut PendingOps,
        from: &Address,
        chain_id: &str,
        tx_hash: &TxHash,
        used: bool,
    ) -> Result<(), BridgeError> {
        self.mark_ledger(ops, LedgerDirection::ToChildChain, from, chain_id, tx_hash, used)
    }

    fn commit_block(
        &self,
        ops: PendingOps,
        block: &Block,
        state_snapshot: &[u8],
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        let view = ChainInfoStore::new(StagedStore::new(store.inner()));
        let op_count = ops.len();
        for op in ops.iter() {
            if let Err(e) = rules::check_op(&view, &self.config, op) {
                warn!(height = block.height(), op = op.name(), error = %e, "pending op failed re-check at commit");
                return Err(e);
            }
            rules::write_op(&view, &self.config, op)?;
        }

        let block_hash = block.hash();
        view.save_block(block)?;
        for tx in &block.transactions {
            view.index_tx(&IndexedTx {
                chain_id: block.header.chain_id.clone(),
                height: block.height(),
                block_hash,
                tx: tx.clone(),
            })?;
        }
        view.put_state(&block.header.chain_id, state_snapshot)?;

        self.write_staged(&store, view)?;
        debug!(height = block.height(), ops = op_count, txs = block.transactions.len(), "block committed");
        Ok(())
    }

    fn save_epoch_state(
        &self,
        ended: Option<&Epoch>,
        epoch: &Epoch,
        reward_scheme: &RewardScheme,
        state_snapshot: &[u8],
    ) -> Result<(), BridgeError> {
        let store = self.lock()?;
        let view = ChainInfoStore::new(StagedStore::new(store.inner()));
        if let Some(ended) = ended {
            view.put_epoch(ended)?;
        }
        view.put_epoch(epoch)?;
        view.set_current_epoch(&epoch.chain_id, epoch.number)?;
        view.put_reward_scheme(&epoch.chain_id, reward_scheme)?;
        view.put_state(&epoch.chain_id, state_snapshot)?;
        self.write_staged(&store, view)
    }

    fn load_chain(&self) -> Result<Option<StoredChain>, BridgeError> {
        let store = self.lock()?;
        let chain_id = self.chain_id.as_str();
        let (Some(head), Some(state_snapshot), Some(epoch), Some(reward_scheme)) = (
            store.head(chain_id)?,
            store.get_state(chain_id)?,
            store.current_epoch(chain_id)?,
            store.get_reward_scheme(chain_id)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(StoredChain {
            head,
            state_snapshot,
            epoch,
            reward_scheme,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use braid_crypto::{address_of, PrivateIdentity};
    use braid_storage::MemoryStore;
    use braid_types::block::BlockHeader;
    use braid_types::epoch::{vote_hash, EpochStatus, EpochValidator};
    use braid_types::identity::{PublicIdentity, SchemeTag};
    use braid_types::chain::ChildChainValidator;
    use braid_types::proof::{
        ChildBlockHeader, CommitSignature, SignedValidatorSetChange, ValidatorSetChange,
    };
    use braid_types::tx::{Transaction, TxCall, TransferParams};
    use proptest::prelude::*;

    use super::*;
    use crate::client::NoChainClient;

    const MAIN: &str = "braid-main";

    #[derive(Default)]
    struct Deposits(HashMap<(String, Address), Amount>);

    impl DepositView for Deposits {
        fn locked_deposit(&self, chain_id: &str, address: &Address) -> Amount {
            self.0
                .get(&(chain_id.to_string(), *address))
                .copied()
                .unwrap_or(0)
        }
    }

    fn make_helper() -> BridgeHelper<Arc<MemoryStore>> {
        BridgeHelper::new(
            MAIN,
            BridgeConfig::default(),
            VotingWindow::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(NoChainClient),
        )
    }

    fn make_create(chain_id: &str) -> CreateChildChainParams {
        CreateChildChainParams {
            chain_id: chain_id.to_string(),
            min_validators: 4,
            min_deposit_amount: 1000,
            start_block: 100,
            end_block: 200,
        }
    }

    fn make_key(seed: u8) -> PrivateIdentity {
        PrivateIdentity::from_seed(SchemeTag::Ed25519, &[seed; 32]).unwrap()
    }

    fn make_join(chain_id: &str, key: &PrivateIdentity, deposit: Amount) -> JoinChildChainParams {
        JoinChildChainParams {
            pubkey: key.public_key().to_bytes(),
            chain_id: chain_id.to_string(),
            deposit_amount: deposit,
        }
    }

    fn make_block(height: Height) -> Block {
        Block {
            header: BlockHeader {
                chain_id: MAIN.to_string(),
                height,
                prev_hash: ZERO_HASH,
                timestamp: 1_700_000_000 + height,
                proposer: [7u8; 20],
                tx_root: ZERO_HASH,
            },
            transactions: Vec::new(),
        }
    }

    /// Commit `ops` in an empty block at `height`.
    fn commit(helper: &BridgeHelper<Arc<MemoryStore>>, ops: PendingOps, height: Height) {
        helper.commit_block(ops, &make_block(height), b"state").unwrap();
    }

    fn make_epoch(validators: &[(Address, PublicIdentity)]) -> Epoch {
        Epoch {
            chain_id: MAIN.to_string(),
            number: 0,
            validators: validators
                .iter()
                .map(|(address, pubkey)| EpochValidator {
                    address: *address,
                    pubkey: pubkey.clone(),
                    amount: 5_000,
                })
                .collect(),
            reward_per_block: 10,
            start_block: 0,
            end_block: 99,
            start_time: 0,
            end_time: 0,
            blocks_produced: 0,
            status: EpochStatus::Running,
            carried_over: 0,
        }
    }

    /// Create "child-1" and have four validators join with 1000 each.
    fn make_joined_chain(helper: &BridgeHelper<Arc<MemoryStore>>) -> (Vec<PrivateIdentity>, Deposits) {
        let mut ops = PendingOps::new();
        helper
            .create_child_chain(&mut ops, &[1u8; 20], &make_create("child-1"), 50)
            .unwrap();
        commit(helper, ops, 50);

        let mut deposits = Deposits::default();
        let keys: Vec<_> = (10..14).map(make_key).collect();
        let mut ops = PendingOps::new();
        for key in &keys {
            let from = address_of(&key.public_key());
            helper
                .join_child_chain(&mut ops, &from, &make_join("child-1", key, 1000), 150)
                .unwrap();
            deposits.0.insert(("child-1".to_string(), from), 1000);
        }
        commit(helper, ops, 150);
        (keys, deposits)
    }

    fn make_proof(
        keys: &[PrivateIdentity],
        first: Height,
        count: u64,
        prev_hash: Hash,
        signers: usize,
    ) -> ChildChainProofData {
        let mut headers = Vec::new();
        let mut commits = Vec::new();
        let mut prev = prev_hash;
        for height in first..first + count {
            let header = ChildBlockHeader {
                chain_id: "child-1".to_string(),
                height,
                prev_hash: prev,
                state_root: [height as u8; 32],
                tx_root: ZERO_HASH,
                timestamp: 1_700_000_000 + height,
            };
            let hash = header.compute_hash();
            commits.push(
                keys.iter()
                    .take(signers)
                    .map(|k| CommitSignature {
                        validator: address_of(&k.public_key()),
                        signature: k.sign(&hash),
                    })
                    .collect(),
            );
            prev = hash;
            headers.push(header);
        }
        ChildChainProofData {
            chain_id: "child-1".to_string(),
            headers,
            commits,
            set_changes: vec![],
        }
    }

    fn make_set_change(
        signers: &[PrivateIdentity],
        epoch: u64,
        effective_height: Height,
        members: &[PrivateIdentity],
    ) -> SignedValidatorSetChange {
        let change = ValidatorSetChange {
            chain_id: "child-1".to_string(),
            epoch,
            effective_height,
            validators: members
                .iter()
                .map(|k| ChildChainValidator {
                    address: address_of(&k.public_key()),
                    pubkey: k.public_key(),
                    deposit_amount: 1000,
                })
                .collect(),
        };
        let hash = change.compute_hash();
        SignedValidatorSetChange {
            signatures: signers
                .iter()
                .map(|k| CommitSignature {
                    validator: address_of(&k.public_key()),
                    signature: k.sign(&hash),
                })
                .collect(),
            change,
        }
    }

    // ─── Admission ──────────────────────────────────────────────────────────

    #[test]
    fn test_duplicate_chain_in_same_block_rejected() {
        let helper = make_helper();
        let mut ops = PendingOps::new();
        helper
            .create_child_chain(&mut ops, &[1u8; 20], &make_create("child-1"), 10)
            .unwrap();
        let err = helper
            .create_child_chain(&mut ops, &[2u8; 20], &make_create("child-1"), 10)
            .unwrap_err();
        assert!(matches!(err, BridgeError::AdmissionRejected { .. }));
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_create_rejects_bad_parameters() {
        let helper = make_helper();
        let cases = [
            CreateChildChainParams { min_validators: 0, ..make_create("a") },
            CreateChildChainParams { min_validators: 101, ..make_create("a") },
            CreateChildChainParams { min_deposit_amount: 0, ..make_create("a") },
            CreateChildChainParams { start_block: 200, end_block: 200, ..make_create("a") },
            CreateChildChainParams { start_block: 100, end_block: 105, ..make_create("a") },
            make_create(MAIN),
            make_create("bad id"),
            make_create(""),
        ];
        for params in &cases {
            let err = helper.can_create_child_chain(&[1u8; 20], params, 10).unwrap_err();
            assert!(matches!(err, BridgeError::AdmissionRejected { .. }), "{:?}", params);
        }
        // Window already closed.
        assert!(helper.can_create_child_chain(&[1u8; 20], &make_create("a"), 200).is_err());
    }

    #[test]
    fn test_join_checks_window_deposit_and_duplicates() {
        let helper = make_helper();
        let mut ops = PendingOps::new();
        helper
            .create_child_chain(&mut ops, &[1u8; 20], &make_create("child-1"), 10)
            .unwrap();
        commit(&helper, ops, 10);

        let key = make_key(3);
        let from = address_of(&key.public_key());
        let join = make_join("child-1", &key, 1000);
        assert!(helper.validate_join_child_chain(&from, &join, 99).is_err());
        assert!(helper.validate_join_child_chain(&from, &join, 200).is_err());
        assert!(helper
            .validate_join_child_chain(&from, &make_join("child-1", &key, 999), 150)
            .is_err());
        assert!(matches!(
            helper.validate_join_child_chain(&from, &make_join("child-9", &key, 1000), 150),
            Err(BridgeError::UnknownChain { .. })
        ));

        let mut ops = PendingOps::new();
        helper.join_child_chain(&mut ops, &from, &join, 100).unwrap();
        assert!(helper.join_child_chain(&mut ops, &from, &join, 101).is_err());

        let mut bad_key = join.clone();
        bad_key.pubkey = vec![0x01, 0x02];
        assert!(helper.join_child_chain(&mut ops, &[9u8; 20], &bad_key, 101).is_err());
    }

    #[test]
    fn test_launch_scenario() {
        let helper = make_helper();
        let (_, deposits) = make_joined_chain(&helper);

        let early = helper.ready_for_launch_child_chain(199, &deposits).unwrap();
        assert!(early.is_empty());

        let decision = helper.ready_for_launch_child_chain(200, &deposits).unwrap();
        assert_eq!(decision.launched_ids(), vec!["child-1"]);
        assert_eq!(decision.launched[0].validators.len(), 4);
        let blob: Vec<braid_types::chain::ChildChainValidator> =
            borsh::from_slice(&decision.launched[0].validator_blob).unwrap();
        assert_eq!(blob, decision.launched[0].validators);

        let decided = helper.process_post_pending_data(200, &decision).unwrap();
        assert_eq!(decided.len(), 1);
        let record = helper.child_chain("child-1").unwrap().unwrap();
        assert_eq!(record.status, ChildChainStatus::Launched);
        assert_eq!(record.decided_at, Some(200));

        // Applying the same decision again changes nothing.
        assert!(helper.process_post_pending_data(201, &decision).unwrap().is_empty());
        assert!(helper.ready_for_launch_child_chain(201, &deposits).unwrap().is_empty());
    }

    #[test]
    fn test_unlocked_deposits_cause_rejection() {
        let helper = make_helper();
        let (keys, mut deposits) = make_joined_chain(&helper);
        deposits
            .0
            .remove(&("child-1".to_string(), address_of(&keys[0].public_key())));

        let decision = helper.ready_for_launch_child_chain(200, &deposits).unwrap();
        assert_eq!(decision.rejected, vec!["child-1".to_string()]);
        helper.process_post_pending_data(200, &decision).unwrap();
        assert_eq!(
            helper.child_chain("child-1").unwrap().unwrap().status,
            ChildChainStatus::Rejected
        );
    }

    // ─── Voting ─────────────────────────────────────────────────────────────

    #[test]
    fn test_commit_reveal_scenario() {
        let helper = make_helper();
        let key = make_key(5);
        let voter = address_of(&key.public_key());
        let ep = make_epoch(&[(voter, key.public_key())]);

        let next_key = make_key(6).public_key().to_bytes();
        let hash = vote_hash(&next_key, 7_000, "pepper");

        // Outside the commit phase.
        assert!(helper.validate_vote_next_epoch(&ep, &voter, 10).is_err());
        // Not a validator.
        assert!(helper.validate_vote_next_epoch(&ep, &[9u8; 20], 80).is_err());

        let mut ops = PendingOps::new();
        helper
            .vote_next_epoch(&mut ops, &ep, &voter, hash, [1u8; 32], 80)
            .unwrap();
        assert!(helper
            .vote_next_epoch(&mut ops, &ep, &voter, hash, [2u8; 32], 81)
            .is_err());
        commit(&helper, ops, 80);

        let reveal = RevealVoteParams {
            pubkey: next_key.clone(),
            deposit_amount: 7_000,
            salt: "pepper".to_string(),
        };
        // Still in the commit phase.
        assert!(helper.validate_reveal_vote(&ep, &voter, &reveal, 84).is_err());

        let wrong_salt = RevealVoteParams {
            salt: "salt".to_string(),
            ..reveal.clone()
        };
        assert!(matches!(
            helper.validate_reveal_vote(&ep, &voter, &wrong_salt, 90),
            Err(BridgeError::VoteRejected { .. })
        ));

        let mut ops = PendingOps::new();
        helper
            .reveal_vote(&mut ops, &ep, &voter, &reveal, [3u8; 32], 90)
            .unwrap();
        assert!(helper
            .reveal_vote(&mut ops, &ep, &voter, &reveal, [4u8; 32], 91)
            .is_err());
        commit(&helper, ops, 90);

        let candidates = helper.epoch_candidates(MAIN, 0).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].deposit_amount, 7_000);
        assert_eq!(helper.clear_epoch_votes(MAIN, 0).unwrap(), 0);
        assert!(helper.epoch_candidates(MAIN, 0).unwrap().is_empty());
    }

    #[test]
    fn test_vote_on_unknown_chain_rejected() {
        let helper = make_helper();
        let key = make_key(5);
        let voter = address_of(&key.public_key());
        let mut ep = make_epoch(&[(voter, key.public_key())]);
        ep.chain_id = "child-9".to_string();
        assert!(matches!(
            helper.validate_vote_next_epoch(&ep, &voter, 80),
            Err(BridgeError::UnknownChain { .. })
        ));
    }

    // ─── Anchoring ──────────────────────────────────────────────────────────

    fn make_launched(helper: &BridgeHelper<Arc<MemoryStore>>) -> Vec<PrivateIdentity> {
        let (keys, deposits) = make_joined_chain(helper);
        let decision = helper.ready_for_launch_child_chain(200, &deposits).unwrap();
        helper.process_post_pending_data(200, &decision).unwrap();
        keys
    }

    #[test]
    fn test_proof_anchoring_advances_checkpoint() {
        let helper = make_helper();
        let keys = make_launched(&helper);

        let proof = make_proof(&keys, 1, 3, ZERO_HASH, 3);
        let bytes = proof.to_bytes();
        assert_eq!(helper.verify_child_chain_proof_data(&bytes).unwrap(), proof);

        let mut ops = PendingOps::new();
        helper
            .save_child_chain_proof_data_to_main_chain(&mut ops, &bytes, 210)
            .unwrap();
        // Same range again in the same block no longer links.
        assert!(helper
            .save_child_chain_proof_data_to_main_chain(&mut ops, &bytes, 210)
            .is_err());
        commit(&helper, ops, 210);

        let checkpoint = helper.checkpoint("child-1").unwrap().unwrap();
        assert_eq!(checkpoint.height, 3);
        assert_eq!(checkpoint.anchored_at, 210);

        let next = make_proof(&keys, 4, 2, checkpoint.header_hash, 4);
        assert!(helper.verify_child_chain_proof_data(&next.to_bytes()).is_ok());
        let gap = make_proof(&keys, 5, 2, checkpoint.header_hash, 4);
        assert!(helper.verify_child_chain_proof_data(&gap.to_bytes()).is_err());
    }

    #[test]
    fn test_proof_rejections() {
        let helper = make_helper();
        let keys = make_launched(&helper);

        // Two of four equal deposits is not above two thirds.
        let weak = make_proof(&keys, 1, 1, ZERO_HASH, 2);
        assert!(matches!(
            helper.verify_child_chain_proof_data(&weak.to_bytes()),
            Err(BridgeError::ProofInvalid { height: 1, .. })
        ));

        let mut broken = make_proof(&keys, 1, 2, ZERO_HASH, 4);
        broken.headers[1].prev_hash = [0xAA; 32];
        assert!(helper.verify_child_chain_proof_data(&broken.to_bytes()).is_err());

        let mut duplicated = make_proof(&keys, 1, 1, ZERO_HASH, 3);
        let first = duplicated.commits[0][0].clone();
        duplicated.commits[0][1] = first;
        assert!(helper.verify_child_chain_proof_data(&duplicated.to_bytes()).is_err());

        let outsider = make_key(99);
        let mut forged = make_proof(&keys, 1, 1, ZERO_HASH, 3);
        let hash = forged.headers[0].compute_hash();
        forged.commits[0][2] = CommitSignature {
            validator: address_of(&keys[3].public_key()),
            signature: outsider.sign(&hash),
        };
        assert!(helper.verify_child_chain_proof_data(&forged.to_bytes()).is_err());

        assert!(helper.verify_child_chain_proof_data(&[0xFF, 0x00]).is_err());
    }

    #[test]
    fn test_validator_set_change_hands_over_signing() {
        let helper = make_helper();
        let keys = make_launched(&helper);
        let next_set = vec![make_key(10), make_key(11), make_key(20), make_key(21)];

        // Heights 1..=2 signed by the launch set, 3..=4 by the next one.
        let mut proof = make_proof(&keys, 1, 2, ZERO_HASH, 3);
        let tail = make_proof(&next_set, 3, 2, proof.headers[1].compute_hash(), 3);
        proof.headers.extend(tail.headers);
        proof.commits.extend(tail.commits);
        proof.set_changes.push(make_set_change(&keys[1..], 1, 3, &next_set));
        let bytes = proof.to_bytes();
        assert!(helper.verify_child_chain_proof_data(&bytes).is_ok());

        let mut ops = PendingOps::new();
        helper
            .save_child_chain_proof_data_to_main_chain(&mut ops, &bytes, 210)
            .unwrap();
        commit(&helper, ops, 210);
        let record = helper.child_chain("child-1").unwrap().unwrap();
        assert_eq!(record.validator_epoch, 1);
        let members: Vec<_> = record.validators.iter().map(|v| v.address).collect();
        let expected: Vec<_> = next_set.iter().map(|k| address_of(&k.public_key())).collect();
        assert_eq!(members, expected);

        let checkpoint = helper.checkpoint("child-1").unwrap().unwrap();
        assert_eq!(checkpoint.height, 4);
        let departed = vec![make_key(12), make_key(13), make_key(10)];
        let stale = make_proof(&departed, 5, 1, checkpoint.header_hash, 3);
        assert!(matches!(
            helper.verify_child_chain_proof_data(&stale.to_bytes()),
            Err(BridgeError::ProofInvalid { height: 5, .. })
        ));
        let fresh = make_proof(&next_set, 5, 1, checkpoint.header_hash, 3);
        assert!(helper.verify_child_chain_proof_data(&fresh.to_bytes()).is_ok());

        // Replaying the applied change is out of sequence.
        let mut replayed = fresh.clone();
        replayed.set_changes.push(make_set_change(&keys[1..], 1, 5, &next_set));
        assert!(helper.verify_child_chain_proof_data(&replayed.to_bytes()).is_err());
    }

    #[test]
    fn test_validator_set_change_rejections() {
        let helper = make_helper();
        let keys = make_launched(&helper);
        let next_set = vec![make_key(10), make_key(20)];
        let with_change = |change: SignedValidatorSetChange| {
            let mut proof = make_proof(&next_set, 1, 1, ZERO_HASH, 2);
            proof.set_changes.push(change);
            helper.verify_child_chain_proof_data(&proof.to_bytes())
        };

        // Two of four outgoing validators is not above two thirds.
        assert!(matches!(
            with_change(make_set_change(&keys[..2], 1, 1, &next_set)),
            Err(BridgeError::ProofInvalid { height: 1, .. })
        ));
        // Signers outside the outgoing set count for nothing.
        assert!(with_change(make_set_change(&next_set, 1, 1, &next_set)).is_err());
        assert!(with_change(make_set_change(&keys[..3], 2, 1, &next_set)).is_err());
        assert!(with_change(make_set_change(&keys[..3], 1, 1, &[])).is_err());
        let doubled = vec![make_key(10), make_key(10)];
        assert!(with_change(make_set_change(&keys[..3], 1, 1, &doubled)).is_err());
        // Effective beyond the height right after the proof.
        assert!(with_change(make_set_change(&keys[..3], 1, 3, &next_set)).is_err());
        assert!(with_change(make_set_change(&keys[..3], 1, 1, &next_set)).is_ok());

        // A rejected proof leaves the launch set in force.
        let record = helper.child_chain("child-1").unwrap().unwrap();
        assert_eq!(record.validator_epoch, 0);
        assert_eq!(record.validators.len(), 4);
    }

    // ─── Ledgers and Commit ─────────────────────────────────────────────────

    #[test]
    fn test_commit_rechecks_every_op() {
        let helper = make_helper();
        let mut first = PendingOps::new();
        helper
            .create_child_chain(&mut first, &[1u8; 20], &make_create("child-1"), 10)
            .unwrap();
        let mut second = PendingOps::new();
        helper
            .create_child_chain(&mut second, &[2u8; 20], &make_create("child-1"), 10)
            .unwrap();

        commit(&helper, first, 10);
        let err = helper.commit_block(second, &make_block(11), b"state").unwrap_err();
        assert!(matches!(err, BridgeError::AdmissionRejected { .. }));
        // The failed block left nothing behind.
        assert_eq!(
            helper.child_chain("child-1").unwrap().unwrap().owner,
            [1u8; 20]
        );
        assert!(helper.load_chain().unwrap().is_none());
    }

    #[test]
    fn test_commit_indexes_transactions() {
        let helper = make_helper();
        let key = make_key(8);
        let tx = Transaction {
            chain_id: MAIN.to_string(),
            from: address_of(&key.public_key()),
            nonce: 0,
            payload: TxCall::Transfer(TransferParams { to: [2u8; 20], amount: 5 }).encode(),
            signer: key.public_key(),
            signature: braid_types::identity::IdentitySignature::empty(SchemeTag::Ed25519),
        };
        let mut block = make_block(1);
        block.transactions.push(tx.clone());
        helper.commit_block(PendingOps::new(), &block, b"state").unwrap();

        let found = helper.get_tx_from_main_chain(&tx.hash()).unwrap().unwrap();
        assert_eq!(found.height, 1);
        assert_eq!(found.block_hash, block.hash());
        assert!(helper.get_tx_from_child_chain("child-1", &tx.hash()).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_second_create_always_rejected(id in "[a-z][a-z0-9-]{0,20}") {
            prop_assume!(id != MAIN);
            let helper = make_helper();
            let mut ops = PendingOps::new();
            prop_assert!(helper.create_child_chain(&mut ops, &[1u8; 20], &make_create(&id), 10).is_ok());
            commit(&helper, ops, 10);
            let err = helper.can_create_child_chain(&[1u8; 20], &make_create(&id), 11).unwrap_err();
            let is_admission = matches!(err, BridgeError::AdmissionRejected { .. });
            prop_assert!(is_admission);
        }

        #[test]
        fn prop_join_outside_window_or_underfunded_fails(height in 0u64..400, deposit in 0u128..2000) {
            let helper = make_helper();
            let mut ops = PendingOps::new();
            helper.create_child_chain(&mut ops, &[1u8; 20], &make_create("child-1"), 10).unwrap();
            commit(&helper, ops, 10);

            let key = make_key(3);
            let from = address_of(&key.public_key());
            let result = helper.validate_join_child_chain(&from, &make_join("child-1", &key, deposit), height);
            let inside = (100..200).contains(&height);
            prop_assert_eq!(result.is_ok(), inside && deposit >= 1000);
        }

        #[test]
        fn prop_reveal_matches_only_exact_commitment(
            salt in "[a-z]{1,16}",
            other_salt in "[a-z]{1,16}",
            deposit in 1u128..1_000_000,
            other_deposit in 1u128..1_000_000,
            swap_key in any::<bool>(),
        ) {
            let helper = make_helper();
            let key = make_key(5);
            let voter = address_of(&key.public_key());
            let ep = make_epoch(&[(voter, key.public_key())]);
            let committed_key = make_key(6).public_key().to_bytes();
            let mut ops = PendingOps::new();
            helper.vote_next_epoch(&mut ops, &ep, &voter, vote_hash(&committed_key, deposit, &salt), [1u8; 32], 80).unwrap();
            commit(&helper, ops, 80);

            let revealed_key = if swap_key { make_key(7).public_key().to_bytes() } else { committed_key.clone() };
            let params = RevealVoteParams { pubkey: revealed_key.clone(), deposit_amount: other_deposit, salt: other_salt.clone() };
            let exact = revealed_key == committed_key && other_deposit == deposit && other_salt == salt;
            prop_assert_eq!(helper.validate_reveal_vote(&ep, &voter, &params, 90).is_ok(), exact);
        }

        #[test]
        fn prop_used_ledger_entry_stays_used(hash in any::<[u8; 32]>(), from in any::<[u8; 20]>()) {
            let helper = make_helper();
            let mut ops = PendingOps::new();
            helper.mark_from_child_chain_tx(&mut ops, &from, "child-1", &hash, true).unwrap();
            commit(&helper, ops, 1);
            prop_assert_eq!(helper.validate_from_child_chain_tx(&from, "child-1", &hash).unwrap(), CrossChainTxState::Used);

            let mut ops = PendingOps::new();
            helper.mark_from_child_chain_tx(&mut ops, &from, "child-1", &hash, false).unwrap();
            commit(&helper, ops, 2);
            prop_assert_eq!(helper.validate_from_child_chain_tx(&from, "child-1", &hash).unwrap(), CrossChainTxState::Used);

            let mut ops = PendingOps::new();
            let replay = helper.mark_from_child_chain_tx(&mut ops, &from, "child-1", &hash, true);
            let is_replay = matches!(replay, Err(BridgeError::ReplayDetected { .. }));
            prop_assert!(is_replay);
        }
    }
}
