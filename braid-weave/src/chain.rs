//! Block execution pipeline.
//!
//! A block is pre-checked in parallel, then validated and applied
//! transaction by transaction on a copy of world state with a fresh
//! [`PendingOps`]. Any failure discards both. On success the bridge ops,
//! block and state are committed in one batch, the new state is swapped in
//! and the post-commit hooks run.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use braid_bridge::{CrossChainHelper, PendingOps};
use braid_crypto::{address_of, verify};
use braid_types::block::{Block, BlockHeader};
use braid_types::epoch::{Epoch, RewardScheme};
use braid_types::primitives::*;
use braid_types::tx::{Transaction, TxCall};

use crate::block::{build_block, verify_block};
use crate::epoch::EpochEngine;
use crate::error::{RejectionKind, WeaveError};
use crate::registry::{CallbackRegistry, HookContext, TxContext};
use crate::state::WorldState;

/// Stateless checks: target chain, sender binding, signature and payload.
pub fn precheck_tx(chain_id: &str, tx: &Transaction) -> Result<TxCall, WeaveError> {
    if tx.chain_id != chain_id {
        return Err(WeaveError::invalid_tx(format!(
            "transaction for {} submitted to {}",
            tx.chain_id, chain_id
        )));
    }
    if address_of(&tx.signer) != tx.from {
        return Err(WeaveError::invalid_tx("sender does not match signer"));
    }
    verify(&tx.signer, &tx.signing_bytes(), &tx.signature)?;
    Ok(tx.call()?)
}

/// A transaction left out of a proposed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRejection {
    pub tx_hash: TxHash,
    pub kind: RejectionKind,
    pub reason: String,
}

/// A block that executed cleanly and is ready to commit.
#[derive(Debug)]
pub struct ExecutedBlock {
    block: Block,
    state: WorldState,
    ops: PendingOps,
}

impl ExecutedBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn pending_ops(&self) -> &PendingOps {
        &self.ops
    }
}

/// One chain's head, world state and epoch.
pub struct Chain {
    chain_id: String,
    helper: Arc<dyn CrossChainHelper>,
    registry: Arc<CallbackRegistry>,
    state: WorldState,
    epochs: EpochEngine,
    head: Option<BlockHeader>,
}

impl Chain {
    /// Start a chain from its genesis state and epoch, persisting the epoch.
    pub fn from_genesis(
        helper: Arc<dyn CrossChainHelper>,
        registry: Arc<CallbackRegistry>,
        state: WorldState,
        epoch: Epoch,
        scheme: RewardScheme,
    ) -> Result<Self, WeaveError> {
        if epoch.chain_id != helper.chain_id() {
            return Err(WeaveError::invalid_block(format!(
                "genesis epoch is for {}, helper runs {}",
                epoch.chain_id,
                helper.chain_id()
            )));
        }
        let epochs = EpochEngine::from_genesis(epoch, scheme)?;
        helper.save_epoch_state(None, epochs.epoch(), epochs.scheme(), &state.snapshot()?)?;
        info!(
            chain_id = %helper.chain_id(),
            epoch = epochs.epoch().number,
            validators = epochs.epoch().validators.len(),
            "chain started from genesis"
        );
        Ok(Self {
            chain_id: helper.chain_id().to_string(),
            helper,
            registry,
            state,
            epochs,
            head: None,
        })
    }

    /// Reload a chain from storage. `None` if no block was ever committed.
    pub fn resume(
        helper: Arc<dyn CrossChainHelper>,
        registry: Arc<CallbackRegistry>,
    ) -> Result<Option<Self>, WeaveError> {
        let Some(stored) = helper.load_chain()? else {
            return Ok(None);
        };
        let state = WorldState::from_snapshot(&stored.state_snapshot)?;
        info!(
            chain_id = %helper.chain_id(),
            height = stored.head.height,
            epoch = stored.epoch.number,
            "chain resumed"
        );
        Ok(Some(Self {
            chain_id: helper.chain_id().to_string(),
            helper,
            registry,
            state,
            epochs: EpochEngine::resume(stored.epoch, stored.reward_scheme),
            head: Some(stored.head),
        }))
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn helper(&self) -> &Arc<dyn CrossChainHelper> {
        &self.helper
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn epoch(&self) -> &Epoch {
        self.epochs.epoch()
    }

    pub fn reward_scheme(&self) -> &RewardScheme {
        self.epochs.scheme()
    }

    pub fn head(&self) -> Option<&BlockHeader> {
        self.head.as_ref()
    }

    /// Height the next block will have.
    pub fn next_height(&self) -> Height {
        self.head.as_ref().map(|h| h.height + 1).unwrap_or(0)
    }

    /// Admission check for a transaction against committed state. Nonces
    /// ahead of the account's current one are accepted.
    pub fn validate_tx(&self, tx: &Transaction) -> Result<(), WeaveError> {
        let call = precheck_tx(&self.chain_id, tx)?;
        let expected = self.state.nonce(&tx.from);
        if tx.nonce < expected {
            return Err(WeaveError::BadNonce {
                address: hex::encode(tx.from),
                expected,
                got: tx.nonce,
            });
        }
        if let Some(validate) = self.registry.lookup_validate(call.kind()) {
            let ctx = TxContext {
                helper: &*self.helper,
                tx,
                call: &call,
                tx_hash: tx.hash(),
                height: self.next_height(),
                epoch: self.epochs.epoch(),
            };
            validate(&ctx, &self.state)?;
        }
        Ok(())
    }

    /// Validate and apply one transaction onto `state`, queueing bridge
    /// mutations into `ops`.
    fn run_tx(
        &self,
        tx: &Transaction,
        call: &TxCall,
        height: Height,
        state: &mut WorldState,
        ops: &mut PendingOps,
    ) -> Result<(), WeaveError> {
        state.check_nonce(&tx.from, tx.nonce)?;
        let kind = call.kind();
        let ctx = TxContext {
            helper: &*self.helper,
            tx,
            call,
            tx_hash: tx.hash(),
            height,
            epoch: self.epochs.epoch(),
        };
        if let Some(validate) = self.registry.lookup_validate(kind) {
            validate(&ctx, &*state)?;
        }
        match (self.registry.lookup_apply(kind), call) {
            (Some(apply), _) => apply(&ctx, &mut *state, &mut *ops)?,
            (None, TxCall::Transfer(params)) => state.transfer(&tx.from, &params.to, params.amount)?,
            (None, _) => {
                return Err(WeaveError::invalid_tx(format!("no handler for {}", kind)));
            }
        }
        state.bump_nonce(&tx.from);
        Ok(())
    }

    /// Execute a block without committing it. Any invalid transaction
    /// rejects the whole block.
    pub fn execute_block(&self, block: Block) -> Result<ExecutedBlock, WeaveError> {
        verify_block(&block, &self.chain_id, self.head.as_ref(), self.epochs.epoch())?;
        let height = block.height();

        let calls: Vec<TxCall> = block
            .transactions
            .par_iter()
            .map(|tx| precheck_tx(&self.chain_id, tx))
            .collect::<Result<_, _>>()
            .inspect_err(|e| warn!(height, error = %e, "block rejected in precheck"))?;

        let mut state = self.state.clone();
        let mut ops = PendingOps::new();
        for (index, (tx, call)) in block.transactions.iter().zip(&calls).enumerate() {
            if let Err(e) = self.run_tx(tx, call, height, &mut state, &mut ops) {
                warn!(
                    height,
                    index,
                    tx_hash = %hex::encode(tx.hash()),
                    error = %e,
                    "block aborted"
                );
                return Err(e);
            }
        }
        Ok(ExecutedBlock { block, state, ops })
    }

    /// Commit an executed block and run the post-commit hooks.
    ///
    /// Hook failures are logged and the first one is returned, but the block
    /// stays committed and the epoch state is persisted regardless.
    pub fn commit_block(&mut self, executed: ExecutedBlock) -> Result<(), WeaveError> {
        let ExecutedBlock { block, state, ops } = executed;
        if block.header.prev_hash != self.head.as_ref().map(|h| h.hash()).unwrap_or(ZERO_HASH) {
            return Err(WeaveError::invalid_block("head moved since the block was executed"));
        }
        let snapshot = state.snapshot()?;
        self.helper.commit_block(ops, &block, &snapshot)?;
        self.state = state;
        self.head = Some(block.header.clone());

        let registry = Arc::clone(&self.registry);
        let mut first_error = None;
        for (name, hook) in registry.post_commit_hooks() {
            let mut ctx = HookContext {
                helper: &*self.helper,
                block: &block,
                state: &mut self.state,
                epochs: &mut self.epochs,
            };
            if let Err(e) = hook(&mut ctx) {
                error!(hook = name, height = block.height(), error = %e, "post-commit hook failed");
                first_error.get_or_insert(WeaveError::Hook {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let ended = self.epochs.take_ended();
        self.helper.save_epoch_state(
            ended.as_ref(),
            self.epochs.epoch(),
            self.epochs.scheme(),
            &self.state.snapshot()?,
        )?;
        debug!(height = block.height(), txs = block.transactions.len(), "block applied");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Execute and commit a block received from elsewhere.
    pub fn apply_block(&mut self, block: Block) -> Result<(), WeaveError> {
        let executed = self.execute_block(block)?;
        self.commit_block(executed)
    }

    /// Build, execute and commit a block from `candidates`, leaving out the
    /// transactions that fail.
    pub fn propose_block(
        &mut self,
        candidates: Vec<Transaction>,
        proposer: Address,
        timestamp: Timestamp,
    ) -> Result<(Block, Vec<TxRejection>), WeaveError> {
        let height = self.next_height();
        let prechecked: Vec<_> = candidates
            .into_par_iter()
            .map(|tx| {
                let result = precheck_tx(&self.chain_id, &tx);
                (tx, result)
            })
            .collect();

        let mut state = self.state.clone();
        let mut ops = PendingOps::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (tx, result) in prechecked {
            let outcome = result.and_then(|call| {
                // Plain transfers fail before touching state; only handler
                // calls need a snapshot to roll back to.
                let before = self
                    .registry
                    .lookup_apply(call.kind())
                    .map(|_| state.clone());
                let queued = ops.len();
                let applied = self.run_tx(&tx, &call, height, &mut state, &mut ops);
                if applied.is_err() {
                    if let Some(before) = before {
                        state = before;
                    }
                    ops.truncate(queued);
                }
                applied
            });
            match outcome {
                Ok(()) => accepted.push(tx),
                Err(e) => {
                    debug!(height, tx_hash = %hex::encode(tx.hash()), error = %e, "transaction left out");
                    rejected.push(TxRejection {
                        tx_hash: tx.hash(),
                        kind: e.rejection_kind(),
                        reason: e.rejection_reason(),
                    });
                }
            }
        }

        let block = build_block(&self.chain_id, self.head.as_ref(), accepted, proposer, timestamp);
        verify_block(&block, &self.chain_id, self.head.as_ref(), self.epochs.epoch())?;
        self.commit_block(ExecutedBlock {
            block: block.clone(),
            state,
            ops,
        })?;
        Ok((block, rejected))
    }
}
