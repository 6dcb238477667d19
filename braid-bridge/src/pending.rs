//! Deferred bridge mutations produced while applying one block.

use braid_storage::LedgerDirection;
use braid_types::epoch::{RevealedVote, VoteCommitment};
use braid_types::primitives::{Address, Hash, Height, TxHash};
use braid_types::proof::ChildChainProofData;
use braid_types::tx::{CreateChildChainParams, JoinChildChainParams};

/// One deferred mutation of bridge state.
///
/// Each op carries what it needs to be re-checked against committed state
/// when the block is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    CreateChildChain {
        owner: Address,
        params: CreateChildChainParams,
        height: Height,
    },
    JoinChildChain {
        from: Address,
        params: JoinChildChainParams,
        height: Height,
    },
    VoteNextEpoch(VoteCommitment),
    RevealVote {
        reveal: RevealedVote,
        /// Recomputed commitment hash the stored commitment must equal.
        vote_hash: Hash,
    },
    SaveProof {
        proof: ChildChainProofData,
        anchored_at: Height,
    },
    MarkLedger {
        direction: LedgerDirection,
        from: Address,
        chain_id: String,
        tx_hash: TxHash,
        used: bool,
    },
}

impl PendingOp {
    pub fn name(&self) -> &'static str {
        match self {
            PendingOp::CreateChildChain { .. } => "create-child-chain",
            PendingOp::JoinChildChain { .. } => "join-child-chain",
            PendingOp::VoteNextEpoch(_) => "vote-next-epoch",
            PendingOp::RevealVote { .. } => "reveal-vote",
            PendingOp::SaveProof { .. } => "save-proof",
            PendingOp::MarkLedger { .. } => "mark-ledger",
        }
    }
}

/// Ordered log of deferred mutations for one block.
///
/// Owned by the block pipeline for the lifetime of the block. Committed as
/// a whole or dropped as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOps {
    ops: Vec<PendingOp>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: PendingOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOp> {
        self.ops.iter()
    }

    /// Truncate to `len` ops, dropping what a failed transaction queued.
    pub fn truncate(&mut self, len: usize) {
        self.ops.truncate(len);
    }
}

impl IntoIterator for PendingOps {
    type Item = PendingOp;
    type IntoIter = std::vec::IntoIter<PendingOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
