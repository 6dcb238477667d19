use braid_storage::StorageError;
use braid_types::error::BraidError;
use thiserror::Error;

/// Errors returned by the cross-chain protocol.
///
/// Handlers turn these into the rejection reason of the offending
/// transaction.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Child chain creation or validator join refused.
    #[error("admission rejected: {reason}")]
    AdmissionRejected { reason: String },

    /// A cross-chain reference was already consumed.
    #[error("replay detected: tx {tx_hash} from {chain_id} already used")]
    ReplayDetected { chain_id: String, tx_hash: String },

    #[error("invalid proof for {chain_id} at height {height}: {reason}")]
    ProofInvalid {
        chain_id: String,
        height: u64,
        reason: String,
    },

    #[error("vote rejected: {reason}")]
    VoteRejected { reason: String },

    #[error("unknown chain: {chain_id}")]
    UnknownChain { chain_id: String },

    /// A referenced transaction on another chain does not qualify.
    #[error("invalid cross-chain reference: {reason}")]
    InvalidReference { reason: String },

    #[error("bridge lock poisoned")]
    LockPoisoned,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("identity error: {0}")]
    Identity(#[from] BraidError),
}

impl BridgeError {
    pub(crate) fn admission(reason: impl Into<String>) -> Self {
        BridgeError::AdmissionRejected {
            reason: reason.into(),
        }
    }

    pub(crate) fn vote(reason: impl Into<String>) -> Self {
        BridgeError::VoteRejected {
            reason: reason.into(),
        }
    }
}
