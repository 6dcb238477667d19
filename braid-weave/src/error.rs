use std::fmt;

use braid_bridge::BridgeError;
use braid_storage::StorageError;
use braid_types::error::BraidError;
use thiserror::Error;

/// Errors from block execution, dispatch and the epoch engine.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// A handler or hook was registered twice. Fatal at startup.
    #[error("registration conflict: {key} already registered")]
    RegistrationConflict { key: String },

    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("insufficient balance for {address}: need {needed}, have {available}")]
    InsufficientBalance {
        address: String,
        needed: u128,
        available: u128,
    },

    #[error("bad nonce for {address}: expected {expected}, got {got}")]
    BadNonce {
        address: String,
        expected: u64,
        got: u64,
    },

    #[error("reward error: {reason}")]
    Reward { reason: String },

    #[error("post-commit hook {name} failed: {reason}")]
    Hook { name: String, reason: String },

    #[error("mempool is full")]
    MempoolFull,

    #[error("state snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("identity error: {0}")]
    Identity(#[from] BraidError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Category a rejected transaction is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Admission,
    Replay,
    Proof,
    Vote,
    Invalid,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionKind::Admission => "admission",
            RejectionKind::Replay => "replay",
            RejectionKind::Proof => "proof",
            RejectionKind::Vote => "vote",
            RejectionKind::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

impl WeaveError {
    pub fn rejection_kind(&self) -> RejectionKind {
        match self {
            WeaveError::Bridge(BridgeError::AdmissionRejected { .. })
            | WeaveError::Bridge(BridgeError::UnknownChain { .. }) => RejectionKind::Admission,
            WeaveError::Bridge(BridgeError::ReplayDetected { .. }) => RejectionKind::Replay,
            WeaveError::Bridge(BridgeError::ProofInvalid { .. }) => RejectionKind::Proof,
            WeaveError::Bridge(BridgeError::VoteRejected { .. }) => RejectionKind::Vote,
            _ => RejectionKind::Invalid,
        }
    }

    /// User-facing reason, prefixed with its category.
    pub fn rejection_reason(&self) -> String {
        format!("{}: {}", self.rejection_kind(), self)
    }

    pub(crate) fn invalid_tx(reason: impl Into<String>) -> Self {
        WeaveError::InvalidTransaction {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_block(reason: impl Into<String>) -> Self {
        WeaveError::InvalidBlock {
            reason: reason.into(),
        }
    }
}
