//! Child chain finality proofs anchored on the main chain.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::chain::ChildChainValidator;
use crate::constants::{CHILD_HEADER_DOMAIN, VALIDATOR_SET_DOMAIN};
use crate::identity::IdentitySignature;
use crate::primitives::*;

/// Header of a child chain block as carried inside a proof.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChildBlockHeader {
    pub chain_id: String,
    pub height: Height,
    #[serde(with = "crate::primitives::serde_hex")]
    pub prev_hash: Hash,
    #[serde(with = "crate::primitives::serde_hex")]
    pub state_root: Hash,
    #[serde(with = "crate::primitives::serde_hex")]
    pub tx_root: Hash,
    pub timestamp: Timestamp,
}

impl ChildBlockHeader {
    /// Domain-separated header hash. Commit signatures sign this value.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new_derive_key(CHILD_HEADER_DOMAIN);
        hasher.update(&(self.chain_id.len() as u32).to_le_bytes());
        hasher.update(self.chain_id.as_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.prev_hash);
        hasher.update(&self.state_root);
        hasher.update(&self.tx_root);
        hasher.update(&self.timestamp.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// A child chain validator's signature over a header hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CommitSignature {
    #[serde(with = "crate::primitives::serde_hex")]
    pub validator: Address,
    pub signature: IdentitySignature,
}

/// Replacement of a child chain's validator set, in force for headers from
/// `effective_height` on.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ValidatorSetChange {
    pub chain_id: String,
    /// One past the validator epoch it replaces.
    pub epoch: u64,
    pub effective_height: Height,
    pub validators: Vec<ChildChainValidator>,
}

impl ValidatorSetChange {
    /// Domain-separated hash the outgoing validators sign.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new_derive_key(VALIDATOR_SET_DOMAIN);
        hasher.update(&borsh::to_vec(self).unwrap_or_default());
        *hasher.finalize().as_bytes()
    }
}

/// A validator set change with the outgoing set's signatures over its hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignedValidatorSetChange {
    pub change: ValidatorSetChange,
    pub signatures: Vec<CommitSignature>,
}

/// A contiguous run of child chain headers with their commit signatures.
///
/// `commits[i]` holds the signatures for `headers[i]`. `set_changes` are
/// ordered by epoch; each one switches the signing set for the headers at
/// and after its effective height.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChildChainProofData {
    pub chain_id: String,
    pub headers: Vec<ChildBlockHeader>,
    pub commits: Vec<Vec<CommitSignature>>,
    #[serde(default)]
    pub set_changes: Vec<SignedValidatorSetChange>,
}

impl ChildChainProofData {
    pub fn first_height(&self) -> Option<Height> {
        self.headers.first().map(|h| h.height)
    }

    pub fn last_height(&self) -> Option<Height> {
        self.headers.last().map(|h| h.height)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }
}

/// Latest anchored position of a child chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AnchorCheckpoint {
    pub chain_id: String,
    pub height: Height,
    #[serde(with = "crate::primitives::serde_hex")]
    pub header_hash: Hash,
    /// Main chain height at which the proof was saved.
    pub anchored_at: Height,
}
