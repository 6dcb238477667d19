//! Transactions and their call payloads.
//!
//! A payload is one selector byte naming the [`FunctionKind`] followed by the
//! borsh encoding of that function's parameters. Dispatch keys on the
//! selector alone, so a node can route a transaction before decoding it.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::TX_HASH_DOMAIN;
use crate::error::BraidError;
use crate::identity::{IdentitySignature, PublicIdentity};
use crate::primitives::*;

/// The function a transaction invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionKind {
    /// Plain value transfer, handled by ordinary rules.
    Transfer = 0x00,
    CreateChildChain = 0x01,
    JoinChildChain = 0x02,
    VoteNextEpoch = 0x03,
    RevealVote = 0x04,
    AnchorChildChainProof = 0x05,
    DepositInMainChain = 0x06,
    DepositInChildChain = 0x07,
    WithdrawFromChildChain = 0x08,
    WithdrawFromMainChain = 0x09,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 10] = [
        FunctionKind::Transfer,
        FunctionKind::CreateChildChain,
        FunctionKind::JoinChildChain,
        FunctionKind::VoteNextEpoch,
        FunctionKind::RevealVote,
        FunctionKind::AnchorChildChainProof,
        FunctionKind::DepositInMainChain,
        FunctionKind::DepositInChildChain,
        FunctionKind::WithdrawFromChildChain,
        FunctionKind::WithdrawFromMainChain,
    ];

    pub fn selector(&self) -> u8 {
        *self as u8
    }

    pub fn from_selector(byte: u8) -> Result<Self, BraidError> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.selector() == byte)
            .ok_or(BraidError::UnknownFunction(byte))
    }

    /// Read the function kind from the first payload byte.
    pub fn from_payload(payload: &[u8]) -> Result<Self, BraidError> {
        let first = payload.first().ok_or(BraidError::EmptyPayload)?;
        Self::from_selector(*first)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Transfer => "Transfer",
            FunctionKind::CreateChildChain => "CreateChildChain",
            FunctionKind::JoinChildChain => "JoinChildChain",
            FunctionKind::VoteNextEpoch => "VoteNextEpoch",
            FunctionKind::RevealVote => "RevealVote",
            FunctionKind::AnchorChildChainProof => "AnchorChildChainProof",
            FunctionKind::DepositInMainChain => "DepositInMainChain",
            FunctionKind::DepositInChildChain => "DepositInChildChain",
            FunctionKind::WithdrawFromChildChain => "WithdrawFromChildChain",
            FunctionKind::WithdrawFromMainChain => "WithdrawFromMainChain",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TransferParams {
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CreateChildChainParams {
    pub chain_id: String,
    pub min_validators: u16,
    pub min_deposit_amount: Amount,
    pub start_block: Height,
    pub end_block: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct JoinChildChainParams {
    /// Tagged validator public key; checked against the identity contract
    /// during validation rather than at decode time.
    pub pubkey: Vec<u8>,
    pub chain_id: String,
    pub deposit_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VoteNextEpochParams {
    pub vote_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RevealVoteParams {
    pub pubkey: Vec<u8>,
    pub deposit_amount: Amount,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AnchorProofParams {
    /// Borsh-encoded `ChildChainProofData`.
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DepositInMainChainParams {
    pub chain_id: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DepositInChildChainParams {
    pub main_tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WithdrawFromChildChainParams {
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WithdrawFromMainChainParams {
    pub chain_id: String,
    pub child_tx_hash: TxHash,
}

/// A fully decoded transaction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxCall {
    Transfer(TransferParams),
    CreateChildChain(CreateChildChainParams),
    JoinChildChain(JoinChildChainParams),
    VoteNextEpoch(VoteNextEpochParams),
    RevealVote(RevealVoteParams),
    AnchorChildChainProof(AnchorProofParams),
    DepositInMainChain(DepositInMainChainParams),
    DepositInChildChain(DepositInChildChainParams),
    WithdrawFromChildChain(WithdrawFromChildChainParams),
    WithdrawFromMainChain(WithdrawFromMainChainParams),
}

impl TxCall {
    pub fn kind(&self) -> FunctionKind {
        match self {
            TxCall::Transfer(_) => FunctionKind::Transfer,
            TxCall::CreateChildChain(_) => FunctionKind::CreateChildChain,
            TxCall::JoinChildChain(_) => FunctionKind::JoinChildChain,
            TxCall::VoteNextEpoch(_) => FunctionKind::VoteNextEpoch,
            TxCall::RevealVote(_) => FunctionKind::RevealVote,
            TxCall::AnchorChildChainProof(_) => FunctionKind::AnchorChildChainProof,
            TxCall::DepositInMainChain(_) => FunctionKind::DepositInMainChain,
            TxCall::DepositInChildChain(_) => FunctionKind::DepositInChildChain,
            TxCall::WithdrawFromChildChain(_) => FunctionKind::WithdrawFromChildChain,
            TxCall::WithdrawFromMainChain(_) => FunctionKind::WithdrawFromMainChain,
        }
    }

    /// Encode as selector byte plus borsh parameters.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind().selector()];
        let params = match self {
            TxCall::Transfer(p) => borsh::to_vec(p),
            TxCall::CreateChildChain(p) => borsh::to_vec(p),
            TxCall::JoinChildChain(p) => borsh::to_vec(p),
            TxCall::VoteNextEpoch(p) => borsh::to_vec(p),
            TxCall::RevealVote(p) => borsh::to_vec(p),
            TxCall::AnchorChildChainProof(p) => borsh::to_vec(p),
            TxCall::DepositInMainChain(p) => borsh::to_vec(p),
            TxCall::DepositInChildChain(p) => borsh::to_vec(p),
            TxCall::WithdrawFromChildChain(p) => borsh::to_vec(p),
            TxCall::WithdrawFromMainChain(p) => borsh::to_vec(p),
        };
        // Writing into a Vec cannot fail.
        if let Ok(bytes) = params {
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Decode a payload produced by [`TxCall::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self, BraidError> {
        let kind = FunctionKind::from_payload(payload)?;
        let params = &payload[1..];
        let malformed = |e: std::io::Error| BraidError::MalformedCall {
            function: kind.name().to_string(),
            reason: e.to_string(),
        };
        Ok(match kind {
            FunctionKind::Transfer => {
                TxCall::Transfer(TransferParams::try_from_slice(params).map_err(malformed)?)
            }
            FunctionKind::CreateChildChain => TxCall::CreateChildChain(
                CreateChildChainParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::JoinChildChain => TxCall::JoinChildChain(
                JoinChildChainParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::VoteNextEpoch => TxCall::VoteNextEpoch(
                VoteNextEpochParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::RevealVote => {
                TxCall::RevealVote(RevealVoteParams::try_from_slice(params).map_err(malformed)?)
            }
            FunctionKind::AnchorChildChainProof => TxCall::AnchorChildChainProof(
                AnchorProofParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::DepositInMainChain => TxCall::DepositInMainChain(
                DepositInMainChainParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::DepositInChildChain => TxCall::DepositInChildChain(
                DepositInChildChainParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::WithdrawFromChildChain => TxCall::WithdrawFromChildChain(
                WithdrawFromChildChainParams::try_from_slice(params).map_err(malformed)?,
            ),
            FunctionKind::WithdrawFromMainChain => TxCall::WithdrawFromMainChain(
                WithdrawFromMainChainParams::try_from_slice(params).map_err(malformed)?,
            ),
        })
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain this transaction is meant for; prevents cross-chain replay of
    /// the raw transaction itself.
    pub chain_id: String,
    pub from: Address,
    pub nonce: u64,
    #[serde(with = "crate::primitives::serde_hex")]
    pub payload: Vec<u8>,
    pub signer: PublicIdentity,
    pub signature: IdentitySignature,
}

impl Transaction {
    /// Bytes covered by the signature and the transaction hash.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let signer = self.signer.to_bytes();
        let mut data =
            Vec::with_capacity(self.chain_id.len() + self.payload.len() + signer.len() + 40);
        data.extend_from_slice(&(self.chain_id.len() as u32).to_le_bytes());
        data.extend_from_slice(self.chain_id.as_bytes());
        data.extend_from_slice(&self.from);
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.payload);
        data.extend_from_slice(&signer);
        data
    }

    /// Transaction hash. Excludes the signature.
    pub fn hash(&self) -> TxHash {
        let mut hasher = blake3::Hasher::new_derive_key(TX_HASH_DOMAIN);
        hasher.update(&self.signing_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn kind(&self) -> Result<FunctionKind, BraidError> {
        FunctionKind::from_payload(&self.payload)
    }

    pub fn call(&self) -> Result<TxCall, BraidError> {
        TxCall::decode(&self.payload)
    }
}
