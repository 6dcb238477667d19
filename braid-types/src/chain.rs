use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::identity::PublicIdentity;
use crate::primitives::*;

/// Lifecycle of a child chain on the main chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum ChildChainStatus {
    /// Created, collecting validators.
    Pending,
    /// Validator quota met by the end of the join window.
    Launched,
    /// Join window closed without enough validators.
    Rejected,
}

impl fmt::Display for ChildChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChildChainStatus::Pending => "pending",
            ChildChainStatus::Launched => "launched",
            ChildChainStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A validator that joined a child chain with a deposit.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChildChainValidator {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    pub pubkey: PublicIdentity,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub deposit_amount: Amount,
}

/// Main-chain record of a child chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChildChainRecord {
    pub chain_id: String,
    /// Account that created the chain.
    #[serde(with = "crate::primitives::serde_hex")]
    pub owner: Address,
    pub min_validators: u16,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub min_deposit_amount: Amount,
    pub start_block: Height,
    pub end_block: Height,
    /// Validators in join order; addresses are unique.
    pub validators: Vec<ChildChainValidator>,
    pub status: ChildChainStatus,
    /// Height at which the launch decision was applied.
    pub decided_at: Option<Height>,
    /// Number of anchored validator set changes since launch.
    #[serde(default)]
    pub validator_epoch: u64,
}

impl ChildChainRecord {
    pub fn new(
        chain_id: String,
        owner: Address,
        min_validators: u16,
        min_deposit_amount: Amount,
        start_block: Height,
        end_block: Height,
    ) -> Self {
        Self {
            chain_id,
            owner,
            min_validators,
            min_deposit_amount,
            start_block,
            end_block,
            validators: Vec::new(),
            status: ChildChainStatus::Pending,
            decided_at: None,
            validator_epoch: 0,
        }
    }

    pub fn has_validator(&self, address: &Address) -> bool {
        self.validators.iter().any(|v| &v.address == address)
    }

    pub fn validator(&self, address: &Address) -> Option<&ChildChainValidator> {
        self.validators.iter().find(|v| &v.address == address)
    }

    /// Whether `height` is inside the join window `[start_block, end_block)`.
    pub fn join_window_open(&self, height: Height) -> bool {
        height >= self.start_block && height < self.end_block
    }

    pub fn quota_met(&self) -> bool {
        self.validators.len() >= self.min_validators as usize
    }

    pub fn total_deposit(&self) -> Amount {
        total_stake(&self.validators)
    }
}

/// Sum of the deposits of `validators`.
pub fn total_stake(validators: &[ChildChainValidator]) -> Amount {
    validators
        .iter()
        .fold(0u128, |acc, v| acc.saturating_add(v.deposit_amount))
}

/// Replay-ledger state of a cross-chain reference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum CrossChainTxState {
    /// Seen but not consumed.
    Unused,
    /// Consumed; any further reference must be rejected.
    Used,
    /// Never recorded.
    Unknown,
}
