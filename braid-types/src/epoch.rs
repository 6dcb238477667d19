use std::ops::Range;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{
    REVEAL_END_PERCENT, REVEAL_START_PERCENT, VOTE_HASH_DOMAIN, VOTE_START_PERCENT,
};
use crate::identity::PublicIdentity;
use crate::primitives::*;

/// Epoch lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum EpochStatus {
    NotStarted,
    Running,
    Ended,
}

/// A member of an epoch's validator set.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EpochValidator {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    pub pubkey: PublicIdentity,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub amount: Amount,
}

/// A fixed block range with a fixed validator set and reward rate.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Epoch {
    pub chain_id: String,
    pub number: u64,
    pub validators: Vec<EpochValidator>,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub reward_per_block: Amount,
    pub start_block: Height,
    /// Last block of the epoch (inclusive).
    pub end_block: Height,
    pub start_time: Timestamp,
    /// Zero until the epoch ends.
    pub end_time: Timestamp,
    pub blocks_produced: u64,
    pub status: EpochStatus,
    /// Unspent reward carried over from the previous epoch.
    #[serde(with = "crate::primitives::serde_decimal")]
    pub carried_over: Amount,
}

impl Epoch {
    /// Number of blocks in the epoch.
    pub fn length(&self) -> u64 {
        self.end_block.saturating_sub(self.start_block) + 1
    }

    pub fn contains(&self, height: Height) -> bool {
        height >= self.start_block && height <= self.end_block
    }

    pub fn validator(&self, address: &Address) -> Option<&EpochValidator> {
        self.validators.iter().find(|v| &v.address == address)
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validator(address).is_some()
    }

    pub fn total_stake(&self) -> Amount {
        self.validators
            .iter()
            .fold(0u128, |acc, v| acc.saturating_add(v.amount))
    }

    /// Reward reserved for this epoch: `reward_per_block × length`.
    pub fn reward_pool(&self) -> Amount {
        self.reward_per_block
            .saturating_mul(self.length() as Amount)
    }
}

/// Parameters of the decaying block reward.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RewardScheme {
    #[serde(with = "crate::primitives::serde_decimal")]
    pub total_reward: Amount,
    /// Portion of the total distributed outside block rewards.
    #[serde(with = "crate::primitives::serde_decimal")]
    pub pre_allocated: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub added_per_year: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub reward_first_year: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub descend_per_year: Amount,
    /// Block reward reserved so far by started epochs.
    #[serde(with = "crate::primitives::serde_decimal")]
    pub allocated: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub epochs_per_year: u64,
}

impl RewardScheme {
    /// Reward that may still be allocated to future epochs.
    pub fn remaining(&self) -> Amount {
        self.total_reward
            .saturating_sub(self.pre_allocated)
            .saturating_sub(self.allocated)
    }
}

/// Commit phase record: a validator's hidden vote for the next epoch.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct VoteCommitment {
    pub chain_id: String,
    #[serde(with = "crate::primitives::serde_hex")]
    pub voter: Address,
    pub epoch: u64,
    #[serde(with = "crate::primitives::serde_hex")]
    pub vote_hash: Hash,
    #[serde(with = "crate::primitives::serde_hex")]
    pub tx_hash: TxHash,
}

/// Reveal phase record: a candidate entry for the next validator set.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct RevealedVote {
    pub chain_id: String,
    #[serde(with = "crate::primitives::serde_hex")]
    pub voter: Address,
    pub epoch: u64,
    pub pubkey: PublicIdentity,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub deposit_amount: Amount,
    #[serde(with = "crate::primitives::serde_hex")]
    pub tx_hash: TxHash,
}

/// Where commit and reveal phases sit inside an epoch, in percent of its
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingWindow {
    pub vote_start_percent: u64,
    pub reveal_start_percent: u64,
    pub reveal_end_percent: u64,
}

impl Default for VotingWindow {
    fn default() -> Self {
        Self {
            vote_start_percent: VOTE_START_PERCENT,
            reveal_start_percent: REVEAL_START_PERCENT,
            reveal_end_percent: REVEAL_END_PERCENT,
        }
    }
}

impl VotingWindow {
    fn offset(epoch: &Epoch, percent: u64) -> Height {
        let length = epoch.length() as u128;
        epoch.start_block + (length * percent.min(100) as u128 / 100) as u64
    }

    /// Heights at which a vote commitment is accepted.
    pub fn commit_range(&self, epoch: &Epoch) -> Range<Height> {
        Self::offset(epoch, self.vote_start_percent)..Self::offset(epoch, self.reveal_start_percent)
    }

    /// Heights at which a reveal is accepted.
    pub fn reveal_range(&self, epoch: &Epoch) -> Range<Height> {
        Self::offset(epoch, self.reveal_start_percent)..Self::offset(epoch, self.reveal_end_percent)
    }

    pub fn is_valid(&self) -> bool {
        self.vote_start_percent < self.reveal_start_percent
            && self.reveal_start_percent < self.reveal_end_percent
            && self.reveal_end_percent <= 100
    }
}

/// Commitment hash over a validator's next-epoch vote.
///
/// `pubkey` is the tagged identity encoding exactly as submitted, the
/// deposit is big-endian.
pub fn vote_hash(pubkey: &[u8], deposit_amount: Amount, salt: &str) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(VOTE_HASH_DOMAIN);
    hasher.update(&(pubkey.len() as u32).to_le_bytes());
    hasher.update(pubkey);
    hasher.update(&deposit_amount.to_be_bytes());
    hasher.update(salt.as_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_epoch(start: Height, end: Height) -> Epoch {
        Epoch {
            chain_id: "braid-main".to_string(),
            number: 0,
            validators: vec![EpochValidator {
                address: [1u8; 20],
                pubkey: PublicIdentity::Ed25519([1u8; 32]),
                amount: 10,
            }],
            reward_per_block: 3,
            start_block: start,
            end_block: end,
            start_time: 0,
            end_time: 0,
            blocks_produced: 0,
            status: EpochStatus::Running,
            carried_over: 0,
        }
    }

    #[test]
    fn test_epoch_length_inclusive() {
        let epoch = make_epoch(0, 99);
        assert_eq!(epoch.length(), 100);
        assert!(epoch.contains(99));
        assert!(!epoch.contains(100));
        assert_eq!(epoch.reward_pool(), 300);
    }

    #[test]
    fn test_voting_window_ranges() {
        let epoch = make_epoch(0, 99);
        let window = VotingWindow::default();
        assert_eq!(window.commit_range(&epoch), 75..85);
        assert_eq!(window.reveal_range(&epoch), 85..95);

        let later = make_epoch(1000, 1099);
        assert_eq!(window.commit_range(&later), 1075..1085);
        assert!(window.is_valid());
    }

    #[test]
    fn test_vote_hash_binds_every_input() {
        let pk = PublicIdentity::Ed25519([4u8; 32]).to_bytes();
        let h = vote_hash(&pk, 1000, "salt");
        assert_eq!(h, vote_hash(&pk, 1000, "salt"));
        assert_ne!(h, vote_hash(&pk, 1001, "salt"));
        assert_ne!(h, vote_hash(&pk, 1000, "salt2"));
        let other = PublicIdentity::Ed25519([5u8; 32]).to_bytes();
        assert_ne!(h, vote_hash(&other, 1000, "salt"));
    }

    #[test]
    fn test_remaining_reward() {
        let scheme = RewardScheme {
            total_reward: 1000,
            pre_allocated: 600,
            added_per_year: 0,
            reward_first_year: 100,
            descend_per_year: 10,
            allocated: 150,
            epochs_per_year: 10,
        };
        assert_eq!(scheme.remaining(), 250);
    }
}
