//! Epoch state machine: `NotStarted → Running → Ended`.

use std::collections::BTreeMap;

use tracing::{info, warn};

use braid_types::epoch::{Epoch, EpochStatus, EpochValidator, RevealedVote, RewardScheme};
use braid_types::primitives::*;

use crate::error::WeaveError;
use crate::reward;

/// Current epoch of a chain together with its reward scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochEngine {
    epoch: Epoch,
    scheme: RewardScheme,
    /// Epoch closed by the last rollover, until it is persisted.
    ended: Option<Epoch>,
}

impl EpochEngine {
    /// Engine for a chain starting at `epoch`. Reserves the epoch's reward
    /// unless the scheme already accounts for it.
    pub fn from_genesis(mut epoch: Epoch, mut scheme: RewardScheme) -> Result<Self, WeaveError> {
        if epoch.end_block < epoch.start_block {
            return Err(WeaveError::Reward {
                reason: format!(
                    "epoch {} ends at {} before it starts at {}",
                    epoch.number, epoch.end_block, epoch.start_block
                ),
            });
        }
        if scheme.allocated == 0 {
            reward::adopt_epoch(&mut scheme, &mut epoch)?;
        }
        if scheme.allocated > scheme.total_reward {
            return Err(WeaveError::Reward {
                reason: format!(
                    "allocated {} exceeds total reward {}",
                    scheme.allocated, scheme.total_reward
                ),
            });
        }
        Ok(Self {
            epoch,
            scheme,
            ended: None,
        })
    }

    /// Engine restored from persisted state, as-is.
    pub fn resume(epoch: Epoch, scheme: RewardScheme) -> Self {
        Self {
            epoch,
            scheme,
            ended: None,
        }
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn scheme(&self) -> &RewardScheme {
        &self.scheme
    }

    pub fn take_ended(&mut self) -> Option<Epoch> {
        self.ended.take()
    }

    /// Count a produced block. Returns the reward it earns, zero outside
    /// the epoch's range.
    pub fn record_block(&mut self, height: Height) -> Amount {
        if !self.epoch.contains(height) || self.epoch.status == EpochStatus::Ended {
            return 0;
        }
        if self.epoch.status == EpochStatus::NotStarted {
            self.epoch.status = EpochStatus::Running;
        }
        if self.epoch.blocks_produced >= self.epoch.length() {
            return 0;
        }
        self.epoch.blocks_produced += 1;
        self.epoch.reward_per_block
    }

    /// Whether the block at `height` closes the epoch. Heights past the end
    /// also qualify, so a rollover that failed is retried on the next block.
    pub fn should_roll_over(&self, height: Height) -> bool {
        height >= self.epoch.end_block && self.epoch.status != EpochStatus::Ended
    }

    /// End the current epoch and start the next one.
    ///
    /// The next validator set is the current one updated by `candidates`:
    /// a revealed deposit replaces the validator's stake, a deposit of zero
    /// removes it. Unspent reward rolls into the next epoch's pool. On error
    /// the engine is left unchanged.
    pub fn roll_over(
        &mut self,
        timestamp: Timestamp,
        candidates: &[RevealedVote],
    ) -> Result<&Epoch, WeaveError> {
        let mut ended = self.epoch.clone();
        ended.status = EpochStatus::Ended;
        ended.end_time = timestamp;
        let mut scheme = self.scheme.clone();
        let carried = reward::release_unspent(&mut scheme, &ended);

        let length = ended.length();
        let number = ended.number + 1;
        let reward_per_block = reward::plan_epoch(&mut scheme, number, length, carried)?;
        let start_block = ended.end_block + 1;

        let mut validators = next_validators(&ended, candidates);
        if validators.is_empty() {
            warn!(
                chain_id = %ended.chain_id,
                epoch = number,
                "every validator left, keeping the previous set"
            );
            validators = ended.validators.clone();
        }

        self.scheme = scheme;
        self.epoch = Epoch {
            chain_id: ended.chain_id.clone(),
            number,
            validators,
            reward_per_block,
            start_block,
            end_block: start_block + length - 1,
            start_time: timestamp,
            end_time: 0,
            blocks_produced: 0,
            status: EpochStatus::NotStarted,
            carried_over: carried,
        };
        info!(
            chain_id = %self.epoch.chain_id,
            ended = ended.number,
            produced = ended.blocks_produced,
            epoch = number,
            validators = self.epoch.validators.len(),
            reward_per_block = reward_per_block,
            carried = carried,
            "epoch rolled over"
        );
        self.ended = Some(ended);
        Ok(&self.epoch)
    }
}

fn next_validators(ended: &Epoch, candidates: &[RevealedVote]) -> Vec<EpochValidator> {
    let mut set: BTreeMap<Address, EpochValidator> = ended
        .validators
        .iter()
        .map(|v| (v.address, v.clone()))
        .collect();
    for vote in candidates {
        if vote.deposit_amount == 0 {
            set.remove(&vote.voter);
        } else {
            set.insert(
                vote.voter,
                EpochValidator {
                    address: vote.voter,
                    pubkey: vote.pubkey.clone(),
                    amount: vote.deposit_amount,
                },
            );
        }
    }
    set.into_values().collect()
}

#[cfg(test)]
mod tests {
    use braid_types::identity::PublicIdentity;
    use proptest::prelude::*;

    use super::*;

    fn make_scheme() -> RewardScheme {
        RewardScheme {
            total_reward: 10_000_000,
            pre_allocated: 1_000_000,
            added_per_year: 0,
            reward_first_year: 1_200_000,
            descend_per_year: 100_000,
            allocated: 0,
            epochs_per_year: 12,
        }
    }

    fn make_validator(byte: u8, amount: Amount) -> EpochValidator {
        EpochValidator {
            address: [byte; 20],
            pubkey: PublicIdentity::Ed25519([byte; 32]),
            amount,
        }
    }

    fn make_epoch(reward_per_block: Amount) -> Epoch {
        Epoch {
            chain_id: "braid-main".to_string(),
            number: 0,
            validators: vec![make_validator(1, 100), make_validator(2, 100)],
            reward_per_block,
            start_block: 0,
            end_block: 99,
            start_time: 0,
            end_time: 0,
            blocks_produced: 0,
            status: EpochStatus::NotStarted,
            carried_over: 0,
        }
    }

    fn make_reveal(byte: u8, deposit: Amount) -> RevealedVote {
        RevealedVote {
            chain_id: "braid-main".to_string(),
            voter: [byte; 20],
            epoch: 0,
            pubkey: PublicIdentity::Ed25519([byte + 100; 32]),
            deposit_amount: deposit,
            tx_hash: [0u8; 32],
        }
    }

    #[test]
    fn test_genesis_reserves_reward() {
        let engine = EpochEngine::from_genesis(make_epoch(50), make_scheme()).unwrap();
        assert_eq!(engine.scheme().allocated, 5_000);
        assert_eq!(engine.epoch().status, EpochStatus::NotStarted);
    }

    #[test]
    fn test_record_block_starts_epoch() {
        let mut engine = EpochEngine::from_genesis(make_epoch(50), make_scheme()).unwrap();
        assert_eq!(engine.record_block(0), 50);
        assert_eq!(engine.epoch().status, EpochStatus::Running);
        assert_eq!(engine.record_block(100), 0);
        assert_eq!(engine.epoch().blocks_produced, 1);
        assert!(engine.should_roll_over(99));
        assert!(!engine.should_roll_over(98));
        assert!(engine.should_roll_over(140));
    }

    #[test]
    fn test_roll_over_applies_reveals() {
        let mut engine = EpochEngine::from_genesis(make_epoch(50), make_scheme()).unwrap();
        for height in 0..80 {
            engine.record_block(height);
        }
        let reveals = vec![make_reveal(1, 0), make_reveal(2, 300), make_reveal(3, 200)];
        let next = engine.roll_over(1_700_000_000, &reveals).unwrap().clone();

        assert_eq!(next.number, 1);
        assert_eq!(next.start_block, 100);
        assert_eq!(next.end_block, 199);
        assert_eq!(next.carried_over, 1_000);
        let addresses: Vec<_> = next.validators.iter().map(|v| v.address[0]).collect();
        assert_eq!(addresses, vec![2, 3]);
        assert_eq!(next.validators[0].amount, 300);

        let ended = engine.take_ended().unwrap();
        assert_eq!(ended.status, EpochStatus::Ended);
        assert_eq!(ended.end_time, 1_700_000_000);
        assert!(engine.take_ended().is_none());
    }

    #[test]
    fn test_roll_over_keeps_set_when_everyone_leaves() {
        let mut engine = EpochEngine::from_genesis(make_epoch(50), make_scheme()).unwrap();
        let reveals = vec![make_reveal(1, 0), make_reveal(2, 0)];
        let next = engine.roll_over(1, &reveals).unwrap();
        assert_eq!(next.validators.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_rollovers_respect_total_reward(produced in proptest::collection::vec(0u64..120, 1..40)) {
            let mut engine = EpochEngine::from_genesis(make_epoch(50), make_scheme()).unwrap();
            for blocks in produced {
                let start = engine.epoch().start_block;
                for height in start..start + blocks {
                    engine.record_block(height);
                }
                let epoch = engine.epoch().clone();
                prop_assert!(epoch.reward_pool() <= engine.scheme().allocated);
                engine.roll_over(0, &[]).unwrap();
                prop_assert!(engine.scheme().allocated <= engine.scheme().total_reward);
            }
        }
    }
}
