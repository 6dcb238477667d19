//! Decaying block reward schedule.
//!
//! Each year's pool shrinks linearly by `descend_per_year` and is split
//! evenly across `epochs_per_year`. An epoch reserves
//! `reward_per_block × length` from the scheme up front and gives back what
//! it did not produce when it ends.

use braid_types::epoch::{Epoch, RewardScheme};
use braid_types::primitives::Amount;

use crate::error::WeaveError;

/// Reward pool of the year containing `epoch_number`.
pub fn year_pool(scheme: &RewardScheme, epoch_number: u64) -> Amount {
    let year = epoch_number / scheme.epochs_per_year.max(1);
    scheme
        .reward_first_year
        .saturating_sub((year as Amount).saturating_mul(scheme.descend_per_year))
        .saturating_add(scheme.added_per_year)
}

/// Reserve the reward for an epoch and return its `reward_per_block`.
///
/// The pool is this epoch's share of the year pool plus `carried_over`,
/// capped by what the scheme has left.
pub fn plan_epoch(
    scheme: &mut RewardScheme,
    epoch_number: u64,
    length: u64,
    carried_over: Amount,
) -> Result<Amount, WeaveError> {
    if length == 0 {
        return Err(WeaveError::Reward {
            reason: "epoch length must be positive".to_string(),
        });
    }
    let share = year_pool(scheme, epoch_number) / scheme.epochs_per_year.max(1) as Amount;
    let pool = share.saturating_add(carried_over).min(scheme.remaining());
    let reward_per_block = pool / length as Amount;
    reserve(scheme, reward_per_block.saturating_mul(length as Amount))?;
    Ok(reward_per_block)
}

/// Reserve a genesis epoch's reward as given, shrinking `reward_per_block`
/// if the scheme cannot cover it.
pub fn adopt_epoch(scheme: &mut RewardScheme, epoch: &mut Epoch) -> Result<(), WeaveError> {
    let length = epoch.length() as Amount;
    if epoch.reward_pool() > scheme.remaining() {
        epoch.reward_per_block = scheme.remaining() / length;
    }
    reserve(scheme, epoch.reward_per_block.saturating_mul(length))
}

fn reserve(scheme: &mut RewardScheme, amount: Amount) -> Result<(), WeaveError> {
    if amount > scheme.remaining() {
        return Err(WeaveError::Reward {
            reason: format!("cannot reserve {}, only {} left", amount, scheme.remaining()),
        });
    }
    scheme.allocated += amount;
    Ok(())
}

/// Reward an ended epoch reserved but did not produce:
/// `reward_per_block × (length − min(blocks_produced, length))`.
pub fn unspent(epoch: &Epoch) -> Amount {
    let length = epoch.length();
    let missed = length - epoch.blocks_produced.min(length);
    epoch.reward_per_block.saturating_mul(missed as Amount)
}

/// Give an ended epoch's unspent reward back to the scheme. Returns the
/// amount, which the next epoch carries over.
pub fn release_unspent(scheme: &mut RewardScheme, epoch: &Epoch) -> Amount {
    let amount = unspent(epoch).min(scheme.allocated);
    scheme.allocated -= amount;
    amount
}
