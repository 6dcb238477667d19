//! Built-in post-commit hooks.
//!
//! Hooks run after a block's bridge ops and state are committed, in name
//! order. The state and epoch they mutate are persisted by the chain once
//! every hook has run.

use tracing::{debug, info, warn};

use braid_types::primitives::Amount;

use crate::error::WeaveError;
use crate::registry::{CallbackRegistry, HookContext};

pub const ACCRUE_REWARDS: &str = "accrue-rewards";
pub const EPOCH_ROLLOVER: &str = "epoch-rollover";
pub const LAUNCH_CHILD_CHAINS: &str = "launch-child-chains";

pub fn register_builtin_hooks(registry: &mut CallbackRegistry) -> Result<(), WeaveError> {
    registry.register_post_commit_hook(ACCRUE_REWARDS, Box::new(accrue_rewards))?;
    registry.register_post_commit_hook(EPOCH_ROLLOVER, Box::new(epoch_rollover))?;
    registry.register_post_commit_hook(LAUNCH_CHILD_CHAINS, Box::new(launch_child_chains))?;
    Ok(())
}

fn hook_error(name: &str, reason: impl ToString) -> WeaveError {
    WeaveError::Hook {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Credit the block reward to the proposer's pending rewards.
fn accrue_rewards(ctx: &mut HookContext<'_>) -> Result<(), WeaveError> {
    let header = &ctx.block.header;
    let reward = ctx.epochs.record_block(header.height);
    ctx.state.accrue_reward(&header.proposer, reward);
    debug!(height = header.height, reward = reward, "block reward accrued");
    Ok(())
}

/// At the epoch's last block, install the next epoch built from the
/// revealed votes, settle validator bonds and pay out rewards.
///
/// Everything that can fail before the rollover is read first, so a failed
/// attempt leaves state untouched and the next block retries it.
fn epoch_rollover(ctx: &mut HookContext<'_>) -> Result<(), WeaveError> {
    let header = &ctx.block.header;
    if !ctx.epochs.should_roll_over(header.height) {
        return Ok(());
    }
    let chain_id = ctx.helper.chain_id().to_string();
    let number = ctx.epochs.epoch().number;
    let candidates = ctx
        .helper
        .epoch_candidates(&chain_id, number)
        .map_err(|e| hook_error(EPOCH_ROLLOVER, e))?;
    let next = ctx.epochs.roll_over(header.timestamp, &candidates)?.clone();

    let mut released: Amount = 0;
    for vote in &candidates {
        let keep = next.validator(&vote.voter).map(|v| v.amount).unwrap_or(0);
        released = released.saturating_add(ctx.state.settle_bond(&vote.voter, keep));
    }
    let paid = ctx.state.pay_pending_rewards();
    info!(
        epoch = number,
        paid = paid,
        released = released,
        candidates = candidates.len(),
        "epoch closed"
    );

    let unrevealed = ctx
        .helper
        .clear_epoch_votes(&chain_id, number)
        .map_err(|e| hook_error(EPOCH_ROLLOVER, e))?;
    if unrevealed > 0 {
        warn!(epoch = number, unrevealed = unrevealed, "vote commitments never revealed");
    }
    Ok(())
}

/// Launch or reject child chains whose join window closed, refunding the
/// deposits of rejected ones.
fn launch_child_chains(ctx: &mut HookContext<'_>) -> Result<(), WeaveError> {
    if !ctx.helper.is_main_chain() {
        return Ok(());
    }
    let height = ctx.block.header.height;
    let decision = ctx
        .helper
        .ready_for_launch_child_chain(height, &*ctx.state)
        .map_err(|e| hook_error(LAUNCH_CHILD_CHAINS, e))?;
    if decision.is_empty() {
        return Ok(());
    }
    let records = ctx
        .helper
        .process_post_pending_data(height, &decision)
        .map_err(|e| hook_error(LAUNCH_CHILD_CHAINS, e))?;

    for chain_id in &decision.rejected {
        let Some(record) = records.iter().find(|r| &r.chain_id == chain_id) else {
            continue;
        };
        let mut refunded = 0;
        for validator in &record.validators {
            refunded += ctx.state.release_deposit(chain_id, &validator.address);
        }
        info!(chain_id = %chain_id, refunded = refunded, "deposits refunded");
    }
    Ok(())
}
