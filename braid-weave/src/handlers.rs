//! Validate and apply handlers for the cross-chain transaction kinds.
//!
//! Validate handlers read committed state through the helper. Apply
//! handlers queue bridge mutations into the block's [`PendingOps`] and
//! change world state directly; both are discarded if the block fails.

use braid_bridge::PendingOps;
use braid_types::block::IndexedTx;
use braid_types::chain::{ChildChainStatus, CrossChainTxState};
use braid_types::primitives::*;
use braid_types::tx::{FunctionKind, TxCall};

use crate::error::WeaveError;
use crate::registry::{CallbackRegistry, TxContext};
use crate::state::WorldState;

/// Register validate and apply handlers for every cross-chain kind.
pub fn register_cross_chain_handlers(registry: &mut CallbackRegistry) -> Result<(), WeaveError> {
    registry.register_validate(FunctionKind::CreateChildChain, Box::new(validate_create))?;
    registry.register_apply(FunctionKind::CreateChildChain, Box::new(apply_create))?;
    registry.register_validate(FunctionKind::JoinChildChain, Box::new(validate_join))?;
    registry.register_apply(FunctionKind::JoinChildChain, Box::new(apply_join))?;
    registry.register_validate(FunctionKind::VoteNextEpoch, Box::new(validate_vote))?;
    registry.register_apply(FunctionKind::VoteNextEpoch, Box::new(apply_vote))?;
    registry.register_validate(FunctionKind::RevealVote, Box::new(validate_reveal))?;
    registry.register_apply(FunctionKind::RevealVote, Box::new(apply_reveal))?;
    registry.register_validate(FunctionKind::AnchorChildChainProof, Box::new(validate_anchor))?;
    registry.register_apply(FunctionKind::AnchorChildChainProof, Box::new(apply_anchor))?;
    registry.register_validate(FunctionKind::DepositInMainChain, Box::new(validate_main_deposit))?;
    registry.register_apply(FunctionKind::DepositInMainChain, Box::new(apply_main_deposit))?;
    registry.register_validate(FunctionKind::DepositInChildChain, Box::new(validate_child_deposit))?;
    registry.register_apply(FunctionKind::DepositInChildChain, Box::new(apply_child_deposit))?;
    registry.register_validate(FunctionKind::WithdrawFromChildChain, Box::new(validate_child_withdraw))?;
    registry.register_apply(FunctionKind::WithdrawFromChildChain, Box::new(apply_child_withdraw))?;
    registry.register_validate(FunctionKind::WithdrawFromMainChain, Box::new(validate_main_withdraw))?;
    registry.register_apply(FunctionKind::WithdrawFromMainChain, Box::new(apply_main_withdraw))?;
    Ok(())
}

fn wrong_call(ctx: &TxContext<'_>, expected: FunctionKind) -> WeaveError {
    WeaveError::invalid_tx(format!(
        "{} handler given a {} call",
        expected,
        ctx.call.kind()
    ))
}

fn require_child_chain(ctx: &TxContext<'_>, kind: FunctionKind) -> Result<(), WeaveError> {
    if ctx.helper.is_main_chain() {
        return Err(WeaveError::invalid_tx(format!(
            "{} is only accepted on child chains",
            kind
        )));
    }
    Ok(())
}

fn require_main_chain(ctx: &TxContext<'_>, kind: FunctionKind) -> Result<(), WeaveError> {
    if !ctx.helper.is_main_chain() {
        return Err(WeaveError::invalid_tx(format!(
            "{} is only accepted on {}",
            kind,
            ctx.helper.main_chain_id()
        )));
    }
    Ok(())
}

fn invalid_reference(reason: String) -> WeaveError {
    WeaveError::from(braid_bridge::BridgeError::InvalidReference { reason })
}

// ─── Child Chain Lifecycle ──────────────────────────────────────────────────

fn validate_create(ctx: &TxContext<'_>, _state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::CreateChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::CreateChildChain));
    };
    ctx.helper
        .can_create_child_chain(&ctx.tx.from, params, ctx.height)?;
    Ok(())
}

fn apply_create(
    ctx: &TxContext<'_>,
    _state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::CreateChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::CreateChildChain));
    };
    ctx.helper
        .create_child_chain(ops, &ctx.tx.from, params, ctx.height)?;
    Ok(())
}

fn validate_join(ctx: &TxContext<'_>, state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::JoinChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::JoinChildChain));
    };
    ctx.helper
        .validate_join_child_chain(&ctx.tx.from, params, ctx.height)?;
    state.require_balance(&ctx.tx.from, params.deposit_amount)
}

fn apply_join(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::JoinChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::JoinChildChain));
    };
    ctx.helper
        .join_child_chain(ops, &ctx.tx.from, params, ctx.height)?;
    state.lock_deposit(&params.chain_id, &ctx.tx.from, params.deposit_amount)
}

// ─── Epoch Voting ───────────────────────────────────────────────────────────

fn validate_vote(ctx: &TxContext<'_>, _state: &WorldState) -> Result<(), WeaveError> {
    if !matches!(ctx.call, TxCall::VoteNextEpoch(_)) {
        return Err(wrong_call(ctx, FunctionKind::VoteNextEpoch));
    }
    ctx.helper
        .validate_vote_next_epoch(ctx.epoch, &ctx.tx.from, ctx.height)?;
    Ok(())
}

fn apply_vote(
    ctx: &TxContext<'_>,
    _state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::VoteNextEpoch(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::VoteNextEpoch));
    };
    ctx.helper.vote_next_epoch(
        ops,
        ctx.epoch,
        &ctx.tx.from,
        params.vote_hash,
        ctx.tx_hash,
        ctx.height,
    )?;
    Ok(())
}

fn validate_reveal(ctx: &TxContext<'_>, state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::RevealVote(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::RevealVote));
    };
    ctx.helper
        .validate_reveal_vote(ctx.epoch, &ctx.tx.from, params, ctx.height)?;
    state.require_balance(&ctx.tx.from, params.deposit_amount)
}

/// Records the reveal and bonds the revealed deposit until the rollover
/// settles it against the next validator set.
fn apply_reveal(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::RevealVote(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::RevealVote));
    };
    ctx.helper.reveal_vote(
        ops,
        ctx.epoch,
        &ctx.tx.from,
        params,
        ctx.tx_hash,
        ctx.height,
    )?;
    state.bond(&ctx.tx.from, params.deposit_amount)
}

// ─── Proof Anchoring ────────────────────────────────────────────────────────

fn validate_anchor(ctx: &TxContext<'_>, _state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::AnchorChildChainProof(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::AnchorChildChainProof));
    };
    require_main_chain(ctx, FunctionKind::AnchorChildChainProof)?;
    ctx.helper.verify_child_chain_proof_data(&params.proof)?;
    Ok(())
}

fn apply_anchor(
    ctx: &TxContext<'_>,
    _state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::AnchorChildChainProof(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::AnchorChildChainProof));
    };
    ctx.helper
        .save_child_chain_proof_data_to_main_chain(ops, &params.proof, ctx.height)?;
    Ok(())
}

// ─── Deposits: main chain → child chain ─────────────────────────────────────

fn validate_main_deposit(ctx: &TxContext<'_>, state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::DepositInMainChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::DepositInMainChain));
    };
    require_main_chain(ctx, FunctionKind::DepositInMainChain)?;
    if params.amount == 0 {
        return Err(WeaveError::invalid_tx("deposit amount must be positive"));
    }
    match ctx.helper.child_chain(&params.chain_id)? {
        Some(record) if record.status == ChildChainStatus::Launched => {}
        _ => {
            return Err(invalid_reference(format!(
                "{} is not a launched child chain",
                params.chain_id
            )))
        }
    }
    state.require_balance(&ctx.tx.from, params.amount)
}

fn apply_main_deposit(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    _ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::DepositInMainChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::DepositInMainChain));
    };
    state.escrow_in(&params.chain_id, &ctx.tx.from, params.amount)
}

/// The main chain deposit a child chain deposit claims, and its amount.
fn referenced_main_deposit(ctx: &TxContext<'_>, main_tx_hash: &TxHash) -> Result<Amount, WeaveError> {
    let indexed: IndexedTx = ctx
        .helper
        .get_tx_from_main_chain(main_tx_hash)?
        .ok_or_else(|| {
            invalid_reference(format!(
                "main chain tx {} not found",
                hex::encode(main_tx_hash)
            ))
        })?;
    let TxCall::DepositInMainChain(deposit) = indexed.tx.call()? else {
        return Err(invalid_reference(
            "referenced main chain tx is not a deposit".to_string(),
        ));
    };
    if deposit.chain_id != ctx.helper.chain_id() {
        return Err(invalid_reference(format!(
            "deposit targets {}, not {}",
            deposit.chain_id,
            ctx.helper.chain_id()
        )));
    }
    if indexed.tx.from != ctx.tx.from {
        return Err(invalid_reference(
            "deposit belongs to another account".to_string(),
        ));
    }
    Ok(deposit.amount)
}

fn validate_child_deposit(ctx: &TxContext<'_>, _state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::DepositInChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::DepositInChildChain));
    };
    require_child_chain(ctx, FunctionKind::DepositInChildChain)?;
    referenced_main_deposit(ctx, &params.main_tx_hash)?;
    let ledger = ctx.helper.validate_to_child_chain_tx(
        &ctx.tx.from,
        ctx.helper.chain_id(),
        &params.main_tx_hash,
    )?;
    if ledger == CrossChainTxState::Used {
        return Err(braid_bridge::BridgeError::ReplayDetected {
            chain_id: ctx.helper.main_chain_id().to_string(),
            tx_hash: hex::encode(params.main_tx_hash),
        }
        .into());
    }
    Ok(())
}

fn apply_child_deposit(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::DepositInChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::DepositInChildChain));
    };
    require_child_chain(ctx, FunctionKind::DepositInChildChain)?;
    let amount = referenced_main_deposit(ctx, &params.main_tx_hash)?;
    ctx.helper.mark_to_child_chain_tx(
        ops,
        &ctx.tx.from,
        ctx.helper.chain_id(),
        &params.main_tx_hash,
        true,
    )?;
    state.credit(&ctx.tx.from, amount);
    Ok(())
}

// ─── Withdrawals: child chain → main chain ──────────────────────────────────

fn validate_child_withdraw(ctx: &TxContext<'_>, state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::WithdrawFromChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::WithdrawFromChildChain));
    };
    require_child_chain(ctx, FunctionKind::WithdrawFromChildChain)?;
    if params.amount == 0 {
        return Err(WeaveError::invalid_tx("withdrawal amount must be positive"));
    }
    state.require_balance(&ctx.tx.from, params.amount)
}

fn apply_child_withdraw(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    _ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::WithdrawFromChildChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::WithdrawFromChildChain));
    };
    // Burned here, released from escrow on the main chain.
    state.debit(&ctx.tx.from, params.amount)
}

/// The anchored child chain withdrawal a main chain withdrawal claims, and
/// its amount.
fn referenced_child_withdrawal(
    ctx: &TxContext<'_>,
    chain_id: &str,
    child_tx_hash: &TxHash,
) -> Result<Amount, WeaveError> {
    let indexed = ctx
        .helper
        .get_tx_from_child_chain(chain_id, child_tx_hash)?
        .ok_or_else(|| {
            invalid_reference(format!(
                "tx {} not found on {}",
                hex::encode(child_tx_hash),
                chain_id
            ))
        })?;
    let TxCall::WithdrawFromChildChain(withdrawal) = indexed.tx.call()? else {
        return Err(invalid_reference(
            "referenced child chain tx is not a withdrawal".to_string(),
        ));
    };
    if indexed.tx.from != ctx.tx.from {
        return Err(invalid_reference(
            "withdrawal belongs to another account".to_string(),
        ));
    }
    match ctx.helper.checkpoint(chain_id)? {
        Some(cp) if cp.height >= indexed.height => {}
        Some(cp) => {
            return Err(invalid_reference(format!(
                "withdrawal at height {} is above the anchored height {} of {}",
                indexed.height, cp.height, chain_id
            )))
        }
        None => {
            return Err(invalid_reference(format!(
                "no proof anchored for {}",
                chain_id
            )))
        }
    }
    Ok(withdrawal.amount)
}

fn validate_main_withdraw(ctx: &TxContext<'_>, state: &WorldState) -> Result<(), WeaveError> {
    let TxCall::WithdrawFromMainChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::WithdrawFromMainChain));
    };
    require_main_chain(ctx, FunctionKind::WithdrawFromMainChain)?;
    let amount = referenced_child_withdrawal(ctx, &params.chain_id, &params.child_tx_hash)?;
    let ledger = ctx.helper.validate_from_child_chain_tx(
        &ctx.tx.from,
        &params.chain_id,
        &params.child_tx_hash,
    )?;
    if ledger == CrossChainTxState::Used {
        return Err(braid_bridge::BridgeError::ReplayDetected {
            chain_id: params.chain_id.clone(),
            tx_hash: hex::encode(params.child_tx_hash),
        }
        .into());
    }
    if state.escrow(&params.chain_id) < amount {
        return Err(WeaveError::invalid_tx(format!(
            "escrow of {} cannot cover {}",
            params.chain_id, amount
        )));
    }
    Ok(())
}

fn apply_main_withdraw(
    ctx: &TxContext<'_>,
    state: &mut WorldState,
    ops: &mut PendingOps,
) -> Result<(), WeaveError> {
    let TxCall::WithdrawFromMainChain(params) = ctx.call else {
        return Err(wrong_call(ctx, FunctionKind::WithdrawFromMainChain));
    };
    require_main_chain(ctx, FunctionKind::WithdrawFromMainChain)?;
    let amount = referenced_child_withdrawal(ctx, &params.chain_id, &params.child_tx_hash)?;
    ctx.helper.mark_from_child_chain_tx(
        ops,
        &ctx.tx.from,
        &params.chain_id,
        &params.child_tx_hash,
        true,
    )?;
    state.escrow_out(&params.chain_id, &ctx.tx.from, amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_cross_chain_kind_registered() {
        let mut registry = CallbackRegistry::new();
        register_cross_chain_handlers(&mut registry).unwrap();
        for kind in FunctionKind::ALL {
            let special = kind != FunctionKind::Transfer;
            assert_eq!(registry.lookup_validate(kind).is_some(), special, "{}", kind);
            assert_eq!(registry.lookup_apply(kind).is_some(), special, "{}", kind);
        }
        assert!(matches!(
            register_cross_chain_handlers(&mut registry),
            Err(WeaveError::RegistrationConflict { .. })
        ));
    }
}
