//! Admission, voting, anchoring and replay rules.
//!
//! Every rule reads through a [`ChainInfoStore`] view, so the same code
//! checks committed state during validation, committed state plus queued
//! ops during apply, and the staged block during commit.

use braid_crypto::{validate_public, verify};
use braid_storage::{ChainInfoStore, KvStore, LedgerDirection};
use braid_types::chain::{
    total_stake, ChildChainRecord, ChildChainStatus, ChildChainValidator, CrossChainTxState,
};
use braid_types::constants::{MAX_CHAIN_ID_LEN, MAX_SALT_LEN};
use braid_types::epoch::{vote_hash, Epoch, RevealedVote, VoteCommitment, VotingWindow};
use braid_types::identity::PublicIdentity;
use braid_types::primitives::*;
use braid_types::proof::{
    AnchorCheckpoint, ChildChainProofData, CommitSignature, SignedValidatorSetChange,
};
use braid_types::tx::{CreateChildChainParams, JoinChildChainParams, RevealVoteParams};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::pending::PendingOp;

// ─── Child Chain Admission ──────────────────────────────────────────────────

pub(crate) fn check_create<S: KvStore>(
    view: &ChainInfoStore<S>,
    config: &BridgeConfig,
    params: &CreateChildChainParams,
    height: Height,
) -> Result<(), BridgeError> {
    let id = &params.chain_id;
    if id.is_empty() || id.len() > MAX_CHAIN_ID_LEN {
        return Err(BridgeError::admission(format!(
            "chain id must be 1..={} bytes",
            MAX_CHAIN_ID_LEN
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(BridgeError::admission(format!(
            "chain id {} has characters outside [A-Za-z0-9_-]",
            id
        )));
    }
    if *id == config.main_chain_id || view.child_chain_exists(id)? {
        return Err(BridgeError::admission(format!("chain id {} already in use", id)));
    }
    if params.min_validators == 0 || params.min_validators > config.max_min_validators {
        return Err(BridgeError::admission(format!(
            "min_validators {} outside 1..={}",
            params.min_validators, config.max_min_validators
        )));
    }
    if params.min_deposit_amount == 0 {
        return Err(BridgeError::admission("min_deposit_amount must be positive"));
    }
    if params.start_block >= params.end_block {
        return Err(BridgeError::admission(format!(
            "start_block {} must be below end_block {}",
            params.start_block, params.end_block
        )));
    }
    let window = params.end_block - params.start_block;
    if window < config.min_join_window || window > config.max_join_window {
        return Err(BridgeError::admission(format!(
            "join window of {} blocks outside {}..={}",
            window, config.min_join_window, config.max_join_window
        )));
    }
    if params.end_block <= height {
        return Err(BridgeError::admission(format!(
            "join window already closed at height {}",
            height
        )));
    }
    Ok(())
}

/// Checks a join and returns the decoded validator key.
pub(crate) fn check_join<S: KvStore>(
    view: &ChainInfoStore<S>,
    from: &Address,
    params: &JoinChildChainParams,
    height: Height,
) -> Result<PublicIdentity, BridgeError> {
    let record =
        view.get_child_chain(&params.chain_id)?
            .ok_or_else(|| BridgeError::UnknownChain {
                chain_id: params.chain_id.clone(),
            })?;
    if record.status != ChildChainStatus::Pending {
        return Err(BridgeError::admission(format!(
            "chain {} is {}, not pending",
            record.chain_id, record.status
        )));
    }
    if !record.join_window_open(height) {
        return Err(BridgeError::admission(format!(
            "height {} outside join window [{}, {})",
            height, record.start_block, record.end_block
        )));
    }
    if record.has_validator(from) {
        return Err(BridgeError::admission(format!(
            "{} already joined {}",
            hex_addr(from),
            record.chain_id
        )));
    }
    if params.deposit_amount < record.min_deposit_amount {
        return Err(BridgeError::admission(format!(
            "deposit {} below minimum {}",
            params.deposit_amount, record.min_deposit_amount
        )));
    }
    let pubkey = decode_validator_key(&params.pubkey)
        .map_err(|e| BridgeError::admission(format!("malformed validator key: {}", e)))?;
    if record.validators.iter().any(|v| v.pubkey == pubkey) {
        return Err(BridgeError::admission("validator key already registered"));
    }
    Ok(pubkey)
}

fn decode_validator_key(bytes: &[u8]) -> Result<PublicIdentity, BridgeError> {
    let pubkey = PublicIdentity::from_bytes(bytes)?;
    validate_public(&pubkey)?;
    Ok(pubkey)
}

// ─── Epoch Voting ───────────────────────────────────────────────────────────

/// The epoch's chain is the one this node runs, or a launched child chain.
fn ensure_known_chain<S: KvStore>(
    view: &ChainInfoStore<S>,
    local_chain_id: &str,
    chain_id: &str,
) -> Result<(), BridgeError> {
    if chain_id == local_chain_id {
        return Ok(());
    }
    match view.get_child_chain(chain_id)? {
        Some(record) if record.status == ChildChainStatus::Launched => Ok(()),
        _ => Err(BridgeError::UnknownChain {
            chain_id: chain_id.to_string(),
        }),
    }
}

pub(crate) fn check_vote<S: KvStore>(
    view: &ChainInfoStore<S>,
    local_chain_id: &str,
    window: &VotingWindow,
    ep: &Epoch,
    from: &Address,
    height: Height,
) -> Result<(), BridgeError> {
    ensure_known_chain(view, local_chain_id, &ep.chain_id)?;
    let commit = window.commit_range(ep);
    if !commit.contains(&height) {
        return Err(BridgeError::vote(format!(
            "height {} outside commit phase {}..{} of epoch {}",
            height, commit.start, commit.end, ep.number
        )));
    }
    if !ep.is_validator(from) {
        return Err(BridgeError::vote(format!(
            "{} is not in the validator set of epoch {}",
            hex_addr(from),
            ep.number
        )));
    }
    if view.get_vote(&ep.chain_id, ep.number, from)?.is_some() {
        return Err(BridgeError::vote(format!(
            "duplicate commitment from {} in epoch {}",
            hex_addr(from),
            ep.number
        )));
    }
    Ok(())
}

/// Checks a reveal and returns the decoded key and the recomputed hash.
pub(crate) fn check_reveal<S: KvStore>(
    view: &ChainInfoStore<S>,
    local_chain_id: &str,
    window: &VotingWindow,
    ep: &Epoch,
    from: &Address,
    params: &RevealVoteParams,
    height: Height,
) -> Result<(PublicIdentity, Hash), BridgeError> {
    ensure_known_chain(view, local_chain_id, &ep.chain_id)?;
    let reveal = window.reveal_range(ep);
    if !reveal.contains(&height) {
        return Err(BridgeError::vote(format!(
            "height {} outside reveal phase {}..{} of epoch {}",
            height, reveal.start, reveal.end, ep.number
        )));
    }
    if params.salt.len() > MAX_SALT_LEN {
        return Err(BridgeError::vote(format!(
            "salt longer than {} bytes",
            MAX_SALT_LEN
        )));
    }
    let pubkey = decode_validator_key(&params.pubkey)
        .map_err(|e| BridgeError::vote(format!("malformed validator key: {}", e)))?;
    let computed = vote_hash(&params.pubkey, params.deposit_amount, &params.salt);
    match_commitment(view, &ep.chain_id, ep.number, from, &computed)?;
    Ok((pubkey, computed))
}

fn match_commitment<S: KvStore>(
    view: &ChainInfoStore<S>,
    chain_id: &str,
    epoch: u64,
    from: &Address,
    computed: &Hash,
) -> Result<(), BridgeError> {
    if view.get_reveal(chain_id, epoch, from)?.is_some() {
        return Err(BridgeError::vote(format!(
            "{} already revealed in epoch {}",
            hex_addr(from),
            epoch
        )));
    }
    let commitment = view.get_vote(chain_id, epoch, from)?.ok_or_else(|| {
        BridgeError::vote(format!(
            "no commitment from {} in epoch {}",
            hex_addr(from),
            epoch
        ))
    })?;
    if commitment.vote_hash != *computed {
        return Err(BridgeError::vote("reveal does not match commitment"));
    }
    Ok(())
}

// ─── Proof Anchoring ────────────────────────────────────────────────────────

/// Outcome of a verified child chain proof.
#[derive(Debug)]
pub(crate) struct VerifiedProof {
    pub height: Height,
    pub header_hash: Hash,
    /// Validator epoch and set in force after the proof, if it changed.
    pub validators: Option<(u64, Vec<ChildChainValidator>)>,
}

/// Structural and cryptographic check of a child chain proof against the
/// last anchored checkpoint and the chain's current validator set.
pub(crate) fn verify_proof<S: KvStore>(
    view: &ChainInfoStore<S>,
    config: &BridgeConfig,
    proof: &ChildChainProofData,
) -> Result<VerifiedProof, BridgeError> {
    let invalid = |height: Height, reason: String| BridgeError::ProofInvalid {
        chain_id: proof.chain_id.clone(),
        height,
        reason,
    };
    let (Some(first), Some(last)) = (proof.first_height(), proof.last_height()) else {
        return Err(invalid(0, "proof has no headers".to_string()));
    };
    if proof.headers.len() > config.max_proof_headers {
        return Err(invalid(
            first,
            format!(
                "{} headers exceed limit {}",
                proof.headers.len(),
                config.max_proof_headers
            ),
        ));
    }
    if proof.commits.len() != proof.headers.len() {
        return Err(invalid(
            first,
            format!(
                "{} commit sets for {} headers",
                proof.commits.len(),
                proof.headers.len()
            ),
        ));
    }
    let mut previous = first;
    for signed in &proof.set_changes {
        let effective = signed.change.effective_height;
        if effective < previous || effective > last.saturating_add(1) {
            return Err(invalid(
                effective,
                format!("validator set change outside heights {}..={}", previous, last + 1),
            ));
        }
        previous = effective;
    }

    let record = view
        .get_child_chain(&proof.chain_id)?
        .filter(|r| r.status == ChildChainStatus::Launched)
        .ok_or_else(|| invalid(first, "chain is not launched".to_string()))?;

    let mut expected = view
        .get_checkpoint(&proof.chain_id)?
        .map(|cp| (cp.height + 1, cp.header_hash));
    let mut epoch = record.validator_epoch;
    let mut validators = record.validators;
    let mut changes = proof.set_changes.iter().peekable();
    let mut last_hash = ZERO_HASH;

    for (header, commits) in proof.headers.iter().zip(&proof.commits) {
        if header.chain_id != proof.chain_id {
            return Err(invalid(header.height, "header for another chain".to_string()));
        }
        if let Some((height, prev_hash)) = expected {
            if header.height != height {
                return Err(invalid(
                    header.height,
                    format!("expected height {}", height),
                ));
            }
            if header.prev_hash != prev_hash {
                return Err(invalid(header.height, "prev_hash does not link".to_string()));
            }
        }
        while let Some(signed) = changes.next_if(|c| c.change.effective_height <= header.height) {
            validators = apply_set_change(&proof.chain_id, epoch, &validators, signed)
                .map_err(|reason| invalid(header.height, reason))?;
            epoch += 1;
        }
        let hash = header.compute_hash();
        let signed = signed_stake(&validators, &hash, commits)
            .map_err(|reason| invalid(header.height, reason))?;
        let total = total_stake(&validators);
        if !above_two_thirds(signed, total) {
            return Err(invalid(
                header.height,
                format!("signed stake {} of {} is not above 2/3", signed, total),
            ));
        }
        expected = Some((header.height + 1, hash));
        last_hash = hash;
    }
    // Changes taking effect right after the last header.
    for signed in changes {
        validators = apply_set_change(&proof.chain_id, epoch, &validators, signed)
            .map_err(|reason| invalid(last + 1, reason))?;
        epoch += 1;
    }

    Ok(VerifiedProof {
        height: last,
        header_hash: last_hash,
        validators: (epoch != record.validator_epoch).then_some((epoch, validators)),
    })
}

/// Check a validator set change against the set it replaces and return
/// the new set.
fn apply_set_change(
    chain_id: &str,
    epoch: u64,
    current: &[ChildChainValidator],
    signed: &SignedValidatorSetChange,
) -> Result<Vec<ChildChainValidator>, String> {
    let change = &signed.change;
    if change.chain_id != chain_id {
        return Err("validator set change for another chain".to_string());
    }
    if change.epoch != epoch + 1 {
        return Err(format!(
            "validator set change for epoch {}, expected {}",
            change.epoch,
            epoch + 1
        ));
    }
    if change.validators.is_empty() {
        return Err("validator set change leaves no validators".to_string());
    }
    let mut seen: Vec<&Address> = Vec::with_capacity(change.validators.len());
    for validator in &change.validators {
        if seen.contains(&&validator.address) {
            return Err(format!("duplicate validator {}", hex_addr(&validator.address)));
        }
        if validator.deposit_amount == 0 {
            return Err(format!("validator {} has no stake", hex_addr(&validator.address)));
        }
        validate_public(&validator.pubkey)
            .map_err(|e| format!("bad key for {}: {}", hex_addr(&validator.address), e))?;
        seen.push(&validator.address);
    }

    let signed_by = signed_stake(current, &change.compute_hash(), &signed.signatures)?;
    let total = total_stake(current);
    if !above_two_thirds(signed_by, total) {
        return Err(format!(
            "validator set change signed by {} of {}, not above 2/3",
            signed_by, total
        ));
    }
    Ok(change.validators.clone())
}

/// Strictly more than two thirds.
fn above_two_thirds(signed: Amount, total: Amount) -> bool {
    signed.saturating_mul(3) > total.saturating_mul(2)
}

fn signed_stake(
    validators: &[ChildChainValidator],
    hash: &Hash,
    commits: &[CommitSignature],
) -> Result<Amount, String> {
    let mut seen: Vec<Address> = Vec::with_capacity(commits.len());
    let mut stake: Amount = 0;
    for commit in commits {
        if seen.contains(&commit.validator) {
            return Err(format!("duplicate signer {}", hex_addr(&commit.validator)));
        }
        let validator = validators
            .iter()
            .find(|v| v.address == commit.validator)
            .ok_or_else(|| format!("signer {} not in validator set", hex_addr(&commit.validator)))?;
        verify(&validator.pubkey, hash, &commit.signature)
            .map_err(|e| format!("bad signature from {}: {}", hex_addr(&commit.validator), e))?;
        seen.push(commit.validator);
        stake = stake.saturating_add(validator.deposit_amount);
    }
    Ok(stake)
}

// ─── Replay Ledger ──────────────────────────────────────────────────────────

pub(crate) fn check_unused<S: KvStore>(
    view: &ChainInfoStore<S>,
    direction: LedgerDirection,
    from: &Address,
    chain_id: &str,
    tx_hash: &TxHash,
) -> Result<(), BridgeError> {
    match view.ledger_state(direction, from, chain_id, tx_hash)? {
        CrossChainTxState::Used => Err(BridgeError::ReplayDetected {
            chain_id: chain_id.to_string(),
            tx_hash: hex::encode(tx_hash),
        }),
        CrossChainTxState::Unused | CrossChainTxState::Unknown => Ok(()),
    }
}

// ─── Pending Ops ────────────────────────────────────────────────────────────

/// Re-check an op against `view`, which must already contain every op
/// queued before it.
pub(crate) fn check_op<S: KvStore>(
    view: &ChainInfoStore<S>,
    config: &BridgeConfig,
    op: &PendingOp,
) -> Result<(), BridgeError> {
    match op {
        PendingOp::CreateChildChain { params, height, .. } => {
            check_create(view, config, params, *height)
        }
        PendingOp::JoinChildChain {
            from,
            params,
            height,
        } => check_join(view, from, params, *height).map(|_| ()),
        PendingOp::VoteNextEpoch(vote) => {
            if view.get_vote(&vote.chain_id, vote.epoch, &vote.voter)?.is_some() {
                return Err(BridgeError::vote(format!(
                    "duplicate commitment from {} in epoch {}",
                    hex_addr(&vote.voter),
                    vote.epoch
                )));
            }
            Ok(())
        }
        PendingOp::RevealVote { reveal, vote_hash } => match_commitment(
            view,
            &reveal.chain_id,
            reveal.epoch,
            &reveal.voter,
            vote_hash,
        ),
        PendingOp::SaveProof { proof, .. } => verify_proof(view, config, proof).map(|_| ()),
        PendingOp::MarkLedger {
            direction,
            from,
            chain_id,
            tx_hash,
            used,
        } => {
            if *used {
                check_unused(view, *direction, from, chain_id, tx_hash)
            } else {
                Ok(())
            }
        }
    }
}

/// Write an op's effect into `view` without checking it.
pub(crate) fn write_op<S: KvStore>(
    view: &ChainInfoStore<S>,
    config: &BridgeConfig,
    op: &PendingOp,
) -> Result<(), BridgeError> {
    match op {
        PendingOp::CreateChildChain { owner, params, .. } => {
            let record = ChildChainRecord::new(
                params.chain_id.clone(),
                *owner,
                params.min_validators,
                params.min_deposit_amount,
                params.start_block,
                params.end_block,
            );
            view.put_child_chain(&record)?;
        }
        PendingOp::JoinChildChain { from, params, .. } => {
            let mut record = view.get_child_chain(&params.chain_id)?.ok_or_else(|| {
                BridgeError::UnknownChain {
                    chain_id: params.chain_id.clone(),
                }
            })?;
            record.validators.push(ChildChainValidator {
                address: *from,
                pubkey: PublicIdentity::from_bytes(&params.pubkey)?,
                deposit_amount: params.deposit_amount,
            });
            view.put_child_chain(&record)?;
        }
        PendingOp::VoteNextEpoch(vote) => view.put_vote(vote)?,
        PendingOp::RevealVote { reveal, .. } => {
            view.put_reveal(reveal)?;
            view.delete_vote(&reveal.chain_id, reveal.epoch, &reveal.voter)?;
        }
        PendingOp::SaveProof { proof, anchored_at } => {
            let verified = verify_proof(view, config, proof)?;
            if let Some((epoch, validators)) = verified.validators {
                let mut record = view.get_child_chain(&proof.chain_id)?.ok_or_else(|| {
                    BridgeError::UnknownChain {
                        chain_id: proof.chain_id.clone(),
                    }
                })?;
                record.validators = validators;
                record.validator_epoch = epoch;
                view.put_child_chain(&record)?;
            }
            let checkpoint = AnchorCheckpoint {
                chain_id: proof.chain_id.clone(),
                height: verified.height,
                header_hash: verified.header_hash,
                anchored_at: *anchored_at,
            };
            view.save_proof(proof, &checkpoint)?;
        }
        PendingOp::MarkLedger {
            direction,
            from,
            chain_id,
            tx_hash,
            used,
        } => view.mark_ledger(*direction, from, chain_id, tx_hash, *used)?,
    }
    Ok(())
}

pub(crate) fn make_vote(ep: &Epoch, from: &Address, hash: Hash, tx_hash: TxHash) -> VoteCommitment {
    VoteCommitment {
        chain_id: ep.chain_id.clone(),
        voter: *from,
        epoch: ep.number,
        vote_hash: hash,
        tx_hash,
    }
}

pub(crate) fn make_reveal(
    ep: &Epoch,
    from: &Address,
    pubkey: PublicIdentity,
    deposit_amount: Amount,
    tx_hash: TxHash,
) -> RevealedVote {
    RevealedVote {
        chain_id: ep.chain_id.clone(),
        voter: *from,
        epoch: ep.number,
        pubkey,
        deposit_amount,
        tx_hash,
    }
}

pub(crate) fn hex_addr(address: &Address) -> String {
    hex::encode(address)
}
