use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use braid_bridge::DepositView;
use braid_types::primitives::*;

use crate::error::WeaveError;

/// Account state of one chain.
///
/// Ordered maps keep the borsh snapshot deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WorldState {
    balances: BTreeMap<Address, Amount>,
    nonces: BTreeMap<Address, u64>,
    /// Child chain validator deposits, keyed by (chain id, validator).
    deposits: BTreeMap<(String, Address), Amount>,
    /// Value moved into each child chain and not yet withdrawn.
    escrow: BTreeMap<String, Amount>,
    /// Block rewards accrued in the running epoch, paid out at rollover.
    pending_rewards: BTreeMap<Address, Amount>,
    /// Stake bonded by revealed epoch votes.
    bonds: BTreeMap<Address, Amount>,
}

fn insufficient(address: &Address, needed: Amount, available: Amount) -> WeaveError {
    WeaveError::InsufficientBalance {
        address: hex::encode(address),
        needed,
        available,
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, address: &Address, amount: Amount) {
        if amount == 0 {
            return;
        }
        let entry = self.balances.entry(*address).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn debit(&mut self, address: &Address, amount: Amount) -> Result<(), WeaveError> {
        let available = self.balance(address);
        if available < amount {
            return Err(insufficient(address, amount, available));
        }
        if available == amount {
            self.balances.remove(address);
        } else {
            self.balances.insert(*address, available - amount);
        }
        Ok(())
    }

    pub fn require_balance(&self, address: &Address, amount: Amount) -> Result<(), WeaveError> {
        let available = self.balance(address);
        if available < amount {
            return Err(insufficient(address, amount, available));
        }
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), WeaveError> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        Ok(())
    }

    // ─── Nonces ──────────────────────────────────────────────────────────────

    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub fn check_nonce(&self, address: &Address, nonce: u64) -> Result<(), WeaveError> {
        let expected = self.nonce(address);
        if nonce != expected {
            return Err(WeaveError::BadNonce {
                address: hex::encode(address),
                expected,
                got: nonce,
            });
        }
        Ok(())
    }

    pub fn bump_nonce(&mut self, address: &Address) {
        let entry = self.nonces.entry(*address).or_insert(0);
        *entry += 1;
    }

    // ─── Child Chain Deposits ────────────────────────────────────────────────

    /// Move `amount` from the balance into the deposit for `chain_id`.
    pub fn lock_deposit(
        &mut self,
        chain_id: &str,
        address: &Address,
        amount: Amount,
    ) -> Result<(), WeaveError> {
        self.debit(address, amount)?;
        let entry = self
            .deposits
            .entry((chain_id.to_string(), *address))
            .or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    /// Return a locked deposit to the balance. Returns the refunded amount.
    pub fn release_deposit(&mut self, chain_id: &str, address: &Address) -> Amount {
        let amount = self
            .deposits
            .remove(&(chain_id.to_string(), *address))
            .unwrap_or(0);
        self.credit(address, amount);
        amount
    }

    // ─── Validator Bonds ─────────────────────────────────────────────────────

    /// Move `amount` from the balance into the validator bond of `address`.
    pub fn bond(&mut self, address: &Address, amount: Amount) -> Result<(), WeaveError> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(address, amount)?;
        let entry = self.bonds.entry(*address).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    pub fn bonded(&self, address: &Address) -> Amount {
        self.bonds.get(address).copied().unwrap_or(0)
    }

    /// Shrink the bond of `address` to at most `keep` and return the rest to
    /// its balance. Returns the released amount.
    pub fn settle_bond(&mut self, address: &Address, keep: Amount) -> Amount {
        let bonded = self.bonded(address);
        let released = bonded.saturating_sub(keep);
        if released == 0 {
            return 0;
        }
        if bonded == released {
            self.bonds.remove(address);
        } else {
            self.bonds.insert(*address, bonded - released);
        }
        self.credit(address, released);
        released
    }

    // ─── Cross-Chain Escrow ──────────────────────────────────────────────────

    pub fn escrow(&self, chain_id: &str) -> Amount {
        self.escrow.get(chain_id).copied().unwrap_or(0)
    }

    pub fn escrow_in(&mut self, chain_id: &str, from: &Address, amount: Amount) -> Result<(), WeaveError> {
        self.debit(from, amount)?;
        let entry = self.escrow.entry(chain_id.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    pub fn escrow_out(&mut self, chain_id: &str, to: &Address, amount: Amount) -> Result<(), WeaveError> {
        let held = self.escrow(chain_id);
        if held < amount {
            return Err(WeaveError::invalid_tx(format!(
                "escrow of {} holds {}, cannot release {}",
                chain_id, held, amount
            )));
        }
        self.escrow.insert(chain_id.to_string(), held - amount);
        self.credit(to, amount);
        Ok(())
    }

    // ─── Rewards ─────────────────────────────────────────────────────────────

    pub fn accrue_reward(&mut self, address: &Address, amount: Amount) {
        if amount == 0 {
            return;
        }
        let entry = self.pending_rewards.entry(*address).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn pending_reward(&self, address: &Address) -> Amount {
        self.pending_rewards.get(address).copied().unwrap_or(0)
    }

    /// Credit every pending reward to its balance. Returns the total paid.
    pub fn pay_pending_rewards(&mut self) -> Amount {
        let pending = std::mem::take(&mut self.pending_rewards);
        let mut total: Amount = 0;
        for (address, amount) in pending {
            self.credit(&address, amount);
            total = total.saturating_add(amount);
        }
        total
    }

    // ─── Snapshots ───────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Result<Vec<u8>, WeaveError> {
        borsh::to_vec(self).map_err(|e| WeaveError::Snapshot {
            reason: e.to_string(),
        })
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, WeaveError> {
        Self::try_from_slice(bytes).map_err(|e| WeaveError::Snapshot {
            reason: e.to_string(),
        })
    }
}

impl DepositView for WorldState {
    fn locked_deposit(&self, chain_id: &str, address: &Address) -> Amount {
        self.deposits
            .get(&(chain_id.to_string(), *address))
            .copied()
            .unwrap_or(0)
    }
}
