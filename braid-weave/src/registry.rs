//! Dispatch tables for special transaction kinds and post-commit hooks.
//!
//! Built once at startup and shared read-only afterwards. A missing entry
//! is not an error: the transaction falls back to ordinary rules.

use std::collections::BTreeMap;

use braid_bridge::{CrossChainHelper, PendingOps};
use braid_types::block::Block;
use braid_types::epoch::Epoch;
use braid_types::primitives::{Height, TxHash};
use braid_types::tx::{FunctionKind, Transaction, TxCall};

use crate::epoch::EpochEngine;
use crate::error::WeaveError;
use crate::state::WorldState;

/// What a transaction handler sees.
pub struct TxContext<'a> {
    pub helper: &'a dyn CrossChainHelper,
    pub tx: &'a Transaction,
    pub call: &'a TxCall,
    pub tx_hash: TxHash,
    /// Height of the block the transaction is (or would be) included in.
    pub height: Height,
    pub epoch: &'a Epoch,
}

/// What a post-commit hook sees.
pub struct HookContext<'a> {
    pub helper: &'a dyn CrossChainHelper,
    pub block: &'a Block,
    pub state: &'a mut WorldState,
    pub epochs: &'a mut EpochEngine,
}

pub type ValidateHandler =
    Box<dyn Fn(&TxContext<'_>, &WorldState) -> Result<(), WeaveError> + Send + Sync>;

pub type ApplyHandler = Box<
    dyn Fn(&TxContext<'_>, &mut WorldState, &mut PendingOps) -> Result<(), WeaveError>
        + Send
        + Sync,
>;

pub type PostCommitHook = Box<dyn Fn(&mut HookContext<'_>) -> Result<(), WeaveError> + Send + Sync>;

/// Validate, apply and post-commit tables.
#[derive(Default)]
pub struct CallbackRegistry {
    validate: BTreeMap<FunctionKind, ValidateHandler>,
    apply: BTreeMap<FunctionKind, ApplyHandler>,
    hooks: BTreeMap<String, PostCommitHook>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_validate(
        &mut self,
        kind: FunctionKind,
        handler: ValidateHandler,
    ) -> Result<(), WeaveError> {
        if self.validate.contains_key(&kind) {
            return Err(WeaveError::RegistrationConflict {
                key: format!("validate:{}", kind),
            });
        }
        self.validate.insert(kind, handler);
        Ok(())
    }

    pub fn register_apply(
        &mut self,
        kind: FunctionKind,
        handler: ApplyHandler,
    ) -> Result<(), WeaveError> {
        if self.apply.contains_key(&kind) {
            return Err(WeaveError::RegistrationConflict {
                key: format!("apply:{}", kind),
            });
        }
        self.apply.insert(kind, handler);
        Ok(())
    }

    pub fn register_post_commit_hook(
        &mut self,
        name: impl Into<String>,
        hook: PostCommitHook,
    ) -> Result<(), WeaveError> {
        let name = name.into();
        if self.hooks.contains_key(&name) {
            return Err(WeaveError::RegistrationConflict {
                key: format!("hook:{}", name),
            });
        }
        self.hooks.insert(name, hook);
        Ok(())
    }

    pub fn lookup_validate(&self, kind: FunctionKind) -> Option<&ValidateHandler> {
        self.validate.get(&kind)
    }

    pub fn lookup_apply(&self, kind: FunctionKind) -> Option<&ApplyHandler> {
        self.apply.get(&kind)
    }

    pub fn lookup_post_commit_hook(&self, name: &str) -> Option<&PostCommitHook> {
        self.hooks.get(name)
    }

    /// Hooks in lexicographic name order, the order they run in.
    pub fn post_commit_hooks(&self) -> impl Iterator<Item = (&str, &PostCommitHook)> {
        self.hooks.iter().map(|(name, hook)| (name.as_str(), hook))
    }
}
