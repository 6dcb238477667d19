//! Block execution for Braid chains.
//!
//! Hosts the callback registry and the cross-chain handlers and hooks
//! registered in it, world state, the all-or-nothing block pipeline, and
//! the epoch and reward engine.

pub mod block;
pub mod chain;
pub mod epoch;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod mempool;
pub mod registry;
pub mod reward;
pub mod state;

pub use chain::{Chain, ExecutedBlock, TxRejection};
pub use error::{RejectionKind, WeaveError};
pub use registry::CallbackRegistry;
pub use state::WorldState;

/// Registry with every built-in handler and hook.
pub fn default_registry() -> Result<CallbackRegistry, WeaveError> {
    let mut registry = CallbackRegistry::new();
    handlers::register_cross_chain_handlers(&mut registry)?;
    hooks::register_builtin_hooks(&mut registry)?;
    Ok(registry)
}
