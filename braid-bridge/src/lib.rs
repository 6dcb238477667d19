//! Cross-chain protocol for the Braid multi-chain node.
//!
//! Child chain admission and launch, commit-reveal epoch voting, anchoring
//! of child chain proofs on the main chain, and the replay ledgers guarding
//! cross-chain deposits and withdrawals. Handlers reach all of it through
//! the [`CrossChainHelper`] trait.

pub mod client;
pub mod config;
pub mod error;
pub mod helper;
pub mod pending;
pub mod protocol;
mod rules;

pub use client::{ChainClient, ChainRouter, LocalChainClient, NoChainClient};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use helper::BridgeHelper;
pub use pending::{PendingOp, PendingOps};
pub use protocol::{CrossChainHelper, DepositView, LaunchDecision, LaunchedChain, StoredChain};
