use serde::{Deserialize, Serialize};

use braid_types::constants::{
    DEFAULT_MAIN_CHAIN_ID, DEFAULT_MAX_JOIN_WINDOW, DEFAULT_MAX_MIN_VALIDATORS,
    DEFAULT_MAX_PROOF_HEADERS, DEFAULT_MIN_JOIN_WINDOW,
};

/// Admission and anchoring policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub main_chain_id: String,
    /// Largest `min_validators` a child chain may ask for.
    pub max_min_validators: u16,
    /// Join window bounds in blocks (`end_block - start_block`).
    pub min_join_window: u64,
    pub max_join_window: u64,
    /// Most headers a single proof may anchor.
    pub max_proof_headers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            main_chain_id: DEFAULT_MAIN_CHAIN_ID.to_string(),
            max_min_validators: DEFAULT_MAX_MIN_VALIDATORS,
            min_join_window: DEFAULT_MIN_JOIN_WINDOW,
            max_join_window: DEFAULT_MAX_JOIN_WINDOW,
            max_proof_headers: DEFAULT_MAX_PROOF_HEADERS,
        }
    }
}
