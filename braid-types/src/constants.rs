use crate::primitives::Amount;
use std::time::Duration;

// ─── Token Parameters ────────────────────────────────────────────────────────

/// Number of decimal places for the native token.
pub const NATIVE_DECIMALS: u32 = 18;

/// One full native token in base units (10^18).
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

// ─── Chain Parameters ────────────────────────────────────────────────────────

/// Chain id of the main chain unless a genesis document says otherwise.
pub const DEFAULT_MAIN_CHAIN_ID: &str = "braid-main";

/// Maximum length of a child chain id in bytes.
pub const MAX_CHAIN_ID_LEN: usize = 64;

/// Target time between blocks.
pub const BLOCK_TIME_TARGET: Duration = Duration::from_secs(1);

/// Maximum number of transactions in one block.
pub const MAX_TXS_PER_BLOCK: usize = 5_000;

// ─── Child Chain Admission ───────────────────────────────────────────────────

/// Upper bound on `min_validators` a child chain may ask for.
pub const DEFAULT_MAX_MIN_VALIDATORS: u16 = 100;

/// Shortest allowed join window (`end_block - start_block`).
pub const DEFAULT_MIN_JOIN_WINDOW: u64 = 10;

/// Longest allowed join window.
pub const DEFAULT_MAX_JOIN_WINDOW: u64 = 100_000;

/// Maximum number of child block headers anchored by one proof.
pub const DEFAULT_MAX_PROOF_HEADERS: usize = 256;

// ─── Epoch Voting ────────────────────────────────────────────────────────────

/// Commit phase opens at this percentage of the epoch.
pub const VOTE_START_PERCENT: u64 = 75;

/// Reveal phase opens (and commit phase closes) at this percentage.
pub const REVEAL_START_PERCENT: u64 = 85;

/// Reveal phase closes at this percentage.
pub const REVEAL_END_PERCENT: u64 = 95;

/// Maximum salt length accepted in a vote reveal.
pub const MAX_SALT_LEN: usize = 64;

// ─── Hash Domains ────────────────────────────────────────────────────────────

/// BLAKE3 derive-key context for epoch vote commitments.
pub const VOTE_HASH_DOMAIN: &str = "braid 2024 epoch vote commitment";

/// BLAKE3 derive-key context for transaction hashes.
pub const TX_HASH_DOMAIN: &str = "braid 2024 transaction hash";

/// BLAKE3 derive-key context for child chain header hashes.
pub const CHILD_HEADER_DOMAIN: &str = "braid 2024 child chain header";

/// BLAKE3 derive-key context for child chain validator set changes.
pub const VALIDATOR_SET_DOMAIN: &str = "braid 2024 child chain validator set";
