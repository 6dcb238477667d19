//! Genesis and epoch document.
//!
//! Produced by bootstrap tooling outside the node. Large integers are decimal
//! strings and times are RFC 3339 strings; the node converts times when it
//! builds the first [`Epoch`](crate::epoch::Epoch).

use serde::{Deserialize, Serialize};

use crate::epoch::RewardScheme;
use crate::identity::PublicIdentity;
use crate::primitives::*;

/// Consensus engine named in the genesis document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusKind {
    Pos,
    Pow,
}

/// Reward schedule as written in the genesis document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchemeDoc {
    #[serde(with = "crate::primitives::serde_decimal")]
    pub total_reward: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub pre_allocated: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub added_per_year: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub reward_first_year: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub descend_per_year: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub allocated: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub epoch_number_per_year: u64,
}

impl RewardSchemeDoc {
    pub fn to_scheme(&self) -> RewardScheme {
        RewardScheme {
            total_reward: self.total_reward,
            pre_allocated: self.pre_allocated,
            added_per_year: self.added_per_year,
            reward_first_year: self.reward_first_year,
            descend_per_year: self.descend_per_year,
            allocated: self.allocated,
            epochs_per_year: self.epoch_number_per_year,
        }
    }
}

/// A validator of the genesis epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    pub pub_key: PublicIdentity,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub amount: Amount,
}

/// The epoch the chain starts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochDoc {
    #[serde(with = "crate::primitives::serde_decimal")]
    pub number: u64,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub reward_per_block: Amount,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub start_block: Height,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub end_block: Height,
    /// RFC 3339.
    pub start_time: String,
    /// RFC 3339, or "0" while the epoch is running.
    #[serde(default)]
    pub end_time: String,
    pub validators: Vec<GenesisValidator>,
}

/// Initial balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    #[serde(with = "crate::primitives::serde_hex")]
    pub address: Address,
    #[serde(with = "crate::primitives::serde_decimal")]
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    pub consensus: ConsensusKind,
    pub reward_scheme: RewardSchemeDoc,
    pub current_epoch: EpochDoc,
    #[serde(default)]
    pub alloc: Vec<GenesisAllocation>,
}

impl GenesisDoc {
    /// Structural checks that do not need time parsing.
    pub fn check(&self) -> Result<(), String> {
        if self.chain_id.is_empty() {
            return Err("chain_id is empty".to_string());
        }
        let scheme = &self.reward_scheme;
        if scheme.pre_allocated > scheme.total_reward {
            return Err("pre_allocated exceeds total_reward".to_string());
        }
        if scheme.allocated > scheme.total_reward.saturating_sub(scheme.pre_allocated) {
            return Err("allocated exceeds the block reward budget".to_string());
        }
        if scheme.epoch_number_per_year == 0 {
            return Err("epoch_number_per_year must be positive".to_string());
        }
        let epoch = &self.current_epoch;
        if epoch.start_block > epoch.end_block {
            return Err(format!(
                "epoch start_block {} is after end_block {}",
                epoch.start_block, epoch.end_block
            ));
        }
        if epoch.validators.is_empty() {
            return Err("current epoch has no validators".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for v in &epoch.validators {
            if !seen.insert(v.address) {
                return Err(format!("duplicate validator {}", hex::encode(v.address)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_doc_json() -> String {
        let pk = PublicIdentity::Ed25519([7u8; 32]).to_hex();
        format!(
            r#"{{
                "chain_id": "braid-main",
                "consensus": "pos",
                "reward_scheme": {{
                    "total_reward": "210000000000000000000000000",
                    "pre_allocated": "178500000000000000000000000",
                    "added_per_year": "0",
                    "reward_first_year": "5727300000000000000000000",
                    "descend_per_year": "572730000000000000000000",
                    "allocated": "0",
                    "epoch_number_per_year": "525600"
                }},
                "current_epoch": {{
                    "number": "0",
                    "reward_per_block": "1666666666666666666666667",
                    "start_block": "0",
                    "end_block": "1295999",
                    "start_time": "2024-01-01T00:00:00Z",
                    "end_time": "0",
                    "validators": [
                        {{ "address": "{addr}", "pub_key": "{pk}", "amount": "1000" }}
                    ]
                }}
            }}"#,
            addr = hex::encode([1u8; 20]),
            pk = pk
        )
    }

    #[test]
    fn test_parse_genesis_doc() {
        let doc: GenesisDoc = serde_json::from_str(&make_doc_json()).unwrap();
        assert_eq!(doc.consensus, ConsensusKind::Pos);
        assert_eq!(
            doc.reward_scheme.total_reward,
            210_000_000_000_000_000_000_000_000
        );
        assert_eq!(doc.current_epoch.end_block, 1_295_999);
        assert_eq!(doc.current_epoch.validators[0].address, [1u8; 20]);
        assert!(doc.alloc.is_empty());
        assert!(doc.check().is_ok());
        assert_eq!(doc.reward_scheme.to_scheme().epochs_per_year, 525_600);
    }

    #[test]
    fn test_check_rejects_duplicate_validator() {
        let mut doc: GenesisDoc = serde_json::from_str(&make_doc_json()).unwrap();
        let dup = doc.current_epoch.validators[0].clone();
        doc.current_epoch.validators.push(dup);
        assert!(doc.check().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_check_rejects_overallocation() {
        let mut doc: GenesisDoc = serde_json::from_str(&make_doc_json()).unwrap();
        doc.reward_scheme.allocated = doc.reward_scheme.total_reward;
        assert!(doc.check().is_err());
    }
}
