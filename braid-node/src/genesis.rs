//! Loading the genesis and epoch document into the first epoch, reward
//! scheme and world state of a chain.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::DateTime;

use braid_crypto::address_of;
use braid_types::constants::ONE_TOKEN;
use braid_types::epoch::{Epoch, EpochStatus, EpochValidator, RewardScheme};
use braid_types::genesis::{
    ConsensusKind, EpochDoc, GenesisAllocation, GenesisDoc, GenesisValidator, RewardSchemeDoc,
};
use braid_types::identity::PublicIdentity;
use braid_types::primitives::*;
use braid_weave::WorldState;

use crate::error::NodeError;

/// Seed of the validator key used by `braid run --dev`.
pub const DEV_KEY_SEED: &str = "6272616964206465762076616c696461746f72206b6579207365656420303031";

/// Blocks per epoch on a dev chain.
const DEV_EPOCH_LENGTH: Height = 1_000;

/// Read and check a genesis document.
pub fn load_genesis(path: &Path) -> Result<GenesisDoc, NodeError> {
    let contents = std::fs::read_to_string(path).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to read genesis file '{}': {}", path.display(), e),
    })?;
    let doc: GenesisDoc = serde_json::from_str(&contents).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to parse genesis file '{}': {}", path.display(), e),
    })?;
    check_genesis(&doc)?;
    Ok(doc)
}

/// Structural checks plus everything [`genesis_chain`] would reject.
pub fn check_genesis(doc: &GenesisDoc) -> Result<(), NodeError> {
    doc.check().map_err(|reason| NodeError::GenesisError { reason })?;
    if doc.consensus != ConsensusKind::Pos {
        return Err(NodeError::GenesisError {
            reason: "only proof-of-stake chains are supported".to_string(),
        });
    }
    genesis_chain(doc)?;
    Ok(())
}

/// Parse an RFC 3339 time into unix seconds. `"0"` and `""` mean unset.
pub fn parse_time(value: &str) -> Result<Timestamp, NodeError> {
    if value.is_empty() || value == "0" {
        return Ok(0);
    }
    let time = DateTime::parse_from_rfc3339(value).map_err(|e| NodeError::GenesisError {
        reason: format!("invalid time '{}': {}", value, e),
    })?;
    u64::try_from(time.timestamp()).map_err(|_| NodeError::GenesisError {
        reason: format!("time '{}' is before the unix epoch", value),
    })
}

/// The first epoch, reward scheme and world state described by `doc`.
pub fn genesis_chain(doc: &GenesisDoc) -> Result<(Epoch, RewardScheme, WorldState), NodeError> {
    let epoch = genesis_epoch(doc)?;
    let state = genesis_state(&doc.alloc)?;
    Ok((epoch, doc.reward_scheme.to_scheme(), state))
}

fn genesis_epoch(doc: &GenesisDoc) -> Result<Epoch, NodeError> {
    let epoch_doc = &doc.current_epoch;
    if parse_time(&epoch_doc.end_time)? != 0 {
        return Err(NodeError::GenesisError {
            reason: format!("epoch {} has already ended", epoch_doc.number),
        });
    }
    let validators = epoch_doc
        .validators
        .iter()
        .map(|v| {
            if address_of(&v.pub_key) != v.address {
                return Err(NodeError::GenesisError {
                    reason: format!("validator {} does not match its key", hex::encode(v.address)),
                });
            }
            Ok(EpochValidator {
                address: v.address,
                pubkey: v.pub_key.clone(),
                amount: v.amount,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Epoch {
        chain_id: doc.chain_id.clone(),
        number: epoch_doc.number,
        validators,
        reward_per_block: epoch_doc.reward_per_block,
        start_block: epoch_doc.start_block,
        end_block: epoch_doc.end_block,
        start_time: parse_time(&epoch_doc.start_time)?,
        end_time: 0,
        blocks_produced: 0,
        status: EpochStatus::NotStarted,
        carried_over: 0,
    })
}

fn genesis_state(alloc: &[GenesisAllocation]) -> Result<WorldState, NodeError> {
    let mut state = WorldState::new();
    let mut seen = BTreeSet::new();
    for entry in alloc {
        if !seen.insert(entry.address) {
            return Err(NodeError::GenesisError {
                reason: format!("duplicate allocation for {}", hex::encode(entry.address)),
            });
        }
        state.credit(&entry.address, entry.amount);
    }
    Ok(state)
}

/// Single-validator genesis for local development. The validator is
/// pre-funded so it can create and join child chains.
pub fn dev_genesis(chain_id: &str, validator: &PublicIdentity, start_time: Timestamp) -> GenesisDoc {
    let address = address_of(validator);
    let start = DateTime::from_timestamp(start_time as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "0".to_string());
    GenesisDoc {
        chain_id: chain_id.to_string(),
        consensus: ConsensusKind::Pos,
        reward_scheme: RewardSchemeDoc {
            total_reward: 210_000_000 * ONE_TOKEN,
            pre_allocated: 178_500_000 * ONE_TOKEN,
            added_per_year: 0,
            reward_first_year: 5_727_300 * ONE_TOKEN,
            descend_per_year: 572_730 * ONE_TOKEN,
            allocated: 0,
            epoch_number_per_year: 31_536_000 / DEV_EPOCH_LENGTH,
        },
        current_epoch: EpochDoc {
            number: 0,
            reward_per_block: ONE_TOKEN / 10,
            start_block: 0,
            end_block: DEV_EPOCH_LENGTH - 1,
            start_time: start,
            end_time: "0".to_string(),
            validators: vec![GenesisValidator {
                address,
                pub_key: validator.clone(),
                amount: 1_000 * ONE_TOKEN,
            }],
        },
        alloc: vec![GenesisAllocation {
            address,
            amount: 1_000_000 * ONE_TOKEN,
        }],
    }
}

#[cfg(test)]
mod tests {
    use braid_crypto::PrivateIdentity;
    use braid_types::identity::SchemeTag;

    use super::*;

    fn make_validator_key() -> PublicIdentity {
        PrivateIdentity::from_seed(SchemeTag::Ed25519, &[5u8; 32])
            .unwrap()
            .public_key()
    }

    fn make_doc() -> GenesisDoc {
        dev_genesis("braid-main", &make_validator_key(), 1_700_000_000)
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("0").unwrap(), 0);
        assert_eq!(parse_time("").unwrap(), 0);
        assert_eq!(parse_time("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200);
        assert_eq!(parse_time("2024-01-01T02:00:00+02:00").unwrap(), 1_704_067_200);
        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("1969-12-31T23:59:59Z").is_err());
    }

    #[test]
    fn test_dev_genesis_builds_chain() {
        let doc = make_doc();
        check_genesis(&doc).unwrap();
        let (epoch, scheme, state) = genesis_chain(&doc).unwrap();
        let address = address_of(&make_validator_key());
        assert_eq!(epoch.chain_id, "braid-main");
        assert_eq!(epoch.start_time, 1_700_000_000);
        assert_eq!(epoch.length(), DEV_EPOCH_LENGTH);
        assert!(epoch.is_validator(&address));
        assert_eq!(epoch.status, EpochStatus::NotStarted);
        assert_eq!(scheme.epochs_per_year, 31_536);
        assert_eq!(epoch.reward_per_block, ONE_TOKEN / 10);
        assert_eq!(state.balance(&address), 1_000_000 * ONE_TOKEN);
    }

    #[test]
    fn test_load_genesis_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("genesis.json");
        std::fs::write(&path, serde_json::to_string_pretty(&make_doc()).unwrap()).unwrap();
        let doc = load_genesis(&path).unwrap();
        assert_eq!(doc, make_doc());
    }

    #[test]
    fn test_load_genesis_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("genesis.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_genesis(&path), Err(NodeError::GenesisError { .. })));
        assert!(load_genesis(&tmp.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_rejects_mismatched_validator_address() {
        let mut doc = make_doc();
        doc.current_epoch.validators[0].address = [9u8; 20];
        assert!(check_genesis(&doc).unwrap_err().to_string().contains("does not match"));
    }

    #[test]
    fn test_rejects_ended_epoch() {
        let mut doc = make_doc();
        doc.current_epoch.end_time = "2024-02-01T00:00:00Z".to_string();
        assert!(check_genesis(&doc).is_err());
    }

    #[test]
    fn test_rejects_duplicate_allocation() {
        let mut doc = make_doc();
        let dup = doc.alloc[0].clone();
        doc.alloc.push(dup);
        assert!(check_genesis(&doc).unwrap_err().to_string().contains("duplicate allocation"));
    }

    #[test]
    fn test_rejects_proof_of_work() {
        let mut doc = make_doc();
        doc.consensus = ConsensusKind::Pow;
        assert!(check_genesis(&doc).is_err());
    }
}
