use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use braid_bridge::BridgeConfig;
use braid_crypto::PrivateIdentity;
use braid_types::constants::{BLOCK_TIME_TARGET, DEFAULT_MAIN_CHAIN_ID};
use braid_types::epoch::VotingWindow;
use braid_types::genesis::GenesisDoc;
use braid_types::identity::SchemeTag;

use crate::error::NodeError;

/// File name written by `braid init`.
pub const CONFIG_FILE_NAME: &str = "braid.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chain this node runs. Must match the genesis document.
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Path to the genesis and epoch document (JSON).
    #[serde(default)]
    pub genesis_path: Option<String>,
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    /// Most transactions held while waiting for a block.
    #[serde(default = "default_mempool_size")]
    pub mempool_size: usize,
    /// Other chains whose committed transactions this node reads, each from
    /// the database of a node running on the same machine.
    #[serde(default)]
    pub peers: Vec<PeerChainConfig>,
    pub storage: StorageConfig,
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub epoch: VotingWindow,
    pub logging: LoggingConfig,
    /// Inline genesis document (programmatic only, not serialized to TOML).
    #[serde(skip)]
    pub genesis: Option<GenesisDoc>,
}

fn default_chain_id() -> String {
    DEFAULT_MAIN_CHAIN_ID.to_string()
}

fn default_block_interval_ms() -> u64 {
    BLOCK_TIME_TARGET.as_millis() as u64
}

fn default_mempool_size() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory" or "sqlite"
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Signature scheme of the validator key: ed25519, secp256k1, ethereum or bls.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Hex-encoded 32-byte seed for deterministic key derivation.
    #[serde(default)]
    pub key_seed: Option<String>,
}

fn default_scheme() -> String {
    SchemeTag::Ed25519.name().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChainConfig {
    pub chain_id: String,
    /// SQLite database written by the peer chain's node.
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            genesis_path: None,
            block_interval_ms: default_block_interval_ms(),
            mempool_size: default_mempool_size(),
            peers: Vec::new(),
            storage: StorageConfig {
                data_dir: dirs::home_dir()
                    .map(|h| h.join(".braid").join("data").to_string_lossy().into_owned())
                    .unwrap_or_else(|| "./braid-data".to_string()),
                db_type: "memory".to_string(),
            },
            validator: ValidatorConfig {
                enabled: false,
                scheme: default_scheme(),
                key_seed: None,
            },
            bridge: BridgeConfig::default(),
            epoch: VotingWindow::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            genesis: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.chain_id.is_empty() {
            return Err(NodeError::ConfigError {
                reason: "chain_id is empty".to_string(),
            });
        }
        if !matches!(self.storage.db_type.as_str(), "memory" | "sqlite") {
            return Err(NodeError::ConfigError {
                reason: format!(
                    "unknown storage backend '{}', expected 'memory' or 'sqlite'",
                    self.storage.db_type
                ),
            });
        }
        if self.block_interval_ms == 0 {
            return Err(NodeError::ConfigError {
                reason: "block_interval_ms must be positive".to_string(),
            });
        }
        if !self.epoch.is_valid() {
            return Err(NodeError::ConfigError {
                reason: format!(
                    "voting window {}% / {}% / {}% is not increasing within 100%",
                    self.epoch.vote_start_percent,
                    self.epoch.reveal_start_percent,
                    self.epoch.reveal_end_percent
                ),
            });
        }
        SchemeTag::from_name(&self.validator.scheme)?;
        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.chain_id.is_empty() || peer.db_path.is_empty() {
                return Err(NodeError::ConfigError {
                    reason: "peer chains need a chain_id and a db_path".to_string(),
                });
            }
            if peer.chain_id == self.chain_id {
                return Err(NodeError::ConfigError {
                    reason: format!("peer chain '{}' is this node's own chain", peer.chain_id),
                });
            }
            if !seen.insert(peer.chain_id.as_str()) {
                return Err(NodeError::ConfigError {
                    reason: format!("peer chain '{}' is listed twice", peer.chain_id),
                });
            }
        }
        Ok(())
    }

    /// The validator key: derived from `key_seed` if set, random otherwise.
    pub fn validator_identity(&self) -> Result<PrivateIdentity, NodeError> {
        let scheme = SchemeTag::from_name(&self.validator.scheme)?;
        let Some(ref seed_hex) = self.validator.key_seed else {
            tracing::warn!(scheme = scheme.name(), "no key_seed configured, using a random validator key");
            return Ok(PrivateIdentity::generate(scheme)?);
        };
        let seed_bytes = hex::decode(seed_hex).map_err(|e| NodeError::ConfigError {
            reason: format!("invalid key seed hex: {}", e),
        })?;
        let seed: [u8; 32] = seed_bytes
            .as_slice()
            .try_into()
            .map_err(|_| NodeError::ConfigError {
                reason: format!("key seed must be 32 bytes, got {}", seed_bytes.len()),
            })?;
        Ok(PrivateIdentity::from_seed(scheme, &seed)?)
    }
}
