use std::path::Path;

use clap::{Parser, Subcommand};

use braid_crypto::address_of;

use crate::config::{NodeConfig, CONFIG_FILE_NAME};
use crate::error::NodeError;
use crate::genesis::{dev_genesis, genesis_chain, load_genesis, DEV_KEY_SEED};

#[derive(Parser)]
#[command(
    name = "braid",
    about = "Braid node: main chain and child chains with cross-chain deposits and proofs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = CONFIG_FILE_NAME)]
        config: String,
        /// Start a throwaway single-validator chain in memory
        #[arg(long)]
        dev: bool,
        /// Storage backend: "memory" or "sqlite"
        #[arg(long)]
        storage: Option<String>,
        /// Override data directory path
        #[arg(long)]
        data_dir: Option<String>,
        /// Hex-encoded 32-byte seed for the validator key
        #[arg(long)]
        key_seed: Option<String>,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Validate a genesis document and print its summary
    CheckGenesis {
        /// Path to the genesis document
        #[arg(short, long, default_value = "genesis.json")]
        path: String,
    },
}

/// Resolve the configuration for `braid run`.
pub fn run_config(
    config: &str,
    dev: bool,
    storage: Option<String>,
    data_dir: Option<String>,
    key_seed: Option<String>,
) -> Result<NodeConfig, NodeError> {
    let mut config = if dev {
        let mut cfg = NodeConfig::default();
        cfg.validator.enabled = true;
        cfg.validator.key_seed = Some(DEV_KEY_SEED.to_string());
        cfg.block_interval_ms = 1_000;
        cfg
    } else {
        NodeConfig::load(config)?
    };

    if let Some(db) = storage {
        config.storage.db_type = db;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(seed) = key_seed {
        config.validator.key_seed = Some(seed);
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            config,
            dev,
            storage,
            data_dir,
            key_seed,
        } => {
            let mut config = run_config(&config, dev, storage, data_dir, key_seed)?;
            let identity = config.validator_identity()?;
            if dev {
                config.genesis = Some(dev_genesis(
                    &config.chain_id,
                    &identity.public_key(),
                    chrono::Utc::now().timestamp().max(0) as u64,
                ));
            }
            tracing::info!(
                chain_id = %config.chain_id,
                storage = %config.storage.db_type,
                validator = %hex::encode(address_of(&identity.public_key())),
                dev,
                "starting node"
            );
            let mut node = crate::node::Node::new(config, &identity)?;
            node.run().await
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
        Command::CheckGenesis { path } => {
            let doc = load_genesis(Path::new(&path))?;
            let (epoch, scheme, _) = genesis_chain(&doc)?;
            let supply = doc.alloc.iter().fold(0u128, |acc, a| acc.saturating_add(a.amount));
            println!("Chain:        {}", doc.chain_id);
            println!("Epoch:        {} (blocks {}..={})", epoch.number, epoch.start_block, epoch.end_block);
            println!("Validators:   {} (stake {})", epoch.validators.len(), epoch.total_stake());
            println!("Reward/block: {}", epoch.reward_per_block);
            println!("Unallocated:  {}", scheme.remaining());
            println!("Allocations:  {}", doc.alloc.len());
            println!("Supply:       {}", supply);
            Ok(())
        }
    }
}
