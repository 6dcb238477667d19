use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use braid_bridge::{
    BridgeHelper, ChainClient, ChainRouter, CrossChainHelper, LocalChainClient, NoChainClient,
};
use braid_crypto::{address_of, PrivateIdentity};
use braid_storage::{BatchWriter, MemoryStore, SqliteStore};
use braid_types::block::Block;
use braid_types::constants::MAX_TXS_PER_BLOCK;
use braid_types::primitives::{Address, Timestamp};
use braid_types::tx::Transaction;
use braid_weave::mempool::Mempool;
use braid_weave::{default_registry, Chain};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::genesis::{genesis_chain, load_genesis};

/// Capacity of the transaction submission channel.
const SUBMIT_QUEUE_SIZE: usize = 1_024;

/// A single-validator node: one chain, its mempool and the block loop.
pub struct Node {
    config: NodeConfig,
    chain: Chain,
    proposer: Address,
    mempool: Mempool,
    submit_tx: mpsc::Sender<Transaction>,
    submit_rx: mpsc::Receiver<Transaction>,
}

/// Create a storage backend from the node configuration.
fn create_store(config: &NodeConfig) -> Result<Box<dyn BatchWriter>, NodeError> {
    match config.storage.db_type.as_str() {
        "memory" => Ok(Box::new(MemoryStore::new())),
        "sqlite" => {
            let data_dir = Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let db_path = data_dir.join(format!("{}.db", config.chain_id));
            Ok(Box::new(SqliteStore::open(&db_path)?))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory' or 'sqlite'",
                other
            ),
        }),
    }
}

/// Create the client used to look up transactions on peer chains.
fn create_chain_client(config: &NodeConfig) -> Result<Arc<dyn ChainClient>, NodeError> {
    if config.peers.is_empty() {
        return Ok(Arc::new(NoChainClient));
    }
    let mut router = ChainRouter::new();
    for peer in &config.peers {
        let path = Path::new(&peer.db_path);
        if !path.exists() {
            return Err(NodeError::ConfigError {
                reason: format!("peer chain '{}' database {} not found", peer.chain_id, peer.db_path),
            });
        }
        let store = SqliteStore::open(path)?;
        tracing::info!(chain_id = %peer.chain_id, db_path = %peer.db_path, "reading peer chain");
        router = router.route(peer.chain_id.clone(), Arc::new(LocalChainClient::new(store)));
    }
    Ok(Arc::new(router))
}

impl Node {
    /// Open storage and resume the chain, or start it from genesis if no
    /// block was ever committed.
    pub fn new(config: NodeConfig, identity: &PrivateIdentity) -> Result<Self, NodeError> {
        config.validate()?;
        let store = create_store(&config)?;
        let helper: Arc<dyn CrossChainHelper> = Arc::new(BridgeHelper::new(
            config.chain_id.clone(),
            config.bridge.clone(),
            config.epoch,
            store,
            create_chain_client(&config)?,
        ));
        let registry = Arc::new(default_registry()?);

        let chain = match Chain::resume(Arc::clone(&helper), Arc::clone(&registry))? {
            Some(chain) => chain,
            None => {
                let doc = match (&config.genesis, &config.genesis_path) {
                    (Some(doc), _) => doc.clone(),
                    (None, Some(path)) => load_genesis(Path::new(path))?,
                    (None, None) => {
                        return Err(NodeError::ConfigError {
                            reason: "no stored chain and no genesis_path configured".to_string(),
                        });
                    }
                };
                if doc.chain_id != config.chain_id {
                    return Err(NodeError::GenesisError {
                        reason: format!(
                            "genesis is for '{}', node is configured for '{}'",
                            doc.chain_id, config.chain_id
                        ),
                    });
                }
                let (epoch, scheme, state) = genesis_chain(&doc)?;
                Chain::from_genesis(helper, registry, state, epoch, scheme)?
            }
        };

        let proposer = address_of(&identity.public_key());
        if config.validator.enabled && !chain.epoch().is_validator(&proposer) {
            tracing::warn!(
                proposer = %hex::encode(proposer),
                epoch = chain.epoch().number,
                "validator key is not in the current validator set, blocks will be refused"
            );
        }
        tracing::info!(
            chain_id = %chain.chain_id(),
            next_height = chain.next_height(),
            validator = config.validator.enabled,
            "node ready"
        );

        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_SIZE);
        Ok(Self {
            mempool: Mempool::new(config.mempool_size),
            config,
            chain,
            proposer,
            submit_tx,
            submit_rx,
        })
    }

    /// Handle for submitting transactions to this node.
    pub fn submitter(&self) -> mpsc::Sender<Transaction> {
        self.submit_tx.clone()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }

    /// Admit a submitted transaction into the mempool if it would be valid
    /// against committed state.
    pub fn admit(&mut self, tx: Transaction) -> Result<bool, NodeError> {
        self.chain.validate_tx(&tx)?;
        Ok(self.mempool.add(tx)?)
    }

    /// Build, execute and commit one block from the mempool.
    pub fn produce_block(&mut self, timestamp: Timestamp) -> Result<Block, NodeError> {
        let candidates = self.mempool.drain_for_block(MAX_TXS_PER_BLOCK);
        let height = self.chain.next_height();
        let proposed = self
            .chain
            .propose_block(candidates.clone(), self.proposer, timestamp);
        let (block, rejected) = match proposed {
            Ok(proposed) => proposed,
            Err(e) => {
                // A failed hook still commits the block and its transactions.
                if self.chain.next_height() == height {
                    self.mempool.requeue(candidates);
                }
                return Err(e.into());
            }
        };
        for rejection in &rejected {
            tracing::debug!(
                tx_hash = %hex::encode(rejection.tx_hash),
                kind = %rejection.kind,
                reason = %rejection.reason,
                "transaction dropped"
            );
        }
        tracing::info!(
            height = block.height(),
            txs = block.transactions.len(),
            rejected = rejected.len(),
            "produced block"
        );
        Ok(block)
    }

    /// Run until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        tracing::info!("Node is running. Press Ctrl+C to stop.");
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Received shutdown signal");
        })
        .await
    }

    /// Produce blocks on the configured interval and admit submitted
    /// transactions until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), NodeError>
    where
        F: Future<Output = ()>,
    {
        let mut block_interval =
            tokio::time::interval(Duration::from_millis(self.config.block_interval_ms));
        block_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = block_interval.tick() => {
                    if self.config.validator.enabled {
                        // A failed hook still commits the block, so keep going.
                        if let Err(e) = self.produce_block(current_timestamp()) {
                            tracing::error!(
                                height = self.chain.next_height(),
                                error = %e,
                                "block production failed"
                            );
                        }
                    }
                }
                Some(tx) = self.submit_rx.recv() => {
                    let tx_hash = tx.hash();
                    match self.admit(tx) {
                        Ok(true) => tracing::debug!(tx_hash = %hex::encode(tx_hash), "transaction admitted"),
                        Ok(false) => tracing::debug!(tx_hash = %hex::encode(tx_hash), "duplicate transaction"),
                        Err(e) => tracing::debug!(tx_hash = %hex::encode(tx_hash), error = %e, "transaction refused"),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(height = self.chain.next_height(), "node stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Get the current UNIX timestamp in seconds.
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
