use std::collections::BTreeMap;
use std::sync::Arc;

use braid_storage::{ChainInfoStore, KvStore};
use braid_types::block::IndexedTx;
use braid_types::primitives::TxHash;

use crate::error::BridgeError;

/// Queries another chain for committed transactions.
pub trait ChainClient: Send + Sync {
    fn get_tx(&self, chain_id: &str, tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError>;
}

/// Client reading another chain's transaction index from a store on the
/// same machine.
pub struct LocalChainClient<S: KvStore> {
    store: ChainInfoStore<S>,
}

impl<S: KvStore> LocalChainClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: ChainInfoStore::new(store),
        }
    }
}

impl<S: KvStore> ChainClient for LocalChainClient<S> {
    fn get_tx(&self, chain_id: &str, tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError> {
        Ok(self.store.get_tx(chain_id, tx_hash)?)
    }
}

/// Client for nodes with no peer chain configured. Every lookup misses.
#[derive(Debug, Default)]
pub struct NoChainClient;

impl ChainClient for NoChainClient {
    fn get_tx(&self, _chain_id: &str, _tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError> {
        Ok(None)
    }
}

/// Routes each lookup to the client registered for its chain. Chains
/// without a route miss.
#[derive(Default)]
pub struct ChainRouter {
    routes: BTreeMap<String, Arc<dyn ChainClient>>,
}

impl ChainRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, chain_id: impl Into<String>, client: Arc<dyn ChainClient>) -> Self {
        self.routes.insert(chain_id.into(), client);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl ChainClient for ChainRouter {
    fn get_tx(&self, chain_id: &str, tx_hash: &TxHash) -> Result<Option<IndexedTx>, BridgeError> {
        match self.routes.get(chain_id) {
            Some(client) => client.get_tx(chain_id, tx_hash),
            None => Ok(None),
        }
    }
}
