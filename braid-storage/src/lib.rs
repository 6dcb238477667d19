//! Storage for the Braid protocol.
//!
//! A [`KvStore`](traits::KvStore) trait with memory and SQLite backends, a
//! [`StagedStore`](staged::StagedStore) overlay for all-or-nothing commits,
//! and the typed [`ChainInfoStore`](chain_info_store::ChainInfoStore).

pub mod chain_info_store;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod staged;
pub mod traits;

pub use chain_info_store::{ChainInfoStore, LedgerDirection};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use staged::StagedStore;
pub use traits::{BatchOp, BatchWriter, KvPairs, KvStore};
