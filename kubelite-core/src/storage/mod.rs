//! Object store for Kubelite
//!
//! Linearizable hierarchical key-value storage with atomic create and
//! revision-checked update. Backed by etcd, or by an in-memory keyspace
//! with the same contract.

pub mod etcd;
pub mod factory;
pub mod memory;

pub use etcd::EtcdStore;
pub use factory::StoreBuilder;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Write generation of a stored value. Strictly increases with every write.
pub type Revision = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: Revision,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    AlreadyExists(String),

    #[error("revision mismatch on {key}: expected {expected}, stored {actual}")]
    Conflict {
        key: String,
        expected: Revision,
        actual: Revision,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage backend interface.
///
/// Every call is a single atomic operation on one key (or one snapshot read
/// for `list`). Implementations never retry.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Insert `value` under `key` only if the key is absent.
    async fn create(
        &self,
        key: &str,
        value: Vec<u8>,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision>;

    async fn get(&self, key: &str, cancel: &CancellationToken) -> StoreResult<StoredObject>;

    /// Replace `value` only if the stored revision equals `expected`.
    async fn update(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Revision,
        cancel: &CancellationToken,
    ) -> StoreResult<Revision>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str, cancel: &CancellationToken) -> StoreResult<bool>;

    /// Snapshot of every key under `prefix`, in lexical key order.
    async fn list(&self, prefix: &str, cancel: &CancellationToken)
    -> StoreResult<Vec<StoredObject>>;
}

pub type DynObjectStore = std::sync::Arc<dyn ObjectStore>;

/// Run `fut` unless `cancel` fires first.
///
/// Dropping `fut` abandons the request before its response is read; the
/// backend applies a write either whole or not at all, so nothing partial
/// becomes visible.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}
