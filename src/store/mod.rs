//! The remote key-value store contract.
//!
//! The store itself is an external collaborator; this crate only depends on
//! the operations below. [`memory::MemoryStore`] is a complete in-process
//! implementation used by the test suite and for local runs.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

/// A remote key-value backend.
///
/// Scalar keys and hashes share one namespace: `delete` removes a key
/// whichever kind it holds. Every call is one blocking round trip; batching
/// happens only through `mget`/`mset`/`hset_all` and the transaction handle.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    type Tx: StoreTransaction;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, keys: &[String]) -> Result<()>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn mset(&self, pairs: Vec<(String, Vec<u8>)>) -> Result<()>;

    async fn hget(&self, key: &str, field: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn hset(&self, key: &str, field: Vec<u8>, value: Vec<u8>) -> Result<()>;
    async fn hdel(&self, key: &str, field: &[u8]) -> Result<()>;
    async fn hexists(&self, key: &str, field: &[u8]) -> Result<bool>;
    async fn hlen(&self, key: &str) -> Result<usize>;
    async fn hkeys(&self, key: &str) -> Result<Vec<Vec<u8>>>;
    async fn hvals(&self, key: &str) -> Result<Vec<Vec<u8>>>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
    /// Seeds a whole hash in one call.
    async fn hset_all(&self, key: &str, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()>;

    /// Acquires the named cross-process mutual-exclusion lock, waiting until
    /// it is available.
    async fn lock_acquire(&self, name: &str) -> Result<()>;
    async fn lock_release(&self, name: &str) -> Result<()>;

    /// Opens a buffered transaction handle for watch/queue/exec.
    async fn transaction(&self) -> Result<Self::Tx>;
}

/// A buffered command group with optimistic conflict detection.
///
/// `watch` must be called before the keys are read; queued commands are
/// applied only by `exec`, atomically, and only if no watched key changed
/// since the watch began. The handle is consumed by `exec` or `discard`, so
/// buffered state cannot outlive the transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn watch(&mut self, keys: &[String]) -> Result<()>;

    fn queue_set(&mut self, key: String, value: Vec<u8>);
    fn queue_delete(&mut self, keys: Vec<String>);
    fn queue_mset(&mut self, pairs: Vec<(String, Vec<u8>)>);
    fn queue_hset_all(&mut self, key: String, entries: Vec<(Vec<u8>, Vec<u8>)>);

    /// Applies the queued commands atomically. Fails with
    /// [`Error::Conflict`](crate::Error::Conflict) if any watched key changed.
    async fn exec(self) -> Result<()>;

    /// Drops the queued commands without applying anything.
    async fn discard(self) -> Result<()>;
}
