//! In-memory store backend with lock and watch semantics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::store::{RemoteStore, StoreTransaction};

/// An in-process [`RemoteStore`] implementation.
///
/// Keys and hashes live in `RwLock`-guarded tables; a per-key version
/// counter, bumped on every mutation, backs the watch/exec conflict check.
/// Named locks are emulated with `tokio` mutexes, so `lock_acquire` waits
/// like its distributed counterpart. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    data: RwLock<Data>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    held: std::sync::Mutex<HashMap<String, OwnedMutexGuard<()>>>,
}

#[derive(Default)]
struct Data {
    kv: HashMap<String, Vec<u8>>,
    hashes: HashMap<String, HashMap<Vec<u8>, Vec<u8>>>,
    versions: HashMap<String, u64>,
}

impl Data {
    fn touch(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Set(key, value) => {
                self.kv.insert(key.clone(), value);
                self.touch(&key);
            }
            Command::Delete(keys) => {
                for key in keys {
                    self.kv.remove(&key);
                    self.hashes.remove(&key);
                    self.touch(&key);
                }
            }
            Command::MSet(pairs) => {
                for (key, value) in pairs {
                    self.kv.insert(key.clone(), value);
                    self.touch(&key);
                }
            }
            Command::HSetAll(key, entries) => {
                let hash = self.hashes.entry(key.clone()).or_default();
                for (field, value) in entries {
                    hash.insert(field, value);
                }
                self.touch(&key);
            }
        }
    }
}

enum Command {
    Set(String, Vec<u8>),
    Delete(Vec<String>),
    MSet(Vec<(String, Vec<u8>)>),
    HSetAll(String, Vec<(Vec<u8>, Vec<u8>)>),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Data> {
        self.shared.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Data> {
        self.shared.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read().kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.write().apply(Command::Set(key.to_string(), value));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.write().apply(Command::Delete(keys.to_vec()));
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let data = self.read();
        Ok(keys.iter().map(|k| data.kv.get(k).cloned()).collect())
    }

    async fn mset(&self, pairs: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.write().apply(Command::MSet(pairs));
        Ok(())
    }

    async fn hget(&self, key: &str, field: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .read()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write()
            .apply(Command::HSetAll(key.to_string(), vec![(field, value)]));
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &[u8]) -> Result<()> {
        let mut data = self.write();
        if let Some(hash) = data.hashes.get_mut(key) {
            hash.remove(field);
            if hash.is_empty() {
                data.hashes.remove(key);
            }
            data.touch(key);
        }
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &[u8]) -> Result<bool> {
        Ok(self
            .read()
            .hashes
            .get(key)
            .is_some_and(|h| h.contains_key(field)))
    }

    async fn hlen(&self, key: &str) -> Result<usize> {
        Ok(self.read().hashes.get(key).map_or(0, |h| h.len()))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let mut keys: Vec<Vec<u8>> = self
            .read()
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn hvals(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .hgetall(key)
            .await?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .read()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        entries.sort();
        Ok(entries)
    }

    async fn hset_all(&self, key: &str, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        self.write().apply(Command::HSetAll(key.to_string(), entries));
        Ok(())
    }

    async fn lock_acquire(&self, name: &str) -> Result<()> {
        let slot = {
            let mut locks = self.shared.locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = slot.lock_owned().await;
        self.shared
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), guard);
        Ok(())
    }

    async fn lock_release(&self, name: &str) -> Result<()> {
        let released = self
            .shared
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some();
        if released {
            Ok(())
        } else {
            Err(Error::store(format!("lock `{name}` is not held")))
        }
    }

    async fn transaction(&self) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            store: self.clone(),
            watched: Vec::new(),
            queue: Vec::new(),
        })
    }
}

/// A buffered command group over a [`MemoryStore`].
pub struct MemoryTransaction {
    store: MemoryStore,
    watched: Vec<(String, u64)>,
    queue: Vec<Command>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn watch(&mut self, keys: &[String]) -> Result<()> {
        let data = self.store.read();
        self.watched
            .extend(keys.iter().map(|k| (k.clone(), data.version(k))));
        Ok(())
    }

    fn queue_set(&mut self, key: String, value: Vec<u8>) {
        self.queue.push(Command::Set(key, value));
    }

    fn queue_delete(&mut self, keys: Vec<String>) {
        self.queue.push(Command::Delete(keys));
    }

    fn queue_mset(&mut self, pairs: Vec<(String, Vec<u8>)>) {
        self.queue.push(Command::MSet(pairs));
    }

    fn queue_hset_all(&mut self, key: String, entries: Vec<(Vec<u8>, Vec<u8>)>) {
        self.queue.push(Command::HSetAll(key, entries));
    }

    async fn exec(self) -> Result<()> {
        let mut data = self.store.write();
        for (key, version) in &self.watched {
            if data.version(key) != *version {
                return Err(Error::Conflict);
            }
        }
        for command in self.queue {
            data.apply(command);
        }
        Ok(())
    }

    async fn discard(self) -> Result<()> {
        Ok(())
    }
}
