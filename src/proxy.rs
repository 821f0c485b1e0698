//! Live views over map fields' remote hashes.

use std::collections::BTreeMap;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::field::FieldKind;
use crate::record::{decode_map, Record};
use crate::store::RemoteStore;
use crate::value::Value;

/// A lazily-materialized view over a map field's remote hash.
///
/// No operation materializes the whole hash except [`MapView::snapshot`].
/// Outside a session every call is one hash round trip; a view created
/// inside a session reads and writes the staging buffer instead. A view
/// created *before* a session is stale while that session's buffer is
/// attached: the buffer holds its own copy of the whole map and must stay
/// the sole source of truth until detached, so every operation fails with
/// [`Error::StaleView`] rather than touching the remote hash. Once the
/// buffer detaches, the view works again.
pub struct MapView {
    record: Record,
    field: String,
    generation: u64,
}

impl MapView {
    pub(crate) fn new(record: Record, field: String, generation: u64) -> Self {
        MapView {
            record,
            field,
            generation,
        }
    }

    fn codecs(&self) -> Result<(&Codec, &Codec, &str)> {
        let spec = self.record.schema().field(&self.field)?;
        match spec.kind() {
            FieldKind::Map { key, value } => Ok((key, value, spec.remote_key())),
            FieldKind::Scalar(_) => Err(Error::NotAMapField(self.field.clone())),
        }
    }

    /// Runs `f` against the staged entries if a session buffer is attached.
    /// `Ok(None)` means no buffer: the caller goes to the remote hash.
    fn staged<T>(
        &self,
        remote_key: &str,
        f: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>) -> T,
    ) -> Result<Option<T>> {
        let mut state = self.record.state();
        let generation = state.generation;
        match state.staging.as_mut() {
            None => Ok(None),
            Some(_) if generation != self.generation => Err(Error::StaleView),
            Some(staging) => {
                let map = staging.maps.entry(remote_key.to_string()).or_default();
                Ok(Some(f(map)))
            }
        }
    }

    /// Reads one entry. An absent entry is `Ok(None)`.
    pub async fn get<S: RemoteStore>(&self, store: &S, key: &Value) -> Result<Option<Value>> {
        let (key_codec, value_codec, remote_key) = self.codecs()?;
        let encoded_key = key_codec.encode(key)?;
        let raw = match self.staged(remote_key, |map| map.get(&encoded_key).cloned())? {
            Some(staged) => staged,
            None => store.hget(remote_key, &encoded_key).await?,
        };
        match raw {
            Some(raw) => value_codec.decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn insert<S: RemoteStore>(
        &self,
        store: &S,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let (key_codec, value_codec, remote_key) = self.codecs()?;
        let encoded_key = key_codec.encode(&key.into())?;
        let encoded_value = value_codec.encode(&value.into())?;
        if self
            .staged(remote_key, |map| {
                map.insert(encoded_key.clone(), encoded_value.clone());
            })?
            .is_some()
        {
            return Ok(());
        }
        store.hset(remote_key, encoded_key, encoded_value).await
    }

    pub async fn remove<S: RemoteStore>(&self, store: &S, key: &Value) -> Result<()> {
        let (key_codec, _, remote_key) = self.codecs()?;
        let encoded_key = key_codec.encode(key)?;
        if self
            .staged(remote_key, |map| {
                map.remove(&encoded_key);
            })?
            .is_some()
        {
            return Ok(());
        }
        store.hdel(remote_key, &encoded_key).await
    }

    pub async fn contains<S: RemoteStore>(&self, store: &S, key: &Value) -> Result<bool> {
        let (key_codec, _, remote_key) = self.codecs()?;
        let encoded_key = key_codec.encode(key)?;
        match self.staged(remote_key, |map| map.contains_key(&encoded_key))? {
            Some(staged) => Ok(staged),
            None => store.hexists(remote_key, &encoded_key).await,
        }
    }

    pub async fn len<S: RemoteStore>(&self, store: &S) -> Result<usize> {
        let (_, _, remote_key) = self.codecs()?;
        match self.staged(remote_key, |map| map.len())? {
            Some(staged) => Ok(staged),
            None => store.hlen(remote_key).await,
        }
    }

    pub async fn is_empty<S: RemoteStore>(&self, store: &S) -> Result<bool> {
        Ok(self.len(store).await? == 0)
    }

    pub async fn keys<S: RemoteStore>(&self, store: &S) -> Result<Vec<Value>> {
        let (key_codec, _, remote_key) = self.codecs()?;
        let raw_keys = match self.staged(remote_key, |map| map.keys().cloned().collect())? {
            Some(staged) => staged,
            None => store.hkeys(remote_key).await?,
        };
        raw_keys.iter().map(|k| key_codec.decode(k)).collect()
    }

    pub async fn values<S: RemoteStore>(&self, store: &S) -> Result<Vec<Value>> {
        let (_, value_codec, remote_key) = self.codecs()?;
        let raw_values = match self.staged(remote_key, |map| map.values().cloned().collect())? {
            Some(staged) => staged,
            None => store.hvals(remote_key).await?,
        };
        raw_values.iter().map(|v| value_codec.decode(v)).collect()
    }

    /// Fully materializes the map: every entry fetched and decoded, ordered
    /// by encoded key.
    pub async fn snapshot<S: RemoteStore>(&self, store: &S) -> Result<Vec<(Value, Value)>> {
        let (key_codec, value_codec, remote_key) = self.codecs()?;
        let entries: BTreeMap<Vec<u8>, Vec<u8>> =
            match self.staged(remote_key, |map| map.clone())? {
                Some(staged) => staged,
                None => store.hgetall(remote_key).await?.into_iter().collect(),
            };
        decode_map(Some(&entries), key_codec, value_codec)
    }
}
