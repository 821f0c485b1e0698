//! Record instances: named fields backed by remote keys, plus the staging
//! buffer shared by both session types.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::field::FieldKind;
use crate::proxy::MapView;
use crate::schema::RecordSchema;
use crate::store::{RemoteStore, StoreTransaction};
use crate::value::Value;

/// One live [`Record`] per record type.
///
/// The remote key namespace is the record's true identity, so multiple
/// in-memory instances would alias the same remote state incoherently.
/// `open` returns the existing instance for a qualified name, or constructs
/// one, running the schema-skew check exactly once.
#[derive(Default)]
pub struct Registry {
    records: tokio::sync::Mutex<HashMap<String, Record>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open<S: RemoteStore>(&self, store: &S, schema: RecordSchema) -> Result<Record> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(schema.qualified_name()) {
            return Ok(record.clone());
        }
        let record = Record::open(store, schema).await?;
        records.insert(
            record.schema().qualified_name().to_string(),
            record.clone(),
        );
        Ok(record)
    }
}

/// A record instance: a handle over the schema and the per-instance session
/// state. Cloning is cheap and shares the instance.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

struct RecordInner {
    schema: RecordSchema,
    state: Mutex<RecordState>,
}

#[derive(Default)]
pub(crate) struct RecordState {
    pub(crate) staging: Option<Staging>,
    /// Bumped on every staging attach; map views capture it at creation to
    /// detect use across a later attach.
    pub(crate) generation: u64,
}

/// The in-memory buffer that replaces remote access while a session is open.
/// Scalars are held decoded; map entries are held in their encoded form,
/// keyed by encoded map key.
#[derive(Clone, Default)]
pub(crate) struct Staging {
    pub(crate) scalars: HashMap<String, Value>,
    pub(crate) maps: HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl Record {
    async fn open<S: RemoteStore>(store: &S, schema: RecordSchema) -> Result<Record> {
        let signature = schema.signature().into_bytes();
        let stored = store.get(schema.marker_key()).await?;
        if stored.as_deref() != Some(signature.as_slice()) {
            if stored.is_some() {
                tracing::warn!(
                    record = schema.qualified_name(),
                    "stored schema signature changed; resetting record data"
                );
            }
            store.set(schema.marker_key(), signature).await?;
            store.delete(&schema.remote_keys()).await?;
        }
        Ok(Record {
            inner: Arc::new(RecordInner {
                schema,
                state: Mutex::new(RecordState::default()),
            }),
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.inner.schema
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RecordState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads one field: from the staging buffer while a session is open,
    /// otherwise one GET (absent keys yield the field default). A map field
    /// has no detached scalar value outside a session; use [`Record::map_view`].
    pub async fn get<S: RemoteStore>(&self, store: &S, field: &str) -> Result<Value> {
        let spec = self.inner.schema.field(field)?;
        {
            let state = self.state();
            if let Some(staging) = &state.staging {
                return match spec.kind() {
                    FieldKind::Scalar(_) => Ok(staging
                        .scalars
                        .get(spec.remote_key())
                        .cloned()
                        .unwrap_or_else(|| spec.default_value().clone())),
                    FieldKind::Map { key, value } => {
                        decode_map(staging.maps.get(spec.remote_key()), key, value)
                            .map(Value::Map)
                    }
                };
            }
        }
        match spec.kind() {
            FieldKind::Scalar(codec) => match store.get(spec.remote_key()).await? {
                Some(raw) => codec.decode(&raw),
                None => Ok(spec.default_value().clone()),
            },
            FieldKind::Map { .. } => Err(Error::MapFieldRead(field.to_string())),
        }
    }

    /// Writes one field: into the staging buffer while a session is open,
    /// otherwise directly. `Value::None` on a scalar deletes the backing key.
    /// Writing a whole map field replaces the remote hash: delete, then bulk
    /// set; an empty map leaves the hash deleted.
    pub async fn set<S: RemoteStore>(
        &self,
        store: &S,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let spec = self.inner.schema.field(field)?;
        match spec.kind() {
            FieldKind::Scalar(codec) => {
                {
                    let mut state = self.state();
                    if let Some(staging) = &mut state.staging {
                        staging.scalars.insert(spec.remote_key().to_string(), value);
                        return Ok(());
                    }
                }
                if value.is_none() {
                    store.delete(&[spec.remote_key().to_string()]).await
                } else {
                    let raw = codec.encode(&value)?;
                    store.set(spec.remote_key(), raw).await
                }
            }
            FieldKind::Map { key, value: value_codec } => {
                let entries = match value {
                    Value::Map(entries) => entries,
                    Value::None => Vec::new(),
                    other => {
                        return Err(Error::Serialization(format!(
                            "map field `{field}` cannot store a {} value",
                            other.kind_name()
                        )))
                    }
                };
                let mut encoded = BTreeMap::new();
                for (k, v) in &entries {
                    encoded.insert(key.encode(k)?, value_codec.encode(v)?);
                }
                {
                    let mut state = self.state();
                    if let Some(staging) = &mut state.staging {
                        staging.maps.insert(spec.remote_key().to_string(), encoded);
                        return Ok(());
                    }
                }
                replace_hash(store, spec.remote_key(), encoded).await
            }
        }
    }

    /// Returns a live view over a map field's remote hash.
    ///
    /// The view binds the record's current attach generation: using it after
    /// a session buffer was attached later fails with
    /// [`Error::StaleView`](crate::Error::StaleView).
    pub fn map_view(&self, field: &str) -> Result<MapView> {
        let spec = self.inner.schema.field(field)?;
        if !spec.is_map() {
            return Err(Error::NotAMapField(field.to_string()));
        }
        let generation = self.state().generation;
        Ok(MapView::new(self.clone(), field.to_string(), generation))
    }

    /// Reads every field in declaration order: one MGET for scalars plus one
    /// HGETALL per map field, or the staged values while a session is open.
    pub async fn read_all<S: RemoteStore>(&self, store: &S) -> Result<Vec<(String, Value)>> {
        let staged = self.state().staging.clone();
        if let Some(staging) = staged {
            let mut out = Vec::new();
            for spec in self.inner.schema.fields() {
                let value = match spec.kind() {
                    FieldKind::Scalar(_) => staging
                        .scalars
                        .get(spec.remote_key())
                        .cloned()
                        .unwrap_or_else(|| spec.default_value().clone()),
                    FieldKind::Map { key, value } => {
                        Value::Map(decode_map(staging.maps.get(spec.remote_key()), key, value)?)
                    }
                };
                out.push((spec.name().to_string(), value));
            }
            return Ok(out);
        }

        let scalars = self.fetch_scalars(store).await?;
        let mut out = Vec::new();
        for spec in self.inner.schema.fields() {
            let value = match spec.kind() {
                FieldKind::Scalar(_) => scalars[spec.remote_key()].clone(),
                FieldKind::Map { key, value } => {
                    let entries: BTreeMap<Vec<u8>, Vec<u8>> =
                        store.hgetall(spec.remote_key()).await?.into_iter().collect();
                    Value::Map(decode_map(Some(&entries), key, value)?)
                }
            };
            out.push((spec.name().to_string(), value));
        }
        Ok(out)
    }

    /// One batched MGET over every scalar field, decoded with defaults for
    /// absent keys.
    async fn fetch_scalars<S: RemoteStore>(&self, store: &S) -> Result<HashMap<String, Value>> {
        let specs: Vec<_> = self.inner.schema.fields().filter(|f| !f.is_map()).collect();
        let keys: Vec<String> = specs.iter().map(|f| f.remote_key().to_string()).collect();
        let raws = store.mget(&keys).await?;
        let mut scalars = HashMap::with_capacity(specs.len());
        for (spec, raw) in specs.iter().zip(raws) {
            let value = match (raw, spec.kind()) {
                (Some(raw), FieldKind::Scalar(codec)) => codec.decode(&raw)?,
                _ => spec.default_value().clone(),
            };
            scalars.insert(spec.remote_key().to_string(), value);
        }
        Ok(scalars)
    }

    /// Populates and attaches the staging buffer: one MGET for scalars, one
    /// HGETALL per map field. Sessions are not reentrant; attaching while a
    /// buffer exists fails.
    pub(crate) async fn attach_staging<S: RemoteStore>(&self, store: &S) -> Result<()> {
        if self.state().staging.is_some() {
            return Err(Error::SessionActive);
        }
        let scalars = self.fetch_scalars(store).await?;
        let mut maps = HashMap::new();
        for spec in self.inner.schema.fields().filter(|f| f.is_map()) {
            let entries: BTreeMap<Vec<u8>, Vec<u8>> =
                store.hgetall(spec.remote_key()).await?.into_iter().collect();
            maps.insert(spec.remote_key().to_string(), entries);
        }
        let mut state = self.state();
        if state.staging.is_some() {
            return Err(Error::SessionActive);
        }
        state.generation += 1;
        state.staging = Some(Staging { scalars, maps });
        Ok(())
    }

    /// Writes the staging buffer back: whole-field replace per map field,
    /// then one MSET for non-null scalars and one DELETE for null ones.
    /// Values are encoded up front so a range error cannot leave a
    /// half-written batch. Does not detach.
    pub(crate) async fn flush_staging<S: RemoteStore>(&self, store: &S) -> Result<()> {
        let staging = match self.state().staging.clone() {
            Some(staging) => staging,
            None => return Ok(()),
        };
        let (pairs, deletes, hashes) = self.encode_staging(&staging)?;
        for (key, entries) in hashes {
            replace_hash(store, &key, entries).await?;
        }
        if !deletes.is_empty() {
            store.delete(&deletes).await?;
        }
        if !pairs.is_empty() {
            store.mset(pairs).await?;
        }
        Ok(())
    }

    /// Queues the staging buffer's writes on a buffered transaction handle,
    /// to be applied atomically by its `exec`.
    pub(crate) fn queue_staging<Tx: StoreTransaction>(&self, tx: &mut Tx) -> Result<()> {
        let staging = match self.state().staging.clone() {
            Some(staging) => staging,
            None => return Ok(()),
        };
        let (pairs, deletes, hashes) = self.encode_staging(&staging)?;
        for (key, entries) in hashes {
            tx.queue_delete(vec![key.clone()]);
            if !entries.is_empty() {
                tx.queue_hset_all(key, entries.into_iter().collect());
            }
        }
        if !deletes.is_empty() {
            tx.queue_delete(deletes);
        }
        if !pairs.is_empty() {
            tx.queue_mset(pairs);
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn encode_staging(
        &self,
        staging: &Staging,
    ) -> Result<(
        Vec<(String, Vec<u8>)>,
        Vec<String>,
        Vec<(String, BTreeMap<Vec<u8>, Vec<u8>>)>,
    )> {
        let mut pairs = Vec::new();
        let mut deletes = Vec::new();
        let mut hashes = Vec::new();
        for spec in self.inner.schema.fields() {
            match spec.kind() {
                FieldKind::Scalar(codec) => {
                    let value = staging
                        .scalars
                        .get(spec.remote_key())
                        .cloned()
                        .unwrap_or(Value::None);
                    if value.is_none() {
                        deletes.push(spec.remote_key().to_string());
                    } else {
                        pairs.push((spec.remote_key().to_string(), codec.encode(&value)?));
                    }
                }
                FieldKind::Map { .. } => {
                    if let Some(entries) = staging.maps.get(spec.remote_key()) {
                        hashes.push((spec.remote_key().to_string(), entries.clone()));
                    }
                }
            }
        }
        Ok((pairs, deletes, hashes))
    }

    pub(crate) fn discard_staging(&self) {
        self.state().staging = None;
    }
}

pub(crate) fn decode_map(
    entries: Option<&BTreeMap<Vec<u8>, Vec<u8>>>,
    key_codec: &Codec,
    value_codec: &Codec,
) -> Result<Vec<(Value, Value)>> {
    let mut decoded = Vec::new();
    if let Some(entries) = entries {
        for (k, v) in entries {
            decoded.push((key_codec.decode(k)?, value_codec.decode(v)?));
        }
    }
    Ok(decoded)
}

/// Whole-field replace: delete the hash, then bulk-set the new entries. An
/// empty new value leaves the hash deleted rather than a dangling partial
/// hash.
pub(crate) async fn replace_hash<S: RemoteStore>(
    store: &S,
    key: &str,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
) -> Result<()> {
    store.delete(&[key.to_string()]).await?;
    if !entries.is_empty() {
        store.hset_all(key, entries.into_iter().collect()).await?;
    }
    Ok(())
}
