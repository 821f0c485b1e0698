//! Typed records backed by a remote key-value store.
//!
//! `record-map` maps the declared fields of a flat record type onto keys and
//! hashes of a remote key-value backend: scalar fields each occupy one key,
//! map fields one hash, with fixed byte encodings per declared type. Grouped
//! mutation comes in two flavors: a pessimistic exclusive-lock session
//! ([`Record::with_lock`]) and an optimistic watch-based transaction session
//! ([`Record::with_transaction`]).
//!
//! # Features
//!
//! - Declarative schemas with per-field codecs and defaults
//! - Stale-schema detection and repair across runs
//! - Lock sessions with an optional zero-round-trip local-copy mode
//! - Optimistic transactions with conflict detection and retry helper
//! - Live map views over remote hashes
//!
//! # Example
//!
//! ```
//! use record_map::store::memory::MemoryStore;
//! use record_map::{LockOptions, RecordSchema, Registry, TypeDesc, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), record_map::Error> {
//!     let store = MemoryStore::new();
//!     let schema = RecordSchema::builder("jobs.Counter")
//!         .field("count", TypeDesc::INT, 0i64)
//!         .field(
//!             "tags",
//!             TypeDesc::map(TypeDesc::Str, TypeDesc::INT),
//!             Value::Map(Vec::new()),
//!         )
//!         .build()?;
//!
//!     let registry = Registry::new();
//!     let record = registry.open(&store, schema).await?;
//!
//!     record
//!         .with_lock(&store, LockOptions::local_copy(), || async {
//!             let count = record.get(&store, "count").await?.as_int().unwrap_or(0) + 1;
//!             record.set(&store, "count", count).await?;
//!             let tags = record.map_view("tags")?;
//!             tags.insert(&store, count.to_string(), count).await?;
//!             Ok::<(), record_map::Error>(())
//!         })
//!         .await?;
//!
//!     assert_eq!(record.get(&store, "count").await?, Value::Int(1));
//!     Ok(())
//! }
//! ```

mod codec;
mod error;
mod field;
mod lock;
mod proxy;
mod record;
mod schema;
mod transaction;
mod value;

pub mod store;

pub use codec::Codec;
pub use error::{Error, Result};
pub use field::FieldSpec;
pub use lock::{LockMode, LockOptions};
pub use proxy::MapView;
pub use record::{Record, Registry};
pub use schema::{RecordSchema, SchemaBuilder};
pub use transaction::SessionControl;
pub use value::{TypeDesc, Value};
