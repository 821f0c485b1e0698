//! Error types for record-map operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("write conflict: a watched key changed before commit")]
    Conflict,

    #[error("stale map view: a session buffer was attached after this view was created")]
    StaleView,

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("duplicate field `{0}`")]
    DuplicateField(String),

    #[error("field `{0}` is not a map field")]
    NotAMapField(String),

    #[error("map field `{0}` has no scalar value; read it through a map view or inside a session")]
    MapFieldRead(String),

    #[error("map types cannot be nested inside another container (field `{0}`)")]
    NestedContainer(String),

    #[error("invalid integer width {width} for field `{field}` (expected 1..=8 bytes)")]
    InvalidIntWidth { field: String, width: usize },

    #[error("a session is already active for this record")]
    SessionActive,

    #[error("store error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a backend error without altering it.
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Store(err.into())
    }

    /// True for commit failures that the caller can resolve by re-running
    /// the whole session body.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }
}
