//! Error taxonomy for the ingestion engine.
//!
//! Per-file failures (`NotFound`, `Io`, `CollisionExhausted`) are caught at
//! the per-file loop in the engine and the run continues. Catalog integrity
//! failures (`Duplicate`, `Sql`) abort the run; batches committed before
//! the failure stay durable.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The file vanished between enumeration and extraction.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// A record was constructed with a missing required field.
    #[error("file record is missing required field `{0}`")]
    InvalidRecord(&'static str),

    /// A catalog uniqueness constraint fired on register. The dedup and
    /// collision lookups should have prevented this, so it signals a logic
    /// error or a race and is never swallowed.
    #[error("catalog uniqueness violated registering `{name}` under `{save_to}`")]
    Duplicate { save_to: String, name: String },

    /// The collision probe gave up after the configured number of suffixes.
    #[error("no free destination name for `{name}` under `{save_to}` after {attempts} attempts")]
    CollisionExhausted {
        save_to: String,
        name: String,
        attempts: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl IngestError {
    /// Whether the engine may skip the current file and keep going, or must
    /// abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Duplicate { .. } | IngestError::Sql(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
