//! photark — collects photos and videos scattered across a source tree
//! into a date-partitioned destination tree, deduplicated by content, with
//! provenance recorded in a SQLite catalog.
//!
//! The two entry points a caller invokes in sequence are
//! [`engine::Ingester::reconcile`] (backfill the catalog for files already
//! at the destination) and [`engine::Ingester::ingest`] (copy new unique
//! files in).

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod partition;
pub mod scanner;

pub use catalog::{CatalogStore, FileRecord, MediaType};
pub use config::Config;
pub use engine::{EngineOptions, IngestOutcome, IngestProgress, Ingester, ReconcileOutcome};
pub use error::IngestError;
