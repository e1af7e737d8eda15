//! Destination path policy.
//!
//! Files land under a `YYYY/MM` partition derived from the best-known
//! timestamp: the embedded capture time when one was extracted, otherwise
//! the filesystem modification time.

use chrono::{Datelike, NaiveDateTime};

use crate::catalog::FileRecord;

/// Partition for an extracted record.
pub fn partition_for(record: &FileRecord) -> String {
    for_timestamps(record.captured_at.as_ref(), &record.modified_at)
}

/// Pure form used before a record exists.
pub fn for_timestamps(captured_at: Option<&NaiveDateTime>, modified_at: &NaiveDateTime) -> String {
    let ts = captured_at.unwrap_or(modified_at);
    format!("{:04}/{:02}", ts.year(), ts.month())
}
