//! Per-file metadata extraction: stat data, streaming content hash,
//! media-type classification and (for images) the EXIF capture timestamp.

use chrono::{DateTime, Local, NaiveDateTime};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;

use crate::catalog::{FileRecord, MediaType};
use crate::error::{IngestError, Result};
use crate::partition;

const HASH_BLOCK_SIZE: usize = 8192;

/// Build an uncataloged [`FileRecord`] for `name` under `directory`.
///
/// Fails with [`IngestError::NotFound`] if the file vanished since it was
/// enumerated; callers treat that as a race with deletion and move on.
/// EXIF problems never surface: a missing or unparseable capture time just
/// leaves `captured_at` unset.
pub fn extract(directory: &Path, name: &str) -> Result<FileRecord> {
    let full_path = directory.join(name);

    let meta = std::fs::metadata(&full_path).map_err(|e| not_found_or_io(e, &full_path))?;
    let size = meta.len() as i64;
    let modified_at = to_naive(meta.modified()?);
    // Not every filesystem reports a birth time.
    let created_at = meta.created().map(to_naive).unwrap_or(modified_at);

    let hash = hash_file(&full_path)?;

    let file_type = MediaType::from_file_name(name);
    let captured_at = if file_type == MediaType::Image {
        read_capture_time(&full_path)
    } else {
        None
    };

    let save_to = partition::for_timestamps(captured_at.as_ref(), &modified_at);

    FileRecord::new(
        name.to_string(),
        directory.to_string_lossy().to_string(),
        size,
        hash,
        created_at,
        modified_at,
        file_type,
        captured_at,
        save_to,
    )
}

/// MD5 over the full byte stream, read in fixed-size blocks so large video
/// files are never held in memory whole.
fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| not_found_or_io(e, path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();

    let mut buffer = [0u8; HASH_BLOCK_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// EXIF `DateTimeOriginal`, or `None` on any open/parse failure.
fn read_capture_time(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    let raw = field.display_value().to_string();
    let parsed = parse_exif_datetime(raw.trim_matches('"'));
    if parsed.is_none() {
        trace!(path = %path.display(), value = %raw, "unparseable EXIF capture time");
    }
    parsed
}

/// EXIF datetimes arrive as `2019:04:17 11:44:37`; some writers (and
/// kamadak-exif's display form) use dashes instead.
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

fn to_naive(t: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(t).naive_local()
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> IngestError {
    if e.kind() == ErrorKind::NotFound {
        IngestError::NotFound(path.to_path_buf())
    } else {
        IngestError::Io(e)
    }
}
