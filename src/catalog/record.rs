//! Catalog record types.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// Coarse media classification by file extension, case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv"];

impl MediaType {
    pub fn from_file_name(name: &str) -> Self {
        let ext = match Path::new(name).extension() {
            Some(ext) => ext.to_string_lossy().to_lowercase(),
            None => return MediaType::Unknown,
        };
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaType::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaType::Video
        } else {
            MediaType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            _ => MediaType::Unknown,
        }
    }
}

/// A cataloged (or about-to-be-cataloged) file.
///
/// `id` is assigned by the catalog on register and never changes afterwards.
/// `name` holds the destination filename, which may differ from the source
/// name after collision resolution. `save_to` is the `YYYY/MM` partition the
/// file lives under in the destination tree.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub name: String,
    pub path: String,
    pub size: i64,
    pub hash: String,
    pub created_at: NaiveDateTime,
    pub modified_at: NaiveDateTime,
    pub file_type: MediaType,
    pub captured_at: Option<NaiveDateTime>,
    pub save_to: String,
}

impl FileRecord {
    /// Build an uncataloged record. Fails if `name` or `path` is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        path: String,
        size: i64,
        hash: String,
        created_at: NaiveDateTime,
        modified_at: NaiveDateTime,
        file_type: MediaType,
        captured_at: Option<NaiveDateTime>,
        save_to: String,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(IngestError::InvalidRecord("name"));
        }
        if path.is_empty() {
            return Err(IngestError::InvalidRecord("path"));
        }
        Ok(Self {
            id: None,
            name,
            path,
            size,
            hash,
            created_at,
            modified_at,
            file_type,
            captured_at,
            save_to,
        })
    }

    /// Absolute location of the file this record was extracted from.
    pub fn full_name(&self) -> PathBuf {
        Path::new(&self.path).join(&self.name)
    }
}
