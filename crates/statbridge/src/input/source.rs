//! Uploaded datasets and sampled table data.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detect::parse_delimiter;

/// Metadata recorded once, when a dataset is uploaded.
///
/// Encoding and delimiter reflect upload-time detection and are never
/// rewritten by later analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Opaque dataset identifier.
    pub file_id: String,
    /// Name of the file as the user supplied it.
    pub filename: String,
    /// Encoding tag detected at upload.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Delimiter detected at upload, as a one-character string.
    #[serde(default)]
    pub delimiter: Option<String>,
    /// When the upload happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    /// SHA-256 of the stored bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl DatasetMetadata {
    /// Metadata with only an id and filename; dialect unknown.
    pub fn new(file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            encoding: None,
            delimiter: None,
            uploaded_at: None,
            sha256: None,
        }
    }

    /// Stored delimiter as a byte, if present and well-formed.
    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.as_deref().and_then(parse_delimiter)
    }
}

/// A stored upload: its data file plus upload-time metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedDataset {
    /// Path of the stored data file.
    pub path: PathBuf,
    /// Upload-time metadata.
    pub metadata: DatasetMetadata,
}

impl UploadedDataset {
    /// Dataset identifier.
    pub fn id(&self) -> &str {
        &self.metadata.file_id
    }

    /// Detected encoding, if any.
    pub fn encoding(&self) -> Option<&str> {
        self.metadata.encoding.as_deref()
    }

    /// Detected delimiter, if any.
    pub fn delimiter(&self) -> Option<u8> {
        self.metadata.delimiter_byte()
    }
}

/// A bounded sample of parsed tabular data.
#[derive(Debug, Clone)]
pub struct DataTable {
    /// Column headers.
    pub headers: Vec<String>,
    /// Row data as strings (row-major order).
    pub rows: Vec<Vec<String>>,
    /// The delimiter used.
    pub delimiter: u8,
}

impl DataTable {
    /// Create a new data table.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, delimiter: u8) -> Self {
        Self {
            headers,
            rows,
            delimiter,
        }
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Get the number of rows (excluding header).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get all values for a column by index.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(|s| s.as_str()).unwrap_or(""))
    }

    /// Get a specific cell value.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(col).map(|s| s.as_str()))
    }

    /// Check if a value represents a missing/null value.
    pub fn is_null_value(value: &str) -> bool {
        let trimmed = value.trim();
        trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("na")
            || trimmed.eq_ignore_ascii_case("n/a")
            || trimmed.eq_ignore_ascii_case("#n/a")
            || trimmed.eq_ignore_ascii_case("nan")
            || trimmed.eq_ignore_ascii_case("-nan")
            || trimmed.eq_ignore_ascii_case("null")
            || trimmed.eq_ignore_ascii_case("none")
            || trimmed.eq_ignore_ascii_case("<na>")
    }
}
