//! Column catalog building across an encoding cascade.

use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::parse::parse_table;
use crate::error::{Result, StatBridgeError};
use crate::input::{guess_delimiter, Charset, DataTable};
use crate::schema::{ColumnCatalog, ColumnDescriptor, ValueType};

/// Encoding reported when the catalog had to give up on encodings.
pub const UNKNOWN_ENCODING: &str = "unknown";

/// Encodings tried after the detected one, in order.
pub const FALLBACK_ENCODINGS: &[&str] = &["utf-8", "cp1250", "latin1", "iso-8859-2", "utf-16"];

/// Catalog builder configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Maximum data rows sampled per column.
    pub sample_rows: usize,
    /// Encodings tried after the detected one.
    pub fallback_encodings: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sample_rows: 1000,
            fallback_encodings: FALLBACK_ENCODINGS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Builds a [`ColumnCatalog`] from a file of uncertain encoding.
pub struct CatalogBuilder {
    config: CatalogConfig,
}

impl CatalogBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: CatalogConfig::default(),
        }
    }

    /// Create a builder with custom configuration.
    pub fn with_config(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// Encoding candidates: the detected one first, then the fallbacks, no repeats.
    pub fn candidates(&self, detected: Option<&str>) -> Vec<String> {
        encoding_candidates(detected, &self.config.fallback_encodings)
    }

    /// Read a file and build its catalog.
    pub fn build(
        &self,
        path: impl AsRef<Path>,
        detected_encoding: Option<&str>,
        delimiter: u8,
    ) -> Result<ColumnCatalog> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| StatBridgeError::io(path, e))?;
        self.build_from_bytes(&bytes, detected_encoding, delimiter)
    }

    /// Build a catalog from raw file bytes.
    ///
    /// Each candidate encoding is tried with the given delimiter; the first
    /// one that decodes and parses wins. If none does, a last parse decodes
    /// lossily and infers the delimiter itself.
    pub fn build_from_bytes(
        &self,
        bytes: &[u8],
        detected_encoding: Option<&str>,
        delimiter: u8,
    ) -> Result<ColumnCatalog> {
        let candidates = self.candidates(detected_encoding);
        let mut last_error = String::from("no encoding candidates");

        for encoding in &candidates {
            match parse_with_encoding(bytes, encoding, delimiter, self.config.sample_rows) {
                Ok(table) => {
                    debug!(encoding = %encoding, columns = table.column_count(), "catalog parsed");
                    return Ok(catalog_from_table(&table, encoding));
                }
                Err(message) => {
                    debug!(encoding = %encoding, error = %message, "catalog candidate failed");
                    last_error = message;
                }
            }
        }

        let text = String::from_utf8_lossy(bytes);
        let inferred = guess_delimiter(&text);
        match parse_table(&text, inferred, self.config.sample_rows) {
            Ok(table) => {
                warn!(
                    tried = ?candidates,
                    "no encoding candidate parsed, cataloguing with inferred dialect"
                );
                Ok(catalog_from_table(&table, UNKNOWN_ENCODING))
            }
            Err(_) => Err(StatBridgeError::HeaderRead {
                attempted: candidates,
                message: last_error,
            }),
        }
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered, de-duplicated encoding candidates.
pub(crate) fn encoding_candidates(detected: Option<&str>, fallbacks: &[String]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    if let Some(encoding) = detected.filter(|e| !e.trim().is_empty()) {
        seen.insert(encoding.to_string());
    }
    for encoding in fallbacks {
        seen.insert(encoding.clone());
    }
    seen.into_iter().collect()
}

/// Strictly decode with one encoding and parse. Errors are reported as text
/// because they only ever feed the cascade's last-failure message.
pub(crate) fn parse_with_encoding(
    bytes: &[u8],
    encoding: &str,
    delimiter: u8,
    max_rows: usize,
) -> std::result::Result<DataTable, String> {
    let charset =
        Charset::from_tag(encoding).ok_or_else(|| format!("unknown encoding: {}", encoding))?;
    let text = charset
        .decode_strict(bytes)
        .ok_or_else(|| format!("'{}' codec can't decode the file", encoding))?;
    parse_table(&text, delimiter, max_rows).map_err(|e| e.to_string())
}

fn catalog_from_table(table: &DataTable, encoding: &str) -> ColumnCatalog {
    let columns = (0..table.column_count())
        .map(|index| describe_column(table, index))
        .collect();

    ColumnCatalog {
        columns,
        used_encoding: encoding.to_string(),
        delimiter: table.delimiter as char,
        sampled_rows: table.row_count(),
    }
}

/// Classify one sampled column.
///
/// A column is numeric when the sample has rows and every non-null value
/// parses as a number. Cardinality counts distinct non-null values.
fn describe_column(table: &DataTable, index: usize) -> ColumnDescriptor {
    let name = table.headers[index].clone();

    let non_null: Vec<&str> = table
        .column_values(index)
        .filter(|v| !DataTable::is_null_value(v))
        .collect();

    let is_numeric =
        table.row_count() > 0 && non_null.iter().all(|v| ValueType::of(v).is_numeric());

    let distinct: IndexSet<&str> = non_null.iter().map(|v| v.trim()).collect();

    ColumnDescriptor::new(name, is_numeric, distinct.len())
}

/// Count all data rows of a file with a known dialect.
///
/// Returns `None` when the file cannot be decoded or parsed that way.
pub fn count_rows(path: impl AsRef<Path>, encoding: &str, delimiter: u8) -> Option<usize> {
    let bytes = fs::read(path.as_ref()).ok()?;
    let text = Charset::from_tag(encoding)?.decode_strict(&bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut count = 0;
    for record in reader.records() {
        record.ok()?;
        count += 1;
    }
    Some(count)
}
