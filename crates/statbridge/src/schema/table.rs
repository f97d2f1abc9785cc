//! Column inventory for a whole file.

use serde::{Deserialize, Serialize};

use super::column::ColumnDescriptor;

/// The column set of a file together with the dialect that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnCatalog {
    /// One descriptor per header, in file order.
    pub columns: Vec<ColumnDescriptor>,
    /// Encoding that parsed successfully (`unknown` after inference).
    pub used_encoding: String,
    /// Delimiter the columns were split on.
    pub delimiter: char,
    /// Data rows in the sample.
    pub sampled_rows: usize,
}

impl ColumnCatalog {
    /// Get a column by header.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get all headers in file order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns classified as measurable.
    pub fn measurable(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_numeric)
    }
}
