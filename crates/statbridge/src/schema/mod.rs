//! Schema types for representing a file's column structure.

mod column;
mod table;
mod types;

pub use column::{safe_name, ColumnDescriptor};
pub use table::ColumnCatalog;
pub use types::{ColumnKind, ValueType};
