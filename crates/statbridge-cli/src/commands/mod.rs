//! CLI command implementations.

pub mod analyze;
pub mod columns;
pub mod inspect;
pub mod transcode;
pub mod upload;

use colored::Colorize;
use statbridge::ColumnCatalog;

/// Print a catalog as an aligned table.
pub(crate) fn print_catalog(catalog: &ColumnCatalog) {
    println!(
        "Encoding: {}  Delimiter: {}  Sampled rows: {}",
        catalog.used_encoding.white().bold(),
        format!("{:?}", catalog.delimiter).white().bold(),
        catalog.sampled_rows
    );
    println!();
    println!(
        "  {:>3}  {:24} {:24} {:12} {}",
        "#".dimmed(),
        "Column".yellow().bold(),
        "Safe name".yellow().bold(),
        "Kind".yellow().bold(),
        "Distinct".yellow().bold()
    );
    for (i, col) in catalog.columns.iter().enumerate() {
        let kind = format!("{:?}", col.kind);
        let kind = if col.is_numeric {
            kind.green()
        } else {
            kind.blue()
        };
        println!(
            "  {:>3}  {:24} {:24} {:12} {}",
            i + 1,
            col.display,
            col.safe_name.dimmed(),
            kind,
            col.cardinality
        );
    }
}
