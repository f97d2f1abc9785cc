//! Structure inference: column catalogs and header probes.

mod catalog;
mod header;
mod parse;

pub use catalog::{
    count_rows, CatalogBuilder, CatalogConfig, FALLBACK_ENCODINGS, UNKNOWN_ENCODING,
};
pub use header::{read_header, read_header_from_bytes, HeaderProbe};
