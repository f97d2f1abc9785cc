//! Input handling: encodings, dialect detection, and dataset storage.

pub mod charset;
mod detect;
mod source;
mod store;

pub use charset::{guess_encoding, is_utf8_tag, normalize_encoding, Charset};
pub use detect::{
    delimiter_to_string, first_line_delimiter, guess_delimiter, parse_delimiter,
    sniff_delimiter, Detection, Detector, DetectorConfig, CANDIDATE_DELIMITERS,
    DEFAULT_DELIMITER,
};
pub(crate) use detect::{decode_sample, read_head};
pub use source::{DataTable, DatasetMetadata, UploadedDataset};
pub use store::DatasetStore;
