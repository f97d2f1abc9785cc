//! Column descriptors and header transliteration.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::types::ColumnKind;

/// Inventory entry for one column of an uploaded file.
///
/// Derived from a bounded sample, so `cardinality` is exact only for files
/// that fit in the sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Header exactly as it appears in the file.
    pub name: String,
    /// Label to show to users.
    pub display: String,
    /// ASCII-only transliteration of the header.
    pub safe_name: String,
    /// Measurable vs non-measurable.
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    /// Whether the sampled values are all numeric.
    pub is_numeric: bool,
    /// Distinct non-null values in the sample.
    #[serde(rename = "n_unique")]
    pub cardinality: usize,
}

impl ColumnDescriptor {
    /// Build a descriptor from a header and its sampled classification.
    pub fn new(name: impl Into<String>, is_numeric: bool, cardinality: usize) -> Self {
        let name = name.into();
        Self {
            display: name.clone(),
            safe_name: safe_name(&name),
            kind: ColumnKind::from_numeric(is_numeric),
            is_numeric,
            cardinality,
            name,
        }
    }
}

/// ASCII transliteration of a header.
///
/// Letters with a stroke or ligature (which have no Unicode decomposition)
/// are folded first, then the text is NFKD-normalized and every non-ASCII
/// code point is dropped: `"Płeć"` becomes `"Plec"`.
pub fn safe_name(header: &str) -> String {
    let mut folded = String::with_capacity(header.len());
    for c in header.chars() {
        match fold_undecomposable(c) {
            Some(replacement) => folded.push_str(replacement),
            None => folded.push(c),
        }
    }
    folded.nfkd().filter(char::is_ascii).collect()
}

fn fold_undecomposable(c: char) -> Option<&'static str> {
    let replacement = match c {
        'ł' => "l",
        'Ł' => "L",
        'đ' => "d",
        'Đ' => "D",
        'ð' => "d",
        'Ð' => "D",
        'ø' => "o",
        'Ø' => "O",
        'ħ' => "h",
        'Ħ' => "H",
        'ı' => "i",
        'ŧ' => "t",
        'Ŧ' => "T",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'þ' => "th",
        'Þ' => "Th",
        _ => return None,
    };
    Some(replacement)
}
