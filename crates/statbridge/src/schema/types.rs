//! Core type definitions for column classification.

use serde::{Deserialize, Serialize};

/// Scalar type of a single cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Whole numbers (no decimal point).
    Integer,
    /// Floating-point numbers.
    Float,
    /// Anything else.
    String,
}

impl ValueType {
    /// Detect the type of a single non-null value.
    pub fn of(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.parse::<i64>().is_ok() {
            ValueType::Integer
        } else if is_float_literal(trimmed) {
            ValueType::Float
        } else {
            ValueType::String
        }
    }

    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }
}

/// `f64::from_str` also accepts `inf` and `nan`; a data file spelling those
/// words is carrying text, not numbers.
fn is_float_literal(value: &str) -> bool {
    value.parse::<f64>().is_ok()
        && value
            .chars()
            .any(|c| c.is_ascii_digit())
}

/// Whether a column can be measured on a numeric scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    /// Numeric-typed column.
    Measurable,
    /// Everything else.
    NonMeasurable,
}

impl ColumnKind {
    /// Kind for a numeric flag.
    pub fn from_numeric(is_numeric: bool) -> Self {
        if is_numeric {
            ColumnKind::Measurable
        } else {
            ColumnKind::NonMeasurable
        }
    }
}
