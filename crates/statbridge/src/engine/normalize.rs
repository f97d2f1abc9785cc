//! Normalization of engine output into an [`AnalysisResult`].
//!
//! Conversion is total: every [`EngineValue`] shape has a JSON rendering,
//! and leaves JSON cannot represent (non-finite floats, opaque values)
//! become strings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::provider::{EngineOutput, EngineValue};

/// Engine-printed vector index, e.g. `[1] `.
static INDEX_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[\d+\]\s*").unwrap());

/// The normalized outcome of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Name of the test the engine chose; empty when it gave none.
    pub recommended_test: String,
    /// Whatever statistics the engine reported.
    pub stats: Value,
    /// Bare plot filename; empty when there is no plot.
    pub plot_path: String,
}

impl AnalysisResult {
    /// Whether the engine produced a plot.
    pub fn has_plot(&self) -> bool {
        !self.plot_path.is_empty()
    }
}

/// Normalize either output shape into the three result fields.
pub fn normalize_output(output: &EngineOutput) -> AnalysisResult {
    match output {
        EngineOutput::Value(value @ EngineValue::Named(_)) => AnalysisResult {
            recommended_test: clean_text(value.get("recommended_test")),
            stats: stats_json(value.get("stats")),
            plot_path: clean_text(value.get("plot_path")),
        },
        EngineOutput::Value(other) => AnalysisResult {
            recommended_test: String::new(),
            stats: to_json(other),
            plot_path: String::new(),
        },
        EngineOutput::Handle(handle) => AnalysisResult {
            recommended_test: clean_text(handle.field("recommended_test").as_ref()),
            stats: stats_json(handle.field("stats").as_ref()),
            plot_path: clean_text(handle.field("plot_path").as_ref()),
        },
    }
}

fn stats_json(value: Option<&EngineValue>) -> Value {
    match value {
        None | Some(EngineValue::Null) => Value::Object(Map::new()),
        Some(v) => to_json(v),
    }
}

/// Depth-first conversion of an engine value to JSON.
pub fn to_json(value: &EngineValue) -> Value {
    match value {
        EngineValue::Null => Value::Null,
        EngineValue::Bool(b) => Value::Bool(*b),
        EngineValue::Int(i) => Value::Number((*i).into()),
        EngineValue::Float(x) => match Number::from_f64(*x) {
            Some(n) => Value::Number(n),
            None => Value::String(x.to_string()),
        },
        EngineValue::Str(s) => Value::String(s.clone()),
        EngineValue::Opaque(s) => Value::String(s.clone()),
        EngineValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        EngineValue::Named(entries) => {
            let mut map = Map::new();
            for (index, (key, value)) in entries.iter().enumerate() {
                let key = key.clone().unwrap_or_else(|| (index + 1).to_string());
                map.insert(key, to_json(value));
            }
            Value::Object(map)
        }
    }
}

/// Reduce a scalar-ish value to clean text.
///
/// A one-element vector is unwrapped, an engine index prefix such as `[1]`
/// is removed, and one pair of surrounding quotes is stripped.
pub fn clean_text(value: Option<&EngineValue>) -> String {
    let raw = match value {
        None | Some(EngineValue::Null) => return String::new(),
        Some(EngineValue::List(items)) => match items.first() {
            Some(first) => return clean_text(Some(first)),
            None => return String::new(),
        },
        Some(EngineValue::Str(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    clean_printed(&raw)
}

/// Strip an index prefix and surrounding quotes from printed text.
pub fn clean_printed(raw: &str) -> String {
    let stripped = INDEX_PREFIX.replace(raw, "");
    let trimmed = stripped.trim();

    let quoted = trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')));
    if quoted {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}
