//! Statistics engine trait and the values crossing it.

use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::resolve::ColumnReference;

/// A positional argument passed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineArg {
    /// A plain string (paths, encoding and delimiter tags).
    Str(String),
    /// An integer.
    Int(i64),
    /// A resolved column.
    Column(ColumnReference),
    /// An absent optional argument.
    Null,
}

impl EngineArg {
    /// String argument from a path.
    pub fn path(path: &Path) -> Self {
        EngineArg::Str(path.to_string_lossy().into_owned())
    }

    /// String argument, or `Null` when absent.
    pub fn optional(value: Option<&str>) -> Self {
        match value {
            Some(v) => EngineArg::Str(v.to_string()),
            None => EngineArg::Null,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EngineArg::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A value produced by the engine.
///
/// Named entries keep their order; an entry without a name is addressed by
/// its 1-based index when converted.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<EngineValue>),
    Named(Vec<(Option<String>, EngineValue)>),
    /// Something with no structural counterpart, kept as its printed form.
    Opaque(String),
}

impl EngineValue {
    /// Look up a named entry.
    pub fn get(&self, name: &str) -> Option<&EngineValue> {
        match self {
            EngineValue::Named(entries) => entries
                .iter()
                .find(|(key, _)| key.as_deref() == Some(name))
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Build a mapping from `(name, value)` pairs.
    pub fn named<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, EngineValue)>,
        K: Into<String>,
    {
        EngineValue::Named(
            entries
                .into_iter()
                .map(|(k, v)| (Some(k.into()), v))
                .collect(),
        )
    }

    /// Convert parsed JSON into an engine value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => EngineValue::Null,
            Value::Bool(b) => EngineValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => EngineValue::Int(i),
                None => n
                    .as_f64()
                    .map(EngineValue::Float)
                    .unwrap_or_else(|| EngineValue::Opaque(n.to_string())),
            },
            Value::String(s) => EngineValue::Str(s),
            Value::Array(items) => {
                EngineValue::List(items.into_iter().map(EngineValue::from_json).collect())
            }
            Value::Object(map) => EngineValue::Named(
                map.into_iter()
                    .map(|(k, v)| (Some(k), EngineValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineValue::Null => write!(f, "NULL"),
            EngineValue::Bool(b) => write!(f, "{}", b),
            EngineValue::Int(i) => write!(f, "{}", i),
            EngineValue::Float(x) => write!(f, "{}", x),
            EngineValue::Str(s) => write!(f, "{}", s),
            EngineValue::Opaque(s) => write!(f, "{}", s),
            EngineValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            EngineValue::Named(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match key {
                        Some(key) => write!(f, "{}: {}", key, value)?,
                        None => write!(f, "{}: {}", i + 1, value)?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

/// A result that can only be read field by field.
pub trait ResultHandle: Send {
    /// Extract one field; `None` when the field is missing or unreadable.
    fn field(&self, name: &str) -> Option<EngineValue>;

    /// Printed form of the whole result.
    fn render(&self) -> String;
}

/// What an engine call returns.
pub enum EngineOutput {
    /// A structured value.
    Value(EngineValue),
    /// An opaque handle.
    Handle(Box<dyn ResultHandle>),
}

impl fmt::Debug for EngineOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineOutput::Value(v) => f.debug_tuple("Value").field(v).finish(),
            EngineOutput::Handle(h) => f.debug_tuple("Handle").field(&h.render()).finish(),
        }
    }
}

/// An engine failure, described only by its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// The engine's error text.
    pub message: String,
    /// Set when the call was killed after running out of time.
    pub timed_out_after: Option<Duration>,
}

impl EngineFailure {
    /// A failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out_after: None,
        }
    }

    /// A call that exceeded its time budget.
    pub fn timeout(limit: Duration) -> Self {
        Self {
            message: format!("call exceeded {}s", limit.as_secs()),
            timed_out_after: Some(limit),
        }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// An external statistics engine.
///
/// The engine exposes one analysis function taking
/// `(path, x, y, plots_dir, [encoding], [delimiter])`. Implementations are
/// driven through an [`EngineSession`](super::EngineSession), which owns
/// the loaded state.
pub trait StatEngine: Send {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Modification stamp of the engine's source, if it has one.
    fn source_stamp(&self) -> Option<SystemTime>;

    /// Load the engine and report the parameter names its function declares.
    fn load(&mut self) -> Result<Vec<String>, EngineFailure>;

    /// Invoke the analysis function.
    fn call(&mut self, args: &[EngineArg], timeout: Duration)
        -> Result<EngineOutput, EngineFailure>;
}
