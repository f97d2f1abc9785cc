//! Engine session: the loaded-script lifecycle and call construction.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::provider::{EngineArg, EngineFailure, EngineOutput, StatEngine};
use crate::error::{Result, StatBridgeError};
use crate::resolve::ColumnReference;

/// Optional parameter carrying the file encoding.
pub const ENCODING_PARAM: &str = "encoding";
/// Optional parameter carrying the field delimiter.
pub const DELIMITER_PARAM: &str = "delimiter";

/// The parameters the engine's function declares, as last introspected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCallSpec {
    /// Declared parameter names in declaration order.
    pub params: Vec<String>,
}

impl EngineCallSpec {
    /// Spec from introspected parameter names.
    pub fn new(params: Vec<String>) -> Self {
        Self { params }
    }

    /// Whether the function takes an `encoding` parameter.
    pub fn accepts_encoding(&self) -> bool {
        self.declares(ENCODING_PARAM)
    }

    /// Whether the function takes a `delimiter` parameter.
    pub fn accepts_delimiter(&self) -> bool {
        self.declares(DELIMITER_PARAM)
    }

    fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    /// Positional arguments for one call.
    ///
    /// `(path, x, y, plots_dir)` always; `encoding` then `delimiter` only
    /// when declared.
    pub fn build_args(&self, call: &CallArgs<'_>) -> Vec<EngineArg> {
        let mut args = vec![
            EngineArg::path(call.path),
            EngineArg::Column(call.x.clone()),
            EngineArg::Column(call.y.clone()),
            EngineArg::path(call.plots_dir),
        ];
        if self.accepts_encoding() {
            args.push(EngineArg::optional(call.encoding));
        }
        if self.accepts_delimiter() {
            args.push(EngineArg::optional(call.delimiter));
        }
        args
    }
}

/// Inputs to one engine call, before the spec shapes them.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    pub path: &'a Path,
    pub x: &'a ColumnReference,
    pub y: &'a ColumnReference,
    pub plots_dir: &'a Path,
    pub encoding: Option<&'a str>,
    pub delimiter: Option<&'a str>,
}

#[derive(Debug, Clone)]
enum SessionState {
    Unloaded,
    Loaded {
        stamp: Option<SystemTime>,
        spec: EngineCallSpec,
    },
}

/// Owns an engine and its loaded state.
///
/// `Unloaded -> Loaded(stamp)`; a reload happens on first use, when forced,
/// or when the engine's source stamp differs from the one recorded at load.
/// An engine without a stamp is reloaded every time it is checked.
pub struct EngineSession {
    engine: Box<dyn StatEngine>,
    state: SessionState,
    loads: usize,
}

impl EngineSession {
    /// Wrap an engine; nothing is loaded yet.
    pub fn new(engine: Box<dyn StatEngine>) -> Self {
        Self {
            engine,
            state: SessionState::Unloaded,
            loads: 0,
        }
    }

    /// Name of the wrapped engine.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Whether a spec is cached.
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SessionState::Loaded { .. })
    }

    /// Number of loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    /// The cached spec, if loaded.
    pub fn spec(&self) -> Option<&EngineCallSpec> {
        match &self.state {
            SessionState::Loaded { spec, .. } => Some(spec),
            SessionState::Unloaded => None,
        }
    }

    fn needs_reload(&self, force: bool) -> bool {
        match &self.state {
            SessionState::Unloaded => true,
            SessionState::Loaded { stamp, .. } => {
                if force {
                    return true;
                }
                match (stamp, self.engine.source_stamp()) {
                    (Some(loaded), Some(current)) => *loaded != current,
                    _ => true,
                }
            }
        }
    }

    /// Make sure the engine is loaded and return its call spec.
    pub fn ensure_loaded(&mut self, force: bool) -> Result<&EngineCallSpec> {
        if self.needs_reload(force) {
            let stamp = self.engine.source_stamp();
            let params = self
                .engine
                .load()
                .map_err(|failure| {
                    self.state = SessionState::Unloaded;
                    StatBridgeError::EngineLoad(failure.message)
                })?;

            self.loads += 1;
            if force {
                info!(engine = self.engine.name(), params = ?params, "engine reloaded");
            } else {
                debug!(engine = self.engine.name(), params = ?params, "engine loaded");
            }
            self.state = SessionState::Loaded {
                stamp,
                spec: EngineCallSpec::new(params),
            };
        }

        self.spec()
            .ok_or_else(|| StatBridgeError::EngineLoad("engine not loaded".to_string()))
    }

    /// Forget the loaded state.
    pub fn unload(&mut self) {
        self.state = SessionState::Unloaded;
    }

    /// Call the engine with already-built arguments.
    pub fn call(
        &mut self,
        args: &[EngineArg],
        timeout: Duration,
    ) -> std::result::Result<EngineOutput, EngineFailure> {
        self.engine.call(args, timeout)
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("loads", &self.loads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::resolve::MatchRule;
    use std::path::PathBuf;

    fn column(name: &str, position: usize) -> ColumnReference {
        ColumnReference {
            name: name.to_string(),
            position: Some(position),
            matched_by: MatchRule::Exact,
        }
    }

    #[test]
    fn test_build_args_only_declared_optionals() {
        let x = column("Wiek", 1);
        let y = column("Płeć", 2);
        let path = PathBuf::from("/data/a.csv");
        let plots = PathBuf::from("/data/plots");
        let call = CallArgs {
            path: &path,
            x: &x,
            y: &y,
            plots_dir: &plots,
            encoding: Some("UTF-8"),
            delimiter: Some(","),
        };

        let bare = EngineCallSpec::new(vec!["csv".into(), "x".into(), "y".into(), "plots_dir".into()]);
        assert_eq!(bare.build_args(&call).len(), 4);

        let delim_only = EngineCallSpec::new(vec!["csv".into(), "delimiter".into()]);
        let args = delim_only.build_args(&call);
        assert_eq!(args.len(), 5);
        assert_eq!(args[4].as_str(), Some(","));

        let both = EngineCallSpec::new(vec!["delimiter".into(), "encoding".into()]);
        let args = both.build_args(&call);
        assert_eq!(args[4].as_str(), Some("UTF-8"));
        assert_eq!(args[5].as_str(), Some(","));
        assert_eq!(args[1], EngineArg::Column(x));
    }

    #[test]
    fn test_absent_optional_is_null() {
        let x = column("a", 1);
        let path = PathBuf::from("a.csv");
        let call = CallArgs {
            path: &path,
            x: &x,
            y: &x,
            plots_dir: &path,
            encoding: None,
            delimiter: None,
        };
        let spec = EngineCallSpec::new(vec!["encoding".into()]);
        assert_eq!(spec.build_args(&call)[4], EngineArg::Null);
    }

    #[test]
    fn test_load_once_then_cached() {
        let engine = MockEngine::new().with_params(&["csv", "x", "y", "plots_dir", "encoding"]);
        let mut session = EngineSession::new(Box::new(engine));
        assert!(!session.is_loaded());

        assert!(session.ensure_loaded(false).unwrap().accepts_encoding());
        session.ensure_loaded(false).unwrap();
        assert_eq!(session.load_count(), 1);

        session.ensure_loaded(true).unwrap();
        assert_eq!(session.load_count(), 2);
    }

    #[test]
    fn test_stamp_change_reloads() {
        let engine = MockEngine::new();
        let stamp = engine.stamp_handle();
        let mut session = EngineSession::new(Box::new(engine));

        session.ensure_loaded(false).unwrap();
        stamp.touch();
        session.ensure_loaded(false).unwrap();
        assert_eq!(session.load_count(), 2);
    }

    #[test]
    fn test_load_failure_leaves_unloaded() {
        let engine = MockEngine::new().failing_load("script not found");
        let mut session = EngineSession::new(Box::new(engine));
        let err = session.ensure_loaded(false).unwrap_err();
        assert!(matches!(err, StatBridgeError::EngineLoad(ref m) if m.contains("script not found")));
        assert!(!session.is_loaded());
    }
}
