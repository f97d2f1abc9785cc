//! Analysis bridge: one analysis request against the statistics engine.
//!
//! Non-canonical input is transcoded first. The engine is then called
//! once per encoding candidate until one succeeds:
//!
//! - a decoding failure moves on to the next candidate,
//! - a signature mismatch reloads the engine and retries the same
//!   candidate once,
//! - anything else aborts the request.
//!
//! The engine session sits behind a mutex held for the whole cascade, so
//! concurrent requests never interleave a reload with a call.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{
    classify_failure, normalize_output, AnalysisResult, CallArgs, EngineSession, FailureKind,
    StatEngine,
};
use crate::error::{Result, StatBridgeError};
use crate::input::{delimiter_to_string, is_utf8_tag};
use crate::resolve::ColumnReference;
use crate::transcode::{TranscodedCsv, Transcoder};

/// Encoding tag handed to the engine for canonical input.
pub const CANONICAL_ENCODING: &str = "UTF-8";

/// Encodings tried after the engine-facing one.
pub const ENGINE_FALLBACK_ENCODINGS: &[&str] = &["UTF-8", "cp1250", "latin1", "iso-8859-2"];

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Encodings tried after the engine-facing one.
    pub fallback_encodings: Vec<String>,
    /// Time budget of a single engine call.
    pub call_timeout: Duration,
    /// Directory the engine writes plots to; defaults to `<csv dir>/plots`.
    pub plots_dir: Option<PathBuf>,
    /// Where transcoded files are written; defaults to the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fallback_encodings: ENGINE_FALLBACK_ENCODINGS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            call_timeout: Duration::from_secs(60),
            plots_dir: None,
            temp_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Set the call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the plots directory.
    pub fn with_plots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plots_dir = Some(dir.into());
        self
    }

    /// Set the directory for transcoded files.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// One analysis request.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    /// The stored CSV file.
    pub path: PathBuf,
    /// First analysis column.
    pub x: ColumnReference,
    /// Second analysis column.
    pub y: ColumnReference,
    /// Encoding recorded for the file.
    pub encoding: Option<String>,
    /// Delimiter recorded for the file.
    pub delimiter: Option<u8>,
    /// Plots directory for this request only.
    pub plots_dir: Option<PathBuf>,
}

impl BridgeRequest {
    /// Request with no recorded dialect.
    pub fn new(path: impl Into<PathBuf>, x: ColumnReference, y: ColumnReference) -> Self {
        Self {
            path: path.into(),
            x,
            y,
            encoding: None,
            delimiter: None,
            plots_dir: None,
        }
    }

    /// Set the recorded encoding; blank tags count as absent.
    pub fn with_encoding(mut self, encoding: Option<&str>) -> Self {
        self.encoding = encoding
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        self
    }

    /// Set the recorded delimiter.
    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the plots directory for this request.
    pub fn with_plots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plots_dir = Some(dir.into());
        self
    }
}

/// A failed engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    /// Encoding passed on this attempt.
    pub encoding: String,
    /// How the failure was classified.
    pub kind: FailureKind,
    /// The engine's message.
    pub message: String,
}

/// A successful analysis with its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOutcome {
    /// The normalized result.
    pub result: AnalysisResult,
    /// Encoding passed on the successful call.
    pub used_encoding: String,
    /// Delimiter passed to the engine.
    pub used_delimiter: Option<String>,
    /// Calls that failed before the successful one.
    pub failed_attempts: Vec<FailedAttempt>,
    /// Source encoding when the input was transcoded.
    pub transcoded_from: Option<String>,
    /// Whether transcoding took a lossy decoding path.
    pub transcode_degraded: bool,
    /// Directory the engine was told to write plots to.
    pub plots_dir: PathBuf,
}

/// Whether input with this dialect must be transcoded before the engine sees it.
///
/// Absent values never trigger transcoding on their own.
pub fn needs_transcoding(encoding: Option<&str>, delimiter: Option<u8>) -> bool {
    delimiter.is_some_and(|d| d != b',') || encoding.is_some_and(|e| !is_utf8_tag(e))
}

/// Engine encoding candidates: `first` if present, then the fallbacks,
/// without case-insensitive repeats.
pub fn engine_candidates(first: Option<&str>, fallbacks: &[String]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut candidates = Vec::new();
    for encoding in first.into_iter().chain(fallbacks.iter().map(String::as_str)) {
        if seen.insert(encoding.to_lowercase()) {
            candidates.push(encoding.to_string());
        }
    }
    candidates
}

/// The file and dialect the engine will actually see.
struct EngineInput {
    path: PathBuf,
    encoding: Option<String>,
    delimiter: Option<String>,
    transcoded: Option<TranscodedCsv>,
}

/// Runs analysis requests against one engine.
pub struct AnalysisBridge {
    session: Mutex<EngineSession>,
    config: BridgeConfig,
}

impl AnalysisBridge {
    /// Bridge with default configuration.
    pub fn new(engine: impl StatEngine + 'static) -> Self {
        Self::with_config(engine, BridgeConfig::default())
    }

    /// Bridge with custom configuration.
    pub fn with_config(engine: impl StatEngine + 'static, config: BridgeConfig) -> Self {
        Self {
            session: Mutex::new(EngineSession::new(Box::new(engine))),
            config,
        }
    }

    /// The bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// How many times the engine has been loaded.
    pub fn load_count(&self) -> usize {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .load_count()
    }

    /// Run one analysis.
    pub fn run(&self, request: &BridgeRequest) -> Result<BridgeOutcome> {
        let plots_dir = self.plots_dir_for(request)?;
        let input = self.prepare(request);

        let candidates = engine_candidates(input.encoding.as_deref(), &self.config.fallback_encodings);
        let timeout = self.config.call_timeout;
        let mut failed_attempts = Vec::new();
        let mut last_error = String::new();

        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for candidate in &candidates {
            let mut reloaded = false;
            loop {
                let spec = session.ensure_loaded(false)?.clone();
                let args = spec.build_args(&CallArgs {
                    path: &input.path,
                    x: &request.x,
                    y: &request.y,
                    plots_dir: &plots_dir,
                    encoding: Some(candidate.as_str()),
                    delimiter: input.delimiter.as_deref(),
                });

                debug!(encoding = %candidate, args = args.len(), "calling engine");

                let failure = match session.call(&args, timeout) {
                    Ok(output) => {
                        let result = normalize_output(&output);
                        info!(
                            encoding = %candidate,
                            failed = failed_attempts.len(),
                            test = %result.recommended_test,
                            "analysis succeeded"
                        );
                        return Ok(BridgeOutcome {
                            result,
                            used_encoding: candidate.clone(),
                            used_delimiter: input.delimiter.clone(),
                            failed_attempts,
                            transcoded_from: input
                                .transcoded
                                .as_ref()
                                .map(|t| t.source_encoding.clone()),
                            transcode_degraded: input
                                .transcoded
                                .as_ref()
                                .is_some_and(TranscodedCsv::is_degraded),
                            plots_dir,
                        });
                    }
                    Err(failure) => failure,
                };

                if let Some(limit) = failure.timed_out_after {
                    warn!(encoding = %candidate, seconds = limit.as_secs(), "engine call timed out");
                    return Err(StatBridgeError::EngineTimeout {
                        seconds: limit.as_secs(),
                    });
                }

                let kind = classify_failure(&failure.message);
                warn!(encoding = %candidate, kind = ?kind, error = %failure.message, "engine call failed");
                failed_attempts.push(FailedAttempt {
                    encoding: candidate.clone(),
                    kind,
                    message: failure.message.clone(),
                });
                last_error = failure.message;

                match kind {
                    FailureKind::Decode => break,
                    FailureKind::SignatureMismatch if !reloaded => {
                        session.ensure_loaded(true)?;
                        reloaded = true;
                    }
                    FailureKind::SignatureMismatch => break,
                    FailureKind::Other => {
                        return Err(StatBridgeError::EngineAborted {
                            encoding: candidate.clone(),
                            message: last_error,
                        });
                    }
                }
            }
        }

        Err(StatBridgeError::EngineCall {
            attempted: candidates,
            last_error,
        })
    }

    fn plots_dir_for(&self, request: &BridgeRequest) -> Result<PathBuf> {
        let dir = request
            .plots_dir
            .clone()
            .or_else(|| self.config.plots_dir.clone())
            .unwrap_or_else(|| default_plots_dir(&request.path));
        fs::create_dir_all(&dir).map_err(|e| StatBridgeError::io(&dir, e))?;
        Ok(dir)
    }

    /// Decide what the engine sees, transcoding when the dialect is not canonical.
    ///
    /// A failed transcode falls back to the original file and dialect.
    fn prepare(&self, request: &BridgeRequest) -> EngineInput {
        let encoding = request.encoding.as_deref();

        if needs_transcoding(encoding, request.delimiter) {
            let transcoder = match &self.config.temp_dir {
                Some(dir) => Transcoder::in_dir(dir),
                None => Transcoder::new(),
            };
            match transcoder.transcode(&request.path, encoding, request.delimiter) {
                Ok(transcoded) => {
                    return EngineInput {
                        path: transcoded.path().to_path_buf(),
                        encoding: Some(CANONICAL_ENCODING.to_string()),
                        delimiter: Some(",".to_string()),
                        transcoded: Some(transcoded),
                    };
                }
                Err(e) => {
                    warn!(path = %request.path.display(), error = %e, "transcoding failed, passing the file as is")
                }
            }
        }

        EngineInput {
            path: request.path.clone(),
            encoding: encoding.map(|e| {
                if is_utf8_tag(e) {
                    CANONICAL_ENCODING.to_string()
                } else {
                    e.to_string()
                }
            }),
            delimiter: request.delimiter.map(delimiter_to_string),
            transcoded: None,
        }
    }
}

impl std::fmt::Debug for AnalysisBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `<directory of the CSV>/plots`.
pub fn default_plots_dir(csv_path: &Path) -> PathBuf {
    csv_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("plots")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_transcoding() {
        assert!(!needs_transcoding(None, None));
        assert!(!needs_transcoding(Some("utf-8"), Some(b',')));
        assert!(!needs_transcoding(Some("UTF8"), None));
        assert!(needs_transcoding(Some("cp1250"), Some(b',')));
        assert!(needs_transcoding(Some("utf-8"), Some(b';')));
        assert!(needs_transcoding(None, Some(b'\t')));
        assert!(needs_transcoding(Some("utf-8-sig"), None));
    }

    #[test]
    fn test_engine_candidates() {
        let fallbacks: Vec<String> = ENGINE_FALLBACK_ENCODINGS.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            engine_candidates(None, &fallbacks),
            vec!["UTF-8", "cp1250", "latin1", "iso-8859-2"]
        );
        assert_eq!(
            engine_candidates(Some("UTF-8"), &fallbacks),
            vec!["UTF-8", "cp1250", "latin1", "iso-8859-2"]
        );
        assert_eq!(
            engine_candidates(Some("CP1250"), &fallbacks),
            vec!["CP1250", "UTF-8", "latin1", "iso-8859-2"]
        );
        assert_eq!(engine_candidates(Some("utf-16"), &fallbacks).len(), 5);
    }

    #[test]
    fn test_default_plots_dir() {
        assert_eq!(
            default_plots_dir(Path::new("/srv/uploads/a.csv")),
            PathBuf::from("/srv/uploads/plots")
        );
    }

    #[test]
    fn test_request_blank_encoding_is_absent() {
        let column = ColumnReference {
            name: "a".into(),
            position: Some(1),
            matched_by: crate::resolve::MatchRule::Exact,
        };
        let request = BridgeRequest::new("a.csv", column.clone(), column).with_encoding(Some("  "));
        assert!(request.encoding.is_none());
    }
}
