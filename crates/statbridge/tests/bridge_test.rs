//! Analysis bridge tests against a scripted engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use statbridge::engine::{EngineArg, EngineFailure, EngineOutput, MockEngine};
use statbridge::{
    AnalysisBridge, BridgeConfig, BridgeRequest, ColumnReference, FailureKind, MatchRule,
    RscriptConfig, RscriptEngine, StatBridgeError,
};

const DECODE_ERROR: &str = "invalid multibyte string, element 1";

fn column(name: &str, position: usize) -> ColumnReference {
    ColumnReference {
        name: name.to_string(),
        position: Some(position),
        matched_by: MatchRule::Exact,
    }
}

/// A UTF-8 comma file that needs no transcoding.
fn plain_csv(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("plain.csv");
    fs::write(&path, "x,y\n1,2\n3,4\n").expect("Failed to write CSV");
    path
}

fn request(path: &Path) -> BridgeRequest {
    BridgeRequest::new(path, column("x", 1), column("y", 2))
        .with_encoding(Some("utf-8"))
        .with_delimiter(Some(b','))
}

fn ok_output() -> Result<EngineOutput, EngineFailure> {
    Ok(EngineOutput::Value(MockEngine::sample_result()))
}

fn encoding_arg(args: &[EngineArg]) -> String {
    args[4].as_str().unwrap_or_default().to_string()
}

fn config(dir: &TempDir) -> BridgeConfig {
    BridgeConfig::default().with_temp_dir(dir.path())
}

// =============================================================================
// Retry cascade
// =============================================================================

#[test]
fn test_decode_errors_advance_to_third_candidate() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new().with_responder(|args| match encoding_arg(args).as_str() {
        "latin1" => ok_output(),
        _ => Err(EngineFailure::new(DECODE_ERROR)),
    });
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let outcome = bridge.run(&request(&path)).expect("Analysis failed");

    assert_eq!(outcome.used_encoding, "latin1");
    assert_eq!(outcome.failed_attempts.len(), 2);
    assert!(outcome
        .failed_attempts
        .iter()
        .all(|a| a.kind == FailureKind::Decode));
    assert_eq!(
        log.str_args(4),
        vec![
            Some("UTF-8".to_string()),
            Some("cp1250".to_string()),
            Some("latin1".to_string())
        ]
    );
    assert_eq!(outcome.result.recommended_test, "t_student");
    assert_eq!(outcome.result.plot_path, "plot_t_student.png");
}

#[test]
fn test_exhausted_candidates_report_all_four() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine =
        MockEngine::new().with_responder(|_| Err(EngineFailure::new("'utf-8' codec can't decode")));
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let err = bridge.run(&request(&path)).unwrap_err();
    match err {
        StatBridgeError::EngineCall {
            attempted,
            last_error,
        } => {
            assert_eq!(attempted, vec!["UTF-8", "cp1250", "latin1", "iso-8859-2"]);
            assert!(last_error.contains("can't decode"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.len(), 4);
}

#[test]
fn test_signature_mismatch_reloads_and_retries_same_candidate() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let engine = MockEngine::new().with_responder(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(EngineFailure::new("unused argument (delimiter = \",\")"))
        } else {
            ok_output()
        }
    });
    let log = engine.call_log();
    let loads = engine.load_counter();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let outcome = bridge.run(&request(&path)).expect("Analysis failed");

    assert_eq!(outcome.used_encoding, "UTF-8");
    assert_eq!(outcome.failed_attempts.len(), 1);
    assert_eq!(outcome.failed_attempts[0].kind, FailureKind::SignatureMismatch);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(
        log.str_args(4),
        vec![Some("UTF-8".to_string()), Some("UTF-8".to_string())]
    );
}

#[test]
fn test_repeated_mismatch_moves_on() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new().with_responder(|args| match encoding_arg(args).as_str() {
        "UTF-8" => Err(EngineFailure::new("formal argument \"x\" matched twice")),
        _ => ok_output(),
    });
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let outcome = bridge.run(&request(&path)).expect("Analysis failed");

    assert_eq!(outcome.used_encoding, "cp1250");
    assert_eq!(outcome.failed_attempts.len(), 2);
    assert_eq!(log.len(), 3);
    assert_eq!(bridge.load_count(), 2);
}

#[test]
fn test_other_failure_aborts() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new()
        .with_responder(|_| Err(EngineFailure::new("not enough observations")));
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let err = bridge.run(&request(&path)).unwrap_err();
    match err {
        StatBridgeError::EngineAborted { encoding, message } => {
            assert_eq!(encoding, "UTF-8");
            assert_eq!(message, "not enough observations");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(log.len(), 1);
}

#[test]
fn test_timeout_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new()
        .with_responder(|_| Err(EngineFailure::timeout(Duration::from_secs(60))));
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let err = bridge.run(&request(&path)).unwrap_err();
    assert!(matches!(err, StatBridgeError::EngineTimeout { seconds: 60 }));
    assert_eq!(log.len(), 1);
}

#[test]
fn test_load_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let bridge = AnalysisBridge::with_config(
        MockEngine::new().failing_load("could not find function \"run_analysis\""),
        config(&dir),
    );
    let err = bridge.run(&request(&path)).unwrap_err();
    assert!(matches!(err, StatBridgeError::EngineLoad(_)));
}

// =============================================================================
// Call construction
// =============================================================================

#[test]
fn test_undeclared_optionals_are_not_passed() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new().with_params(&["csv_path", "x", "y", "plots_dir"]);
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    bridge.run(&request(&path)).expect("Analysis failed");

    let calls = log.calls();
    assert_eq!(calls[0].len(), 4);
    assert_eq!(calls[0][1], EngineArg::Column(column("x", 1)));
    assert_eq!(calls[0][2], EngineArg::Column(column("y", 2)));
}

#[test]
fn test_utf8_spelling_is_canonicalized_without_transcoding() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new();
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let outcome = bridge
        .run(&request(&path).with_encoding(Some("utf8")))
        .expect("Analysis failed");

    let calls = log.calls();
    let passed = path.to_string_lossy().into_owned();
    assert_eq!(calls[0][0].as_str(), Some(passed.as_str()));
    assert_eq!(calls[0][4].as_str(), Some("UTF-8"));
    assert_eq!(calls[0][5].as_str(), Some(","));
    assert!(outcome.transcoded_from.is_none());
}

#[test]
fn test_absent_dialect_passes_null() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new();
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let req = BridgeRequest::new(&path, column("x", 1), column("y", 2));
    let outcome = bridge.run(&req).expect("Analysis failed");

    let calls = log.calls();
    let passed = path.to_string_lossy().into_owned();
    assert_eq!(calls[0][0].as_str(), Some(passed.as_str()));
    assert_eq!(calls[0][4].as_str(), Some("UTF-8"));
    assert_eq!(calls[0][5], EngineArg::Null);
    assert!(outcome.used_delimiter.is_none());
}

#[test]
fn test_non_canonical_input_is_transcoded_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ankieta.csv");
    let bytes = encoding_rs::WINDOWS_1250
        .encode("Wiek;Płeć\n25;Kobieta\n31;Mężczyzna\n")
        .0
        .into_owned();
    fs::write(&path, bytes).unwrap();

    let seen: Arc<Mutex<Option<(PathBuf, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let engine = MockEngine::new().with_responder(move |args| {
        let passed = PathBuf::from(args[0].as_str().unwrap_or_default());
        let content = fs::read(&passed).map_err(|e| EngineFailure::new(e.to_string()))?;
        *sink.lock().unwrap() = Some((passed, content));
        ok_output()
    });
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let req = BridgeRequest::new(&path, column("Wiek", 1), column("Płeć", 2))
        .with_encoding(Some("cp1250"))
        .with_delimiter(Some(b';'));
    let outcome = bridge.run(&req).expect("Analysis failed");

    assert_eq!(outcome.transcoded_from.as_deref(), Some("cp1250"));
    assert!(!outcome.transcode_degraded);
    assert_eq!(outcome.used_delimiter.as_deref(), Some(","));
    assert_eq!(log.str_args(4), vec![Some("UTF-8".to_string())]);
    assert_eq!(log.str_args(5), vec![Some(",".to_string())]);

    let (passed, content) = seen.lock().unwrap().clone().expect("engine was not called");
    assert_ne!(passed, path);
    assert_eq!(
        content,
        "\u{feff}Wiek,Płeć\n25,Kobieta\n31,Mężczyzna\n".as_bytes()
    );
    assert!(!passed.exists(), "transcoded file should be removed");
}

#[test]
fn test_transcoded_file_removed_after_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("semi.csv");
    fs::write(&path, "a;b\n1;2\n").unwrap();

    let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let engine = MockEngine::new().with_responder(move |args| {
        sink.lock()
            .unwrap()
            .push(PathBuf::from(args[0].as_str().unwrap_or_default()));
        Err(EngineFailure::new("object 'b' not found"))
    });
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let req = BridgeRequest::new(&path, column("a", 1), column("b", 2)).with_delimiter(Some(b';'));
    assert!(bridge.run(&req).is_err());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].exists());
}

#[test]
fn test_default_plots_dir_is_created_next_to_csv() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new();
    let log = engine.call_log();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let outcome = bridge.run(&request(&path)).expect("Analysis failed");

    let expected = dir.path().join("plots");
    assert_eq!(outcome.plots_dir, expected);
    assert!(expected.is_dir());
    assert_eq!(
        log.str_args(3),
        vec![Some(expected.to_string_lossy().into_owned())]
    );
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[test]
fn test_engine_loaded_once_across_requests() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let engine = MockEngine::new();
    let stamp = engine.stamp_handle();
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    bridge.run(&request(&path)).unwrap();
    bridge.run(&request(&path)).unwrap();
    assert_eq!(bridge.load_count(), 1);

    stamp.touch();
    bridge.run(&request(&path)).unwrap();
    assert_eq!(bridge.load_count(), 2);
}

#[test]
fn test_concurrent_requests_are_serialized() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);

    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (b, o) = (Arc::clone(&busy), Arc::clone(&overlapped));
    let engine = MockEngine::new().with_responder(move |_| {
        if b.swap(true, Ordering::SeqCst) {
            o.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(5));
        b.store(false, Ordering::SeqCst);
        ok_output()
    });
    let log = engine.call_log();
    let bridge = Arc::new(AnalysisBridge::with_config(engine, config(&dir)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            let path = path.clone();
            thread::spawn(move || bridge.run(&request(&path)).map(|o| o.used_encoding))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), "UTF-8");
    }
    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(log.len(), 4);
    assert_eq!(bridge.load_count(), 1);
}

#[test]
fn test_lossy_transcode_is_reported_as_degraded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.csv");
    // UTF-16 byte-order mark with an odd-length body: only the priority list decodes it.
    fs::write(&path, b"\xFF\xFEx;y\n1;22\n").unwrap();

    let bridge = AnalysisBridge::with_config(MockEngine::new(), config(&dir));
    let req = BridgeRequest::new(&path, column("x", 1), column("y", 2))
        .with_encoding(Some("utf-8"))
        .with_delimiter(Some(b';'));
    let outcome = bridge.run(&req).expect("Analysis failed");

    assert!(outcome.transcode_degraded);
    assert_eq!(outcome.transcoded_from.as_deref(), Some("cp1250"));
    assert_eq!(outcome.used_encoding, "UTF-8");
}

// =============================================================================
// Rscript adapter
// =============================================================================

/// A stand-in `Rscript` that introspects fine and fails every call the
/// way R reports an uncaught `stop()`, appending a line to `calls.log`.
#[cfg(unix)]
fn failing_rscript(dir: &TempDir) -> (PathBuf, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.path().join("calls.log");
    let fake = dir.path().join("Rscript");
    let body = r#"#!/bin/sh
case "$2" in
  *formals*)
    printf '\n__STATBRIDGE_RESULT__\ncsv_path\nx\ny\nplots_dir\nencoding\ndelimiter\n'
    ;;
  *)
    echo call >> "LOG"
    printf 'Error in run_analysis("d.csv", 1L, 2L, "plots", "UTF-8", ",") : \n  not enough observations\nExecution halted\n' >&2
    exit 1
    ;;
esac
"#
    .replace("LOG", &log.to_string_lossy());
    fs::write(&fake, body).unwrap();
    fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();
    (fake, log)
}

#[cfg(unix)]
#[test]
fn test_rscript_stop_aborts_after_one_call() {
    let dir = TempDir::new().unwrap();
    let path = plain_csv(&dir);
    let script = dir.path().join("stat_tests.R");
    fs::write(&script, "run_analysis <- function(...) stop('not enough observations')\n").unwrap();
    let (fake, log) = failing_rscript(&dir);

    let engine = RscriptEngine::new(RscriptConfig::new(&script).with_rscript(fake.to_string_lossy()));
    let bridge = AnalysisBridge::with_config(engine, config(&dir));

    let err = bridge.run(&request(&path)).unwrap_err();
    match err {
        StatBridgeError::EngineAborted { encoding, message } => {
            assert_eq!(encoding, "UTF-8");
            assert_eq!(message, "not enough observations");
        }
        other => panic!("unexpected error: {other}"),
    }
    let calls = fs::read_to_string(&log).unwrap();
    assert_eq!(calls.lines().count(), 1);
}

