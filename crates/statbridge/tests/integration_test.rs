//! Integration tests for the upload and analysis workflows.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use statbridge::engine::{EngineFailure, EngineOutput, MockEngine};
use statbridge::inference::read_header;
use statbridge::{
    safe_name, BridgeConfig, CatalogBuilder, ColumnKind, Detector, PipelineConfig, StatBridge,
    StatBridgeError, Transcoder,
};

/// Polish survey data, long enough for statistical encoding detection.
const SURVEY: &str = "Wiek;Płeć;Wynik\n\
                      25;Kobieta;3.5\n\
                      31;Mężczyzna;4\n\
                      42;Kobieta;5\n\
                      19;Mężczyzna;2.5\n\
                      57;Kobieta;4.5\n\
                      33;Mężczyzna;3\n";

fn cp1250(text: &str) -> Vec<u8> {
    encoding_rs::WINDOWS_1250.encode(text).0.into_owned()
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).expect("Failed to write file");
    path
}

fn pipeline_with(dir: &TempDir, engine: MockEngine) -> StatBridge {
    let config = PipelineConfig::new(dir.path().join("uploads"))
        .with_bridge(BridgeConfig::default().with_temp_dir(dir.path()));
    StatBridge::new(config, engine).expect("Failed to open pipeline")
}

fn pipeline(dir: &TempDir) -> StatBridge {
    pipeline_with(dir, MockEngine::new())
}

// =============================================================================
// Catalog
// =============================================================================

#[test]
fn test_catalog_cp1250_semicolon() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.csv", &cp1250(SURVEY));

    let catalog = CatalogBuilder::new()
        .build(&path, Some("cp1250"), b';')
        .expect("Catalog failed");

    assert_eq!(catalog.used_encoding, "cp1250");
    assert_eq!(catalog.column_names(), vec!["Wiek", "Płeć", "Wynik"]);

    let wiek = catalog.get_column("Wiek").unwrap();
    let plec = catalog.get_column("Płeć").unwrap();
    let wynik = catalog.get_column("Wynik").unwrap();
    assert!(wiek.is_numeric);
    assert!(wynik.is_numeric);
    assert!(!plec.is_numeric);
    assert_eq!(plec.kind, ColumnKind::NonMeasurable);
    assert_eq!(plec.safe_name, "Plec");
    assert_eq!(safe_name("Płeć"), "Plec");
    assert_eq!(plec.cardinality, 2);
}

#[test]
fn test_detector_finds_semicolon() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.csv", &cp1250(SURVEY));

    let detection = Detector::new().detect_file(&path).unwrap();
    assert_eq!(detection.delimiter, b';');
    assert!(detection.encoding.is_some());
}

#[test]
fn test_catalog_json_shape() {
    let catalog = CatalogBuilder::new()
        .build_from_bytes(b"a,b\n1,x\n", None, b',')
        .unwrap();
    let json = serde_json::to_value(&catalog.columns[0]).unwrap();

    assert_eq!(json["name"], "a");
    assert_eq!(json["display"], "a");
    assert_eq!(json["safe_name"], "a");
    assert_eq!(json["type"], "measurable");
    assert_eq!(json["is_numeric"], true);
    assert_eq!(json["n_unique"], 1);
}

// =============================================================================
// Upload
// =============================================================================

#[test]
fn test_upload_cp1250_survey() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let bridge = pipeline(&dir);
    let report = bridge.upload(&src).expect("Upload failed");

    assert_eq!(report.catalog.column_names(), vec!["Wiek", "Płeć", "Wynik"]);
    assert_eq!(report.row_count, Some(6));
    assert_eq!(report.dataset.metadata.delimiter.as_deref(), Some(";"));
    assert_eq!(
        report.dataset.metadata.encoding.as_deref(),
        Some(report.catalog.used_encoding.as_str())
    );

    let stored = fs::read(&report.dataset.path).unwrap();
    assert_eq!(stored, cp1250(SURVEY));
    assert!(bridge
        .store()
        .metadata_path(&report.dataset.metadata.file_id)
        .is_file());
}

#[test]
fn test_upload_rejects_unreadable_file_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "empty.csv", b"");

    let bridge = pipeline(&dir);
    let err = bridge.upload(&src).unwrap_err();
    assert!(matches!(err, StatBridgeError::HeaderRead { .. }));

    let leftovers = fs::read_dir(bridge.store().root()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_columns_of_stored_dataset() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let bridge = pipeline(&dir);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;

    let catalog = bridge.columns(&id).unwrap();
    assert_eq!(catalog.column_count(), 3);
    assert_eq!(catalog.measurable().count(), 2);
}

// =============================================================================
// Analyze
// =============================================================================

#[test]
fn test_analyze_resolves_safe_names() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let bridge = pipeline(&dir);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;

    let report = bridge.analyze(&id, "Wiek", "Plec").expect("Analysis failed");

    assert_eq!(report.actual_x, "Wiek");
    assert_eq!(report.actual_x_index, Some(1));
    assert_eq!(report.actual_y, "Płeć");
    assert_eq!(report.actual_y_index, Some(2));
    assert_eq!(report.result.recommended_test, "t_student");
    assert_eq!(report.used_encoding, "UTF-8");
    assert_eq!(report.used_delimiter, ",");
    assert!(report.transcoded_from.is_some());
    assert!(report.failed_attempts.is_empty());
    assert!(report.used_header_encoding.is_some());
}

#[test]
fn test_analyze_hands_engine_canonical_csv() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let engine = MockEngine::new().with_responder(move |args| {
        let content = fs::read(args[0].as_str().unwrap_or_default())
            .map_err(|e| EngineFailure::new(e.to_string()))?;
        *sink.lock().unwrap() = content;
        Ok(EngineOutput::Value(MockEngine::sample_result()))
    });

    let bridge = pipeline_with(&dir, engine);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;
    bridge.analyze(&id, "wiek", "Wynik").expect("Analysis failed");

    let content = seen.lock().unwrap().clone();
    let text = String::from_utf8(content).expect("engine input should be UTF-8");
    assert!(text.starts_with("\u{feff}Wiek,Płeć,Wynik\n"));
    assert!(text.contains("31,Mężczyzna,4\n"));
}

#[test]
fn test_analyze_never_rewrites_metadata() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let bridge = pipeline(&dir);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;
    let meta_path = bridge.store().metadata_path(&id);
    let before = fs::read(&meta_path).unwrap();

    bridge.analyze(&id, "Wiek", "Wynik").unwrap();

    assert_eq!(fs::read(&meta_path).unwrap(), before);
}

#[test]
fn test_analyze_without_metadata_infers_dialect() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "plain.csv", b"a|b\n1|2\n3|4\n");

    let bridge = pipeline(&dir);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;
    fs::remove_file(bridge.store().metadata_path(&id)).unwrap();

    let report = bridge.analyze(&id, "A", "b").unwrap();
    assert_eq!(report.actual_x, "a");
    assert_eq!(report.actual_y_index, Some(2));
    assert!(report.transcoded_from.is_none());
}

#[test]
fn test_analyze_unknown_column_lists_headers() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "ankieta.csv", &cp1250(SURVEY));

    let bridge = pipeline(&dir);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;

    match bridge.analyze(&id, "Wiek", "Dochod").unwrap_err() {
        StatBridgeError::ColumnNotFound { token, available } => {
            assert_eq!(token, "Dochod");
            assert_eq!(available, vec!["Wiek", "Płeć", "Wynik"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_analyze_unknown_dataset() {
    let dir = TempDir::new().unwrap();
    let err = pipeline(&dir)
        .analyze("00000000-0000-0000-0000-000000000000", "a", "b")
        .unwrap_err();
    assert!(matches!(err, StatBridgeError::DatasetNotFound(_)));
}

#[test]
fn test_analyze_reports_failed_attempts() {
    let dir = TempDir::new().unwrap();
    let src = write_file(&dir, "plain.csv", b"x,y\n1,2\n2,4\n");

    let engine = MockEngine::new().with_responder(|args| match args[4].as_str() {
        Some("UTF-8") => Err(EngineFailure::new("invalid multibyte string at '<b3>'")),
        _ => Ok(EngineOutput::Value(MockEngine::sample_result())),
    });
    let bridge = pipeline_with(&dir, engine);
    let id = bridge.upload(&src).unwrap().dataset.metadata.file_id;

    let report = bridge.analyze(&id, "x", "y").unwrap();
    assert_eq!(report.used_encoding, "cp1250");
    assert_eq!(report.failed_attempts.len(), 1);
    assert_eq!(report.failed_attempts[0].encoding, "UTF-8");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["recommended_test"], "t_student");
    assert_eq!(json["actual_x_index"], 1);
}

// =============================================================================
// Header probe and transcoding
// =============================================================================

#[test]
fn test_header_probe_with_wrong_recorded_encoding() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.csv", &cp1250(SURVEY));

    let probe = read_header(&path, Some("utf-8"), Some(b';')).unwrap();
    assert_eq!(probe.headers, vec!["Wiek", "Płeć", "Wynik"]);
    assert_eq!(probe.encoding.as_deref(), Some("cp1250"));
}

#[test]
fn test_transcode_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "data.csv", &cp1250(SURVEY));

    let out = Transcoder::in_dir(dir.path())
        .transcode(&path, Some("cp1250"), Some(b';'))
        .unwrap();

    let original: Vec<Vec<String>> = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_reader(SURVEY.as_bytes())
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();

    let bytes = fs::read(out.path()).unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    let text = text.strip_prefix('\u{feff}').expect("missing BOM");
    let converted: Vec<Vec<String>> = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(text.as_bytes())
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();

    assert_eq!(converted, original);
}
