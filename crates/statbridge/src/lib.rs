//! StatBridge: CSV ingestion that survives real-world files, and a retrying
//! bridge to an external statistics engine.
//!
//! Uploaded CSV files arrive in unknown encodings with unknown delimiters
//! and headers carrying diacritics. StatBridge detects the dialect, builds a
//! column catalog, resolves loosely-typed column names back to the real
//! headers, and hands the data to the engine in a form it can read,
//! retrying across encodings when the engine chokes.
//!
//! # Example
//!
//! ```no_run
//! use statbridge::{MockEngine, PipelineConfig, StatBridge};
//!
//! let bridge = StatBridge::new(PipelineConfig::new("uploads"), MockEngine::new()).unwrap();
//! let upload = bridge.upload("ankieta.csv").unwrap();
//! let id = &upload.dataset.metadata.file_id;
//!
//! let report = bridge.analyze(id, "Wiek", "Plec").unwrap();
//! println!("{} on {} / {}", report.result.recommended_test, report.actual_x, report.actual_y);
//! ```

pub mod bridge;
pub mod engine;
pub mod error;
pub mod inference;
pub mod input;
pub mod pipeline;
pub mod resolve;
pub mod schema;
pub mod transcode;

pub use bridge::{AnalysisBridge, BridgeConfig, BridgeOutcome, BridgeRequest, FailedAttempt};
pub use engine::{
    classify_failure, AnalysisResult, EngineCallSpec, EngineSession, FailureKind, MockEngine,
    RscriptConfig, RscriptEngine, StatEngine,
};
pub use error::{Result, StatBridgeError};
pub use inference::{CatalogBuilder, CatalogConfig};
pub use input::{DatasetMetadata, DatasetStore, Detection, Detector, DetectorConfig, UploadedDataset};
pub use pipeline::{AnalysisReport, PipelineConfig, StatBridge, UploadReport};
pub use resolve::{ColumnReference, ColumnResolver, MatchRule};
pub use schema::{safe_name, ColumnCatalog, ColumnDescriptor, ColumnKind};
pub use transcode::{TranscodedCsv, Transcoder};
