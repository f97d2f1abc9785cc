//! The `StatBridge` facade: upload, catalog, and analyze stored datasets.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::bridge::{AnalysisBridge, BridgeConfig, BridgeRequest, FailedAttempt};
use crate::engine::{AnalysisResult, StatEngine};
use crate::error::{Result, StatBridgeError};
use crate::inference::{count_rows, read_header, CatalogBuilder, CatalogConfig};
use crate::input::{delimiter_to_string, DatasetMetadata, DatasetStore, Detector, DetectorConfig, UploadedDataset};
use crate::resolve::ColumnResolver;
use crate::schema::ColumnCatalog;

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding uploaded datasets and their metadata.
    pub store_dir: PathBuf,
    /// Detector configuration.
    pub detector: DetectorConfig,
    /// Catalog configuration.
    pub catalog: CatalogConfig,
    /// Bridge configuration.
    pub bridge: BridgeConfig,
}

impl PipelineConfig {
    /// Defaults with a store directory.
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            detector: DetectorConfig::default(),
            catalog: CatalogConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }

    /// Replace the bridge configuration.
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Replace the catalog configuration.
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = catalog;
        self
    }
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReport {
    /// The stored dataset and its metadata.
    pub dataset: UploadedDataset,
    /// Columns found in the sample.
    pub catalog: ColumnCatalog,
    /// Data rows in the whole file; `None` if it could not be re-read.
    pub row_count: Option<usize>,
}

/// Result of an analysis, with everything needed to debug it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub file_id: String,
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub actual_x: String,
    pub actual_y: String,
    pub actual_x_index: Option<usize>,
    pub actual_y_index: Option<usize>,
    pub used_encoding: String,
    pub used_delimiter: String,
    pub used_header_encoding: Option<String>,
    pub transcoded_from: Option<String>,
    pub transcode_degraded: bool,
    pub failed_attempts: Vec<FailedAttempt>,
    pub plots_dir: PathBuf,
}

impl AnalysisReport {
    /// The plot file inside `plots_dir`, if the engine produced one.
    pub fn plot_file(&self, plots_dir: &Path) -> Option<PathBuf> {
        if self.result.plot_path.is_empty() {
            None
        } else {
            Some(plots_dir.join(&self.result.plot_path))
        }
    }
}

/// Upload and analysis workflows over one store and one engine.
pub struct StatBridge {
    store: DatasetStore,
    detector: Detector,
    catalog: CatalogBuilder,
    bridge: AnalysisBridge,
}

impl StatBridge {
    /// Open the store and wrap the engine.
    pub fn new(config: PipelineConfig, engine: impl StatEngine + 'static) -> Result<Self> {
        Ok(Self {
            store: DatasetStore::open(&config.store_dir)?,
            detector: Detector::with_config(config.detector),
            catalog: CatalogBuilder::with_config(config.catalog),
            bridge: AnalysisBridge::with_config(engine, config.bridge),
        })
    }

    /// The dataset store.
    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// The analysis bridge.
    pub fn bridge(&self) -> &AnalysisBridge {
        &self.bridge
    }

    /// Upload a file under its own name.
    pub fn upload(&self, source: impl AsRef<Path>) -> Result<UploadReport> {
        let source = source.as_ref();
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.upload_named(source, &filename)
    }

    /// Upload a file under a client-supplied name.
    ///
    /// Only `.csv` names are accepted. The file is copied into the store,
    /// catalogued, and its metadata written once.
    pub fn upload_named(&self, source: impl AsRef<Path>, filename: &str) -> Result<UploadReport> {
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(StatBridgeError::Config(format!(
                "Only CSV files are supported: '{}'",
                filename
            )));
        }

        let (file_id, path) = self.store.import(source)?;

        let (catalog, detected_delimiter) = self
            .catalog_for(&path, None, None)
            .map_err(|e| discard_upload(&path, e))?;

        let metadata = DatasetMetadata {
            file_id: file_id.clone(),
            filename: filename.to_string(),
            encoding: Some(catalog.used_encoding.clone()),
            delimiter: Some(delimiter_to_string(detected_delimiter)),
            uploaded_at: Some(Utc::now()),
            sha256: file_digest(&path).ok(),
        };
        self.record_upload(&path, &metadata)?;

        let row_count = count_rows(&path, &catalog.used_encoding, detected_delimiter);

        info!(
            file_id = %file_id,
            encoding = %catalog.used_encoding,
            columns = catalog.column_count(),
            rows = ?row_count,
            "dataset uploaded"
        );

        Ok(UploadReport {
            dataset: UploadedDataset { path, metadata },
            catalog,
            row_count,
        })
    }

    /// Write upload metadata; a rejected write discards the stored copy.
    fn record_upload(&self, path: &Path, metadata: &DatasetMetadata) -> Result<()> {
        self.store
            .create_metadata(metadata)
            .map_err(|e| discard_upload(path, e))
    }

    /// Catalog of a stored dataset, using its recorded dialect where known.
    pub fn columns(&self, file_id: &str) -> Result<ColumnCatalog> {
        let dataset = self.store.dataset(file_id)?;
        let (catalog, _) =
            self.catalog_for(&dataset.path, dataset.encoding(), dataset.delimiter())?;
        Ok(catalog)
    }

    fn catalog_for(
        &self,
        path: &Path,
        encoding: Option<&str>,
        delimiter: Option<u8>,
    ) -> Result<(ColumnCatalog, u8)> {
        let (encoding, delimiter) = match (encoding, delimiter) {
            (Some(e), Some(d)) => (Some(e.to_string()), d),
            _ => {
                let detection = self.detector.detect_file(path)?;
                (
                    encoding.map(str::to_string).or(detection.encoding),
                    delimiter.unwrap_or(detection.delimiter),
                )
            }
        };
        let catalog = self.catalog.build(path, encoding.as_deref(), delimiter)?;
        Ok((catalog, delimiter))
    }

    /// Analyze two columns of a stored dataset.
    ///
    /// Recorded metadata is only read, never updated.
    pub fn analyze(&self, file_id: &str, x: &str, y: &str) -> Result<AnalysisReport> {
        self.analyze_with(file_id, x, y, None)
    }

    /// [`analyze`](Self::analyze) with a plots directory for this request.
    pub fn analyze_with(
        &self,
        file_id: &str,
        x: &str,
        y: &str,
        plots_dir: Option<&Path>,
    ) -> Result<AnalysisReport> {
        let dataset = self.store.dataset(file_id)?;
        let probe = read_header(&dataset.path, dataset.encoding(), dataset.delimiter())?;

        let resolver = ColumnResolver::new(&probe.headers);
        let (x_ref, y_ref) = resolver.resolve_pair(x, y)?;

        let mut request = BridgeRequest::new(&dataset.path, x_ref.clone(), y_ref.clone())
            .with_encoding(dataset.encoding())
            .with_delimiter(dataset.delimiter());
        if let Some(dir) = plots_dir {
            request = request.with_plots_dir(dir);
        }

        let outcome = self.bridge.run(&request)?;

        Ok(AnalysisReport {
            file_id: file_id.to_string(),
            result: outcome.result,
            actual_x: x_ref.name,
            actual_y: y_ref.name,
            actual_x_index: x_ref.position,
            actual_y_index: y_ref.position,
            used_encoding: outcome.used_encoding,
            used_delimiter: outcome
                .used_delimiter
                .unwrap_or_else(|| probe.delimiter.to_string()),
            used_header_encoding: probe.encoding,
            transcoded_from: outcome.transcoded_from,
            transcode_degraded: outcome.transcode_degraded,
            failed_attempts: outcome.failed_attempts,
            plots_dir: outcome.plots_dir,
        })
    }
}

/// Remove the stored copy of an upload that failed, passing the error on.
fn discard_upload(path: &Path, error: StatBridgeError) -> StatBridgeError {
    if let Err(cleanup) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %cleanup, "failed to remove rejected upload");
    }
    error
}

fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| StatBridgeError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
