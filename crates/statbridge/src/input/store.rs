//! Dataset storage: uploaded files plus JSON metadata sidecars.
//!
//! Layout of a store directory:
//! ```text
//! uploads/
//! ├── 6f1c...e2.csv          # the uploaded bytes, untouched
//! └── 6f1c...e2.meta.json    # DatasetMetadata, written once
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use super::source::{DatasetMetadata, UploadedDataset};
use crate::error::{Result, StatBridgeError};

/// Directory-backed store of uploaded datasets.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: PathBuf,
}

impl DatasetStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                StatBridgeError::Persistence(format!(
                    "Failed to create directory '{}': {}",
                    root.display(),
                    e
                ))
            })?;
        }
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the data file for a dataset id.
    pub fn data_path(&self, file_id: &str) -> PathBuf {
        self.root.join(format!("{}.csv", file_id))
    }

    /// Path of the metadata sidecar for a dataset id.
    pub fn metadata_path(&self, file_id: &str) -> PathBuf {
        self.root.join(format!("{}.meta.json", file_id))
    }

    /// Copy a file into the store under a fresh id.
    pub fn import(&self, source: impl AsRef<Path>) -> Result<(String, PathBuf)> {
        let source = source.as_ref();
        let file_id = Uuid::new_v4().to_string();
        let target = self.data_path(&file_id);
        fs::copy(source, &target).map_err(|e| StatBridgeError::io(source, e))?;
        Ok((file_id, target))
    }

    /// Write metadata for a dataset. Fails if metadata already exists.
    pub fn create_metadata(&self, metadata: &DatasetMetadata) -> Result<()> {
        check_id(&metadata.file_id)?;
        let path = self.metadata_path(&metadata.file_id);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    StatBridgeError::Persistence(format!(
                        "Metadata for dataset '{}' already exists",
                        metadata.file_id
                    ))
                } else {
                    StatBridgeError::Persistence(format!(
                        "Failed to create file '{}': {}",
                        path.display(),
                        e
                    ))
                }
            })?;

        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, metadata).map_err(|e| {
            StatBridgeError::Persistence(format!("Failed to serialize metadata: {}", e))
        })?;

        Ok(())
    }

    /// Read metadata for a dataset. A missing or unreadable sidecar yields `None`.
    pub fn read_metadata(&self, file_id: &str) -> Result<Option<DatasetMetadata>> {
        check_id(file_id)?;
        let path = self.metadata_path(file_id);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StatBridgeError::io(path, e)),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable metadata");
                Ok(None)
            }
        }
    }

    /// Look up a stored dataset.
    pub fn dataset(&self, file_id: &str) -> Result<UploadedDataset> {
        check_id(file_id)?;
        let path = self.data_path(file_id);
        if !path.is_file() {
            return Err(StatBridgeError::DatasetNotFound(file_id.to_string()));
        }

        let metadata = self
            .read_metadata(file_id)?
            .unwrap_or_else(|| DatasetMetadata::new(file_id, format!("{}.csv", file_id)));

        Ok(UploadedDataset { path, metadata })
    }
}

/// Ids become file names; keep them to a safe alphabet.
fn check_id(file_id: &str) -> Result<()> {
    let valid = !file_id.is_empty()
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StatBridgeError::DatasetNotFound(file_id.to_string()))
    }
}
