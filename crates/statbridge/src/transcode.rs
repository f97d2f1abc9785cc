//! Rewriting arbitrary CSV into canonical form.
//!
//! Canonical CSV is comma-delimited, UTF-8, and starts with exactly one
//! byte-order mark. Some engines only read that dialect reliably.
//!
//! Decoding never fails: the cascade ends in decoders that accept any
//! byte sequence, at the price of possibly reinterpreting the data.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{Result, StatBridgeError};
use crate::input::{guess_encoding, Charset, DEFAULT_DELIMITER};

/// Encodings tried when neither the supplied nor the detected one decodes.
pub const PRIORITY_ENCODINGS: &[&str] = &["cp1250", "iso-8859-2", "latin1", "utf-8", "utf-8-sig"];

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which step of the decoding cascade produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStep {
    /// The encoding the caller believed in.
    Supplied,
    /// The byte-pattern guess.
    Detected,
    /// The fixed priority list.
    Priority,
    /// Forced ISO-8859-1.
    ForcedLatin1,
    /// UTF-8 with replacement characters.
    LossyUtf8,
}

impl DecodeStep {
    /// Whether the text came from a fallback with no evidence behind it.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            DecodeStep::Priority | DecodeStep::ForcedLatin1 | DecodeStep::LossyUtf8
        )
    }
}

/// A canonical CSV written to a temporary file.
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct TranscodedCsv {
    path: TempPath,
    /// Encoding the source was decoded with.
    pub source_encoding: String,
    /// Cascade step that decoded the source.
    pub step: DecodeStep,
    /// Records written (header included).
    pub records: usize,
}

impl TranscodedCsv {
    /// Location of the canonical file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether decoding fell back to a lossy path.
    pub fn is_degraded(&self) -> bool {
        self.step.is_degraded()
    }
}

/// Rewrites CSV files into canonical form.
#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    temp_dir: Option<PathBuf>,
}

impl Transcoder {
    /// Transcoder writing to the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcoder writing into a specific directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
        }
    }

    /// Transcode `source`, believed to be in `encoding` with `delimiter`.
    ///
    /// A missing delimiter means `,`.
    pub fn transcode(
        &self,
        source: impl AsRef<Path>,
        encoding: Option<&str>,
        delimiter: Option<u8>,
    ) -> Result<TranscodedCsv> {
        let source = source.as_ref();
        let raw = fs::read(source).map_err(|e| StatBridgeError::io(source, e))?;

        let (text, used, step) = decode_cascade(&raw, encoding);
        let text = text.trim_start_matches('\u{feff}');
        let delimiter = delimiter.unwrap_or(DEFAULT_DELIMITER);

        let builder = tempfile::Builder::new()
            .prefix("conv_")
            .suffix(".csv")
            .tempfile_in(self.temp_dir.clone().unwrap_or_else(std::env::temp_dir));
        let mut tmp = builder.map_err(|e| StatBridgeError::io(source, e))?;
        let tmp_path = tmp.path().to_path_buf();

        tmp.write_all(BOM)
            .map_err(|e| StatBridgeError::io(&tmp_path, e))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .flexible(true)
            .from_writer(tmp.as_file_mut());

        let mut records = 0;
        for record in reader.records() {
            writer.write_record(&record?)?;
            records += 1;
        }
        writer
            .flush()
            .map_err(|e| StatBridgeError::io(&tmp_path, e))?;
        drop(writer);

        if step.is_degraded() {
            warn!(
                source = %source.display(),
                encoding = %used,
                step = ?step,
                "transcoding fell back to a lossy decoding"
            );
        } else {
            debug!(source = %source.display(), encoding = %used, records, "transcoded");
        }

        Ok(TranscodedCsv {
            path: tmp.into_temp_path(),
            source_encoding: used,
            step,
            records,
        })
    }
}

/// Decode raw bytes with the first encoding in the cascade that succeeds.
pub fn decode_cascade(raw: &[u8], supplied: Option<&str>) -> (String, String, DecodeStep) {
    if let Some(encoding) = supplied {
        if let Some(text) = strict(raw, encoding) {
            return (text, encoding.to_string(), DecodeStep::Supplied);
        }
    }

    if let Some(encoding) = guess_encoding(raw) {
        if let Some(text) = strict(raw, &encoding) {
            return (text, encoding, DecodeStep::Detected);
        }
    }

    for encoding in PRIORITY_ENCODINGS {
        if let Some(text) = strict(raw, encoding) {
            return (text, encoding.to_string(), DecodeStep::Priority);
        }
    }

    if let Some(text) = Charset::Latin1.decode_strict(raw) {
        return (text, "latin1".to_string(), DecodeStep::ForcedLatin1);
    }

    (
        String::from_utf8_lossy(raw).into_owned(),
        "utf-8-replace".to_string(),
        DecodeStep::LossyUtf8,
    )
}

fn strict(raw: &[u8], encoding: &str) -> Option<String> {
    Charset::from_tag(encoding)?.decode_strict(raw)
}
