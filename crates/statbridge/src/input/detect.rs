//! Encoding and delimiter detection for uploaded files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::charset::{self, Charset};
use crate::error::{Result, StatBridgeError};

/// Delimiters considered during detection, in tie-break order.
pub const CANDIDATE_DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

/// Delimiter used when nothing better is found.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Lines inspected by the dialect sniffer.
const SNIFF_LINES: usize = 10;

/// Detector configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Bytes read from the start of the file.
    pub sample_bytes: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_bytes: 200_000,
        }
    }
}

/// Best-guess encoding and delimiter for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Normalized encoding tag, `None` when the detector had no opinion.
    pub encoding: Option<String>,
    /// Field delimiter byte.
    pub delimiter: u8,
}

/// Proposes an encoding and delimiter from raw bytes.
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    /// Create a detector with default configuration.
    pub fn new() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }

    /// Create a detector with custom configuration.
    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Read the head of a file and detect its encoding and delimiter.
    pub fn detect_file(&self, path: impl AsRef<Path>) -> Result<Detection> {
        let sample = read_head(path.as_ref(), self.config.sample_bytes)?;
        Ok(self.detect_bytes(&sample))
    }

    /// Detect encoding and delimiter from a byte sample.
    pub fn detect_bytes(&self, sample: &[u8]) -> Detection {
        let encoding = charset::guess_encoding(sample);
        let text = decode_sample(sample, encoding.as_deref());
        let delimiter = guess_delimiter(&text);

        debug!(
            encoding = encoding.as_deref().unwrap_or("<none>"),
            delimiter = %(delimiter as char).escape_default(),
            "detected dialect"
        );

        Detection {
            encoding,
            delimiter,
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

/// Read at most `limit` bytes from the start of a file.
pub(crate) fn read_head(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| StatBridgeError::io(path, e))?;
    let mut sample = Vec::with_capacity(limit.min(1 << 20));
    file.take(limit as u64)
        .read_to_end(&mut sample)
        .map_err(|e| StatBridgeError::io(path, e))?;
    Ok(sample)
}

/// Decode a sample with a guessed encoding, falling back to lossy UTF-8.
pub(crate) fn decode_sample(sample: &[u8], encoding: Option<&str>) -> String {
    match encoding.and_then(Charset::from_tag) {
        Some(charset) => charset.decode_lossy(sample),
        None => String::from_utf8_lossy(sample).into_owned(),
    }
}

/// Pick a delimiter: dialect sniffing first, then first-line counting.
pub fn guess_delimiter(text: &str) -> u8 {
    if let Some(delimiter) = sniff_delimiter(text) {
        return delimiter;
    }
    first_line_delimiter(text)
}

/// Dialect sniffing over the first lines of the text.
///
/// A delimiter qualifies when it appears in the first line; it scores
/// highest when every inspected line has the same count. Returns `None`
/// when no candidate is conclusive.
pub fn sniff_delimiter(text: &str) -> Option<u8> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.is_empty())
        .take(SNIFF_LINES)
        .collect();

    if lines.is_empty() {
        return None;
    }

    let mut best: Option<u8> = None;
    let mut best_score = 0;

    for &delim in CANDIDATE_DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delim))
            .collect();

        let first_count = counts[0];
        if first_count == 0 {
            continue;
        }

        let consistent = counts.iter().all(|&c| c == first_count);
        let variance: f64 = if counts.len() > 1 {
            let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
            counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / counts.len() as f64
        } else {
            0.0
        };

        // Higher count with lower variance is better; erratic counts do not qualify.
        let score = if consistent {
            first_count * 1000
        } else if variance < 1.0 {
            first_count * 100
        } else {
            0
        };

        if score > best_score {
            best_score = score;
            best = Some(delim);
        }
    }

    best
}

/// Most frequent candidate in the first line, `,` when none occurs.
pub fn first_line_delimiter(text: &str) -> u8 {
    let header = match text.lines().next() {
        Some(line) => line,
        None => return DEFAULT_DELIMITER,
    };

    let mut best = DEFAULT_DELIMITER;
    let mut best_count = 0;
    for &delim in CANDIDATE_DELIMITERS {
        let count = header.bytes().filter(|&b| b == delim).count();
        if count > best_count {
            best_count = count;
            best = delim;
        }
    }
    best
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delim_char = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim_char && !in_quotes => count += 1,
            _ => {}
        }
    }

    count
}

/// Render a delimiter byte the way metadata stores it.
pub fn delimiter_to_string(delimiter: u8) -> String {
    (delimiter as char).to_string()
}

/// Parse a stored delimiter. Accepts a single ASCII character, `\t` or `tab`.
pub fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "\\t" | "tab" => Some(b'\t'),
        _ => match raw.as_bytes() {
            [b] if b.is_ascii() => Some(*b),
            _ => None,
        },
    }
}
