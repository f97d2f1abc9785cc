//! Header probing for analysis requests.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::{encoding_candidates, parse_with_encoding, FALLBACK_ENCODINGS};
use crate::error::{Result, StatBridgeError};
use crate::input::{decode_sample, guess_delimiter, guess_encoding, Charset, CANDIDATE_DELIMITERS};

/// Bytes inspected by the raw first-line fallback.
const RAW_HEADER_BYTES: usize = 2000;

/// The authoritative header of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderProbe {
    /// Headers in file order.
    pub headers: Vec<String>,
    /// Encoding that parsed the header, `None` if the raw fallback was used.
    pub encoding: Option<String>,
    /// Delimiter the header was split on.
    pub delimiter: char,
}

/// Read only the header row of a file.
///
/// Tries the recorded encoding and then the standard fallbacks, with the
/// recorded delimiter or one inferred from the text. When nothing parses,
/// the first line of the raw bytes is split instead.
pub fn read_header(
    path: impl AsRef<Path>,
    encoding: Option<&str>,
    delimiter: Option<u8>,
) -> Result<HeaderProbe> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| StatBridgeError::io(path, e))?;
    read_header_from_bytes(&bytes, encoding, delimiter)
}

/// [`read_header`] over bytes already in memory.
pub fn read_header_from_bytes(
    bytes: &[u8],
    encoding: Option<&str>,
    delimiter: Option<u8>,
) -> Result<HeaderProbe> {
    let fallbacks: Vec<String> = FALLBACK_ENCODINGS.iter().map(|e| e.to_string()).collect();
    let candidates = encoding_candidates(encoding, &fallbacks);

    for candidate in &candidates {
        let sep = match delimiter {
            Some(d) => d,
            None => match Charset::from_tag(candidate).and_then(|c| c.decode_strict(bytes)) {
                Some(text) => guess_delimiter(&text),
                None => continue,
            },
        };

        match parse_with_encoding(bytes, candidate, sep, 0) {
            Ok(table) => {
                debug!(encoding = %candidate, "header parsed");
                return Ok(HeaderProbe {
                    headers: table.headers,
                    encoding: Some(candidate.clone()),
                    delimiter: sep as char,
                });
            }
            Err(message) => debug!(encoding = %candidate, error = %message, "header candidate failed"),
        }
    }

    raw_first_line(bytes, delimiter, candidates)
}

fn raw_first_line(
    bytes: &[u8],
    delimiter: Option<u8>,
    attempted: Vec<String>,
) -> Result<HeaderProbe> {
    let sample = &bytes[..bytes.len().min(RAW_HEADER_BYTES)];
    let guess = guess_encoding(sample);
    let text = decode_sample(sample, guess.as_deref());
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let line = match text.lines().next() {
        Some(line) if !line.is_empty() => line,
        _ => {
            return Err(StatBridgeError::HeaderRead {
                attempted,
                message: "file has no header line".to_string(),
            });
        }
    };

    let sep = delimiter.unwrap_or_else(|| {
        CANDIDATE_DELIMITERS
            .iter()
            .copied()
            .find(|&d| line.as_bytes().contains(&d))
            .unwrap_or(b',')
    });

    warn!("header unreadable with every encoding, splitting the raw first line");

    Ok(HeaderProbe {
        headers: line.split(sep as char).map(|s| s.to_string()).collect(),
        encoding: None,
        delimiter: sep as char,
    })
}
