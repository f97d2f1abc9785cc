//! Character encoding tags and decoding.
//!
//! Encodings travel through the pipeline as lowercase tags (`utf-8`,
//! `cp1250`, `latin1`, `iso-8859-2`, `utf-16`, ...) because they are
//! persisted as metadata and handed to the engine verbatim. [`Charset`]
//! turns a tag into something that can actually decode bytes.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

/// Canonical tag for UTF-8.
pub const UTF8: &str = "utf-8";

/// Canonical tag for ISO-8859-1.
pub const LATIN1: &str = "latin1";

/// A decodable character set resolved from an encoding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8, a leading byte-order mark is kept as U+FEFF.
    Utf8,
    /// UTF-8 with any leading byte-order mark removed.
    Utf8Sig,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// UTF-16, endianness from the byte-order mark (little-endian without one).
    Utf16,
    /// Any other encoding known to `encoding_rs`.
    Legacy(&'static Encoding),
}

impl Charset {
    /// Resolve an encoding tag. Returns `None` for unknown or empty tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "" => None,
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "utf-8-sig" | "utf8-sig" => Some(Charset::Utf8Sig),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" | "l1" => Some(Charset::Latin1),
            "utf-16" | "utf16" => Some(Charset::Utf16),
            other => {
                // cpNNNN has no WHATWG label for every code page, windows-NNNN does.
                let label = match other.strip_prefix("cp") {
                    Some(number) if number.chars().all(|c| c.is_ascii_digit()) => {
                        format!("windows-{}", number)
                    }
                    _ => other.to_string(),
                };
                Encoding::for_label(label.as_bytes())
                    .or_else(|| Encoding::for_label(other.as_bytes()))
                    .map(Charset::Legacy)
            }
        }
    }

    /// Decode bytes, failing on any malformed sequence.
    pub fn decode_strict(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Charset::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(body).ok().map(str::to_string)
            }
            Charset::Latin1 => Some(decode_latin1(bytes)),
            Charset::Utf16 => {
                let (encoding, body) = split_utf16_bom(bytes);
                encoding
                    .decode_without_bom_handling_and_without_replacement(body)
                    .map(|text| text.into_owned())
            }
            Charset::Legacy(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }

    /// Decode bytes, replacing malformed sequences with U+FFFD.
    pub fn decode_lossy(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                String::from_utf8_lossy(body).into_owned()
            }
            Charset::Latin1 => decode_latin1(bytes),
            Charset::Utf16 => {
                let (encoding, body) = split_utf16_bom(bytes);
                encoding.decode_without_bom_handling(body).0.into_owned()
            }
            Charset::Legacy(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}

/// Normalize a raw encoding name to the tag vocabulary used for metadata.
///
/// `windows-*` becomes `cp*`, ISO-8859-1 spellings become `latin1`, every
/// UTF-8 variant becomes `utf-8`. Anything else is lowercased and passed on.
pub fn normalize_encoding(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return lowered;
    }
    let lowered = match lowered.strip_prefix("windows-") {
        Some(rest) => format!("cp{}", rest),
        None => lowered,
    };
    if lowered == "iso-8859-1" || lowered == "latin1" {
        return LATIN1.to_string();
    }
    if lowered.starts_with("utf-8") {
        return UTF8.to_string();
    }
    lowered
}

/// Whether a tag spells plain UTF-8.
pub fn is_utf8_tag(tag: &str) -> bool {
    matches!(tag.trim().to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

/// Statistical guess at the encoding of a byte sample, already normalized.
///
/// Valid UTF-8 (which includes plain ASCII) is reported as `utf-8`;
/// otherwise the byte-pattern detector decides. Empty input has no guess.
pub fn guess_encoding(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => return Some(UTF8.to_string()),
        // A sample cut in the middle of a multi-byte sequence is still UTF-8.
        Err(e) if e.error_len().is_none() => return Some(UTF8.to_string()),
        Err(_) => {}
    }
    if bytes.starts_with(b"\xFF\xFE") || bytes.starts_with(b"\xFE\xFF") {
        return Some("utf-16".to_string());
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    Some(normalize_encoding(guess.name()))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn split_utf16_bom(bytes: &[u8]) -> (&'static Encoding, &[u8]) {
    if let Some(body) = bytes.strip_prefix(b"\xFF\xFE") {
        (UTF_16LE, body)
    } else if let Some(body) = bytes.strip_prefix(b"\xFE\xFF") {
        (UTF_16BE, body)
    } else {
        (UTF_16LE, bytes)
    }
}
