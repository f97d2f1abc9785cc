//! Engine failure classification.
//!
//! Engines give no typed error taxonomy, so failures are sorted by keywords
//! in their message. Decoding keywords are checked first: a message about a
//! bad byte in an argument is still a decoding problem.

use serde::{Deserialize, Serialize};

/// How the bridge should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Character decoding trouble; try the next encoding.
    Decode,
    /// The call did not match the function's parameters; reload and retry.
    SignatureMismatch,
    /// Anything else; abort.
    Other,
}

const DECODE_KEYWORDS: &[&str] = &[
    "unicode",
    "utf-8",
    "utf8",
    "decode",
    "invalid continuation",
    "invalid start byte",
    "invalid multibyte",
];

const SIGNATURE_KEYWORDS: &[&str] = &["unused argument", "formal", "argument"];

/// Classify a failure message.
pub fn classify_failure(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();

    if DECODE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        FailureKind::Decode
    } else if SIGNATURE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        FailureKind::SignatureMismatch
    } else {
        FailureKind::Other
    }
}
