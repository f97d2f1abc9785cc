//! Column resolution between client-supplied tokens and real headers.
//!
//! Clients often cannot send the exact header (diacritics get lost,
//! case changes). Resolution tries three rules in order and stops at the
//! first that matches:
//!
//! 1. exact match,
//! 2. the header's [`safe_name`] equals the token,
//! 3. case-insensitive match.
//!
//! Within a rule, headers are scanned in file order, so the result only
//! depends on the header sequence and the token.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatBridgeError};
use crate::schema::safe_name;

/// Which rule matched a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    SafeName,
    CaseInsensitive,
}

/// A token resolved to a real header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    /// The header string as it appears in the file.
    pub name: String,
    /// 1-based position in the header list at resolution time.
    pub position: Option<usize>,
    /// Rule that produced the match.
    pub matched_by: MatchRule,
}

/// Resolves column tokens against one header list.
#[derive(Debug, Clone, Copy)]
pub struct ColumnResolver<'a> {
    headers: &'a [String],
}

impl<'a> ColumnResolver<'a> {
    /// Create a resolver over the authoritative header list.
    pub fn new(headers: &'a [String]) -> Self {
        Self { headers }
    }

    /// Find the header a token refers to, without failing.
    pub fn find(&self, token: &str) -> Option<(&'a str, MatchRule)> {
        let headers = self.headers;

        if let Some(h) = headers.iter().find(|h| h.as_str() == token) {
            return Some((h.as_str(), MatchRule::Exact));
        }
        if let Some(h) = headers.iter().find(|h| safe_name(h) == token) {
            return Some((h.as_str(), MatchRule::SafeName));
        }
        let lowered = token.to_lowercase();
        headers
            .iter()
            .find(|h| h.to_lowercase() == lowered)
            .map(|h| (h.as_str(), MatchRule::CaseInsensitive))
    }

    /// Resolve a token to a [`ColumnReference`].
    pub fn resolve(&self, token: &str) -> Result<ColumnReference> {
        let (name, matched_by) =
            self.find(token)
                .ok_or_else(|| StatBridgeError::ColumnNotFound {
                    token: token.to_string(),
                    available: self.headers.to_vec(),
                })?;

        let position = self.headers.iter().position(|h| h == name).map(|i| i + 1);

        Ok(ColumnReference {
            name: name.to_string(),
            position,
            matched_by,
        })
    }

    /// Resolve both analysis columns. The first unresolved token is reported.
    pub fn resolve_pair(&self, x: &str, y: &str) -> Result<(ColumnReference, ColumnReference)> {
        Ok((self.resolve(x)?, self.resolve(y)?))
    }
}
