//! Decoded-text CSV parsing shared by the catalog and the header probe.

use std::collections::HashMap;

use crate::error::{Result, StatBridgeError};
use crate::input::DataTable;

/// Parse decoded CSV text into a table of at most `max_rows` data rows.
///
/// Short rows are padded and long rows truncated to the header width.
/// Fails when the text has no header row.
pub(crate) fn parse_table(text: &str, delimiter: u8, max_rows: usize) -> Result<DataTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if raw_headers.is_empty() {
        return Err(StatBridgeError::EmptyData(
            "No columns to parse from file".to_string(),
        ));
    }
    let headers = normalize_headers(raw_headers);
    let expected_cols = headers.len();

    let mut rows = Vec::new();
    for result in reader.records().take(max_rows) {
        let record = result?;
        let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        row.resize(expected_cols, String::new());
        rows.push(row);
    }

    Ok(DataTable::new(headers, rows, delimiter))
}

/// Make headers usable as unique keys.
///
/// Blank headers become `Unnamed: <index>`; repeated headers get `.1`,
/// `.2`, ... suffixes in order of appearance.
pub(crate) fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let named: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                h
            }
        })
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = named.iter().cloned().collect();
    let mut headers = Vec::with_capacity(named.len());

    for header in named {
        let count = seen.entry(header.clone()).or_insert(0);
        if *count == 0 {
            *count = 1;
            headers.push(header);
            continue;
        }

        let mut candidate = format!("{}.{}", header, count);
        while taken.contains(&candidate) {
            *count += 1;
            candidate = format!("{}.{}", header, count);
        }
        *count += 1;
        taken.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let table = parse_table("name,age,city\nAlice,30,NYC\nBob,25,LA", b',', 1000).unwrap();

        assert_eq!(table.headers, vec!["name", "age", "city"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, 0), Some("Alice"));
        assert_eq!(table.get(1, 1), Some("25"));
    }

    #[test]
    fn test_parse_respects_row_limit() {
        let table = parse_table("a\n1\n2\n3\n", b',', 2).unwrap();
        assert_eq!(table.row_count(), 2);

        let header_only = parse_table("a;b\n1;2\n", b';', 0).unwrap();
        assert_eq!(header_only.headers, vec!["a", "b"]);
        assert_eq!(header_only.row_count(), 0);
    }

    #[test]
    fn test_parse_strips_bom() {
        let table = parse_table("\u{feff}Wiek,Wynik\n1,2\n", b',', 10).unwrap();
        assert_eq!(table.headers[0], "Wiek");
    }

    #[test]
    fn test_parse_empty_text_fails() {
        assert!(parse_table("", b',', 10).is_err());
    }

    #[test]
    fn test_normalize_headers() {
        let headers = normalize_headers(vec![
            "a".into(),
            "".into(),
            "a".into(),
            "a.1".into(),
            "a".into(),
        ]);
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.2", "a.1", "a.3"]);
    }
}
