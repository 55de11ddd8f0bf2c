//! SMET series validation.
//!
//! A SMET file starts with a signature line, followed by a `[HEADER]` section
//! of `key = value` lines and a `[DATA]` section:
//!
//! ```text
//! SMET 1.1 ASCII
//! [HEADER]
//! station_id = WFJ2
//! fields = timestamp TA RH VW ISWR
//! [DATA]
//! 2024-01-01T00:00:00 265.1 0.8 2.3 0
//! ```

use crate::{MeteoError, Result};
use std::collections::BTreeMap;

/// Parsed header of a SMET series.
#[derive(Debug, Clone, PartialEq)]
pub struct SmetHeader {
    pub station_id: String,
    /// Column names of the data section.
    pub fields: Vec<String>,
    /// All header keys, including the two above.
    pub entries: BTreeMap<String, String>,
    /// Number of data lines.
    pub records: usize,
}

/// Validate a SMET series of station `expected_id`.
///
/// Checks the signature, the presence of both sections, the `station_id`
/// and that every data line has one value per field.
pub fn validate_smet(text: &str, expected_id: &str) -> Result<SmetHeader> {
    let fail = |reason: String| MeteoError::Smet {
        station_id: expected_id.to_string(),
        reason,
    };

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(sig) if sig.starts_with("SMET ") && sig.ends_with("ASCII") => {}
        Some(sig) => return Err(fail(format!("bad signature line {sig:?}"))),
        None => return Err(fail("empty file".to_string())),
    }
    if lines.next() != Some("[HEADER]") {
        return Err(fail("missing [HEADER] section".to_string()));
    }

    let mut entries = BTreeMap::new();
    let mut in_data = false;
    for line in lines.by_ref() {
        if line == "[DATA]" {
            in_data = true;
            break;
        }
        if line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| fail(format!("malformed header line {line:?}")))?;
        entries.insert(key.trim().to_string(), value.trim().to_string());
    }
    if !in_data {
        return Err(fail("missing [DATA] section".to_string()));
    }

    let station_id = entries
        .get("station_id")
        .cloned()
        .ok_or_else(|| fail("header has no station_id".to_string()))?;
    if station_id != expected_id {
        return Err(fail(format!("header names station {station_id}")));
    }
    let fields: Vec<String> = entries
        .get("fields")
        .map(|f| f.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if fields.is_empty() {
        return Err(fail("header has no fields".to_string()));
    }

    let mut records = 0;
    for (i, line) in lines.enumerate() {
        let n = line.split_whitespace().count();
        if n != fields.len() {
            return Err(fail(format!("data line {} has {n} values, expected {}", i + 1, fields.len())));
        }
        records += 1;
    }

    Ok(SmetHeader {
        station_id,
        fields,
        entries,
        records,
    })
}
