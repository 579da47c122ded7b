//! CSV loading for raw exports and cleaned tables.
//!
//! Raw files are read into [`RawRow`]s keyed by canonical column name; the
//! typed accessors on [`RawRow`] do all field coercion and report failures as
//! [`RowError`]s. Cleaned files are deserialized straight into the model
//! structs.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use store_core::dates::DateParser;
use store_core::error::{Result, RowError, StoreError};
use store_core::models::EntityKind;
use store_core::money::Money;
use tracing::{debug, warn};

use crate::columns::{canonical_column, required_columns};

// ── RawRow ────────────────────────────────────────────────────────────────────

/// One raw record with its values keyed by canonical column name.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// 1-based line number in the source file, when known.
    pub line: u64,
    values: HashMap<String, String>,
}

impl RawRow {
    pub fn from_pairs<I, K, V>(line: u64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Trimmed value of `column`, or `None` when absent or blank.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Trimmed value of `column`, or `default` when absent or blank.
    pub fn text_or(&self, column: &str, default: &str) -> String {
        self.text(column).unwrap_or(default).to_string()
    }

    pub fn required(&self, column: &'static str) -> std::result::Result<&str, RowError> {
        self.text(column).ok_or(RowError::Missing(column))
    }

    /// Whole-number value. `"5.0"` is accepted; `"5.5"` is not.
    pub fn integer(&self, column: &'static str) -> std::result::Result<i64, RowError> {
        let raw = self.required(column)?;
        parse_integer(raw).ok_or_else(|| RowError::InvalidInteger {
            field: column,
            value: raw.to_string(),
        })
    }

    /// Whole-number value that must lie within `u32` and be at least `min`.
    pub fn count(&self, column: &'static str, min: u32) -> std::result::Result<u32, RowError> {
        let value = self.integer(column)?;
        u32::try_from(value)
            .ok()
            .filter(|v| *v >= min)
            .ok_or_else(|| RowError::OutOfRange {
                field: column,
                value: value.to_string(),
            })
    }

    pub fn money(&self, column: &'static str) -> std::result::Result<Money, RowError> {
        let raw = self.required(column)?;
        Money::parse(raw).ok_or_else(|| RowError::InvalidCurrency {
            field: column,
            value: raw.to_string(),
        })
    }

    pub fn date(&self, column: &'static str) -> std::result::Result<NaiveDate, RowError> {
        let raw = self.required(column)?;
        DateParser::parse(raw).ok_or_else(|| RowError::InvalidDate {
            field: column,
            value: raw.to_string(),
        })
    }

    /// Required identifier, normalized with [`normalize_identifier`].
    pub fn identifier(&self, column: &'static str) -> std::result::Result<String, RowError> {
        self.required(column).map(normalize_identifier)
    }

    /// Optional identifier; blank becomes an empty string.
    pub fn identifier_or_blank(&self, column: &str) -> String {
        self.text(column).map(normalize_identifier).unwrap_or_default()
    }
}

/// Parse a whole number, accepting a zero fractional part.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let f: f64 = raw.parse().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Strip the `.0` that spreadsheet round-trips add to numeric identifiers.
///
/// `"1001.0"` → `"1001"`; anything non-numeric is returned trimmed.
pub fn normalize_identifier(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains('.') {
        if let Some(whole) = parse_integer(raw) {
            return whole.to_string();
        }
    }
    raw.to_string()
}

// ── RawTable ──────────────────────────────────────────────────────────────────

/// A raw export after header mapping.
///
/// Rows that the CSV layer itself cannot decode are kept as `Err` so the
/// scrubber can count them.
#[derive(Debug)]
pub struct RawTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: Vec<std::result::Result<RawRow, RowError>>,
}

/// Read a raw export for `entity`, mapping headers onto canonical names.
///
/// Fails when the file cannot be opened, when an I/O error interrupts
/// reading, or when a required column is missing from the header.
pub fn read_raw_table(path: &Path, entity: EntityKind) -> Result<RawTable> {
    let file = File::open(path).map_err(|source| StoreError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = rdr.headers().map_err(|source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut columns: Vec<String> = Vec::with_capacity(headers.len());
    for raw in headers.iter() {
        let canonical = canonical_column(entity, raw);
        if canonical != raw {
            debug!("{}: column \"{}\" -> \"{}\"", entity, raw, canonical);
        }
        if columns.contains(&canonical) {
            warn!(
                "{}: duplicate column \"{}\" in {}; keeping the first",
                entity,
                canonical,
                path.display()
            );
        }
        columns.push(canonical);
    }

    for required in required_columns(entity) {
        if !columns.iter().any(|c| c == required) {
            return Err(StoreError::MissingColumn {
                path: path.to_path_buf(),
                column: (*required).to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                let mut values = HashMap::with_capacity(columns.len());
                for (column, value) in columns.iter().zip(record.iter()) {
                    values
                        .entry(column.clone())
                        .or_insert_with(|| value.to_string());
                }
                rows.push(Ok(RawRow { line, values }));
            }
            Err(e) if e.is_io_error() => {
                return Err(StoreError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => rows.push(Err(RowError::Malformed(e.to_string()))),
        }
    }

    debug!(
        "Read {} raw {} rows from {}",
        rows.len(),
        entity,
        path.display()
    );

    Ok(RawTable {
        path: path.to_path_buf(),
        columns,
        rows,
    })
}

// ── Cleaned tables ────────────────────────────────────────────────────────────

/// Deserialize a cleaned CSV into `T`.
///
/// Returns the parsed records and the number of rows that failed to
/// deserialize; those rows are logged and skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    let file = File::open(path).map_err(|source| StoreError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(record) => records.push(record),
            Err(e) if e.is_io_error() => {
                return Err(StoreError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                skipped += 1;
                warn!("Skipping unreadable row in {}: {}", path.display(), e);
            }
        }
    }

    Ok((records, skipped))
}
