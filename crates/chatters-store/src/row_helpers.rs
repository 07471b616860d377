//! Column decoding and timestamp helpers shared by the repositories.

use std::str::FromStr;

use chrono::{SecondsFormat, Utc};

use crate::error::StoreError;

/// Current time as an RFC 3339 UTC string with millisecond precision.
///
/// Fixed width, so lexical order equals chronological order.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Get a required column value from a row, returning `CorruptRow` on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get a text column and parse it with `FromStr`.
pub fn parse<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = get(row, idx, table, column)?;
    raw.parse().map_err(|e: T::Err| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}
