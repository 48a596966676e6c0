use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde_json::Value;

use crate::StoreError;

pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s}: {e}")))
}

pub(crate) fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

pub(crate) fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| parse_ts(&s)).transpose()
}

pub(crate) fn json_str(v: &Value) -> String {
    v.to_string()
}

pub(crate) fn parse_json(s: &str) -> Result<Value, StoreError> {
    serde_json::from_str(s).map_err(Into::into)
}

pub(crate) fn opt_json_str(v: &Option<Value>) -> Option<String> {
    v.as_ref().map(json_str)
}

pub(crate) fn parse_opt_json(s: Option<String>) -> Result<Option<Value>, StoreError> {
    s.map(|s| parse_json(&s)).transpose()
}

/// Wrapper so `Vec<f32>` embeddings round-trip through a SQLite `BLOB`
/// column as little-endian packed floats.
pub(crate) struct EmbeddingBlob(pub Vec<f32>);

impl ToSql for EmbeddingBlob {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for f in &self.0 {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        Ok(ToSqlOutput::Owned(rusqlite::types::Value::Blob(bytes)))
    }
}

impl FromSql for EmbeddingBlob {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let bytes = value.as_blob()?;
        if bytes.len() % 4 != 0 {
            return Err(FromSqlError::InvalidType);
        }
        let floats = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(EmbeddingBlob(floats))
    }
}
