//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for all CLI operations.
//! All operations return either a `SuccessEnvelope` or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "backend": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "backend": "...", "command": "...", "error": {"code": "...", "message": "..."}}`

use serde::{Deserialize, Serialize};

use crate::error::DbConnectError;
use crate::value::{ColumnDescription, Row};

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Backend used for this operation (postgres, oracle)
    pub backend: String,

    /// Command that was executed (ping, query, roles, save-role)
    pub command: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(backend: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, backend: backend.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Backend (empty string if the failure is not backend-specific)
    pub backend: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(backend: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, backend: backend.into(), command: command.into(), error }
    }

    /// Create error envelope from `DbConnectError`
    pub fn from_error(
        backend: impl Into<String>,
        command: impl Into<String>,
        err: &DbConnectError,
    ) -> Self {
        Self::new(
            backend,
            command,
            ErrorInfo { code: err.error_code().to_string(), message: err.message() },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "SOCKET_NOT_FOUND", "CONNECTION_FAILED")
    pub code: String,

    /// Human-readable error message (no credentials)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    pub const fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}

/// `ping` payload: the connection after preflight
#[derive(Debug, Clone, Serialize)]
pub struct PingData {
    pub role: String,
    pub driver: String,
    pub label: String,
    pub state: String,
}

/// `query` payload
#[derive(Debug, Clone, Serialize)]
pub struct QueryData {
    pub columns: Vec<ColumnDescription>,
    pub rows: Vec<Row>,
    /// Rows affected or returned, as reported by the driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new(
            "postgres",
            "query",
            serde_json::json!({"result": "test"}),
            Metadata::with_rows(42, 10),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""backend":"postgres"#));
        assert!(json.contains(r#""command":"query"#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(json.contains(r#""rows_returned":10"#));
    }

    #[test]
    fn test_error_envelope_serialization() {
        let envelope = ErrorEnvelope::new(
            "oracle",
            "ping",
            ErrorInfo::new("CONNECTION_FAILED", "Could not connect to database"),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":false"#));
        assert!(json.contains(r#""backend":"oracle"#));
        assert!(json.contains(r#""code":"CONNECTION_FAILED"#));
        assert!(json.contains(r#""message":"Could not connect to database"#));
    }

    #[test]
    fn test_error_envelope_from_socket_error() {
        let err = DbConnectError::socket_not_found("/var/run/postgresql/.s.PGSQL.5432");
        let envelope = ErrorEnvelope::from_error("postgres", "ping", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.error.code, "SOCKET_NOT_FOUND");
        assert!(envelope.error.message.contains(".s.PGSQL.5432"));
    }

    #[test]
    fn test_metadata_without_rows() {
        let json = serde_json::to_string(&Metadata::new(100)).unwrap();
        assert!(json.contains(r#""execution_ms":100"#));
        assert!(!json.contains("rows_returned"));
    }

    #[test]
    fn test_query_data_serialization() {
        let data = QueryData {
            columns: vec![ColumnDescription::new("id", "int8")],
            rows: vec![vec![Value::Int(1)], vec![Value::Null]],
            row_count: Some(2),
        };

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["rows"], serde_json::json!([[1], [null]]));
        assert_eq!(json["columns"][0]["name"], "id");
        assert_eq!(json["row_count"], 2);
    }
}
