//! Column and parameter values
//!
//! `Value` is the plain, in-memory representation handed to and returned from
//! the adapters. `NativeValue` is what a native cursor produces, which may
//! still hold a large-object handle that has not been read yet.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::driver::LobLocator;

/// Plain parameter or column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

// BYTEA/BLOB data is Base64-encoded for JSON safety
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Self::Float(_) => serializer.serialize_none(),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(v))
            }
            Self::Timestamp(v) => {
                serializer.serialize_str(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Native type tags used for bind variables and function return types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    Bool,
    Integer,
    Float,
    Text,
    Bytes,
    Timestamp,
    Clob,
    Nclob,
    Blob,
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "BOOLEAN",
            Self::Integer => "NUMBER",
            Self::Float => "BINARY_DOUBLE",
            Self::Text => "NVARCHAR2",
            Self::Bytes => "RAW",
            Self::Timestamp => "TIMESTAMP",
            Self::Clob => "CLOB",
            Self::Nclob => "NCLOB",
            Self::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Value as produced by a native cursor
#[derive(Debug, Clone)]
pub enum NativeValue {
    Plain(Value),
    /// Unread large-object handle
    Lob(Arc<dyn LobLocator>),
}

impl From<Value> for NativeValue {
    fn from(v: Value) -> Self {
        Self::Plain(v)
    }
}

/// A fetched row of plain values
pub type Row = Vec<Value>;

/// Result-set column metadata (DB-API `description` entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    /// Column name
    pub name: String,

    /// Backend type name
    pub type_name: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}
