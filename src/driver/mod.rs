//! Native Driver Traits and Connect Arguments
//!
//! This module defines the seam between the adapters and the native database
//! drivers. Each driver family implements `NativeDriver`, which hands out
//! `NativeConnection`s and, through them, `NativeCursor`s.
//!
//! # Driver Isolation
//! The adapters never look behind these traits. Large-object variables,
//! procedure calls and LOB handles are optional capabilities: the default
//! method bodies report `Unsupported`.
//!
//! # Built-in Drivers
//! - [`postgres`] - tokio-postgres, both Postgres driver families
//! - [`memory`] - scripted in-memory driver for tests and benchmarks
//!
//! Oracle drivers are registered by the host process.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::endpoint::REDACTED;
use crate::error::{DbConnectError, Result};
use crate::value::{ColumnDescription, NativeType, NativeValue, Value};

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Native driver families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// Postgres driver consuming a single DSN string
    PostgresLegacy,
    /// Postgres driver consuming discrete keyword arguments
    PostgresModern,
    /// Oracle driver consuming `user/password@host:port/database`
    Oracle,
}

impl DriverKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PostgresLegacy => "postgres-legacy",
            Self::PostgresModern => "postgres-modern",
            Self::Oracle => "oracle",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = DbConnectError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postgres-legacy" => Ok(Self::PostgresLegacy),
            "postgres-modern" => Ok(Self::PostgresModern),
            "oracle" => Ok(Self::Oracle),
            other => Err(DbConnectError::unknown_driver_module(other)),
        }
    }
}

/// Where a keyword-style Postgres driver should connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostgresTarget {
    /// Full path to the socket file, dialed as-is
    UnixSocket(PathBuf),
    Tcp { host: String, port: Option<u16> },
}

/// Discrete keyword arguments for the modern Postgres driver family
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresArgs {
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub target: PostgresTarget,
}

/// Arguments bound into a connector and replayed on every physical connect
///
/// WARNING: contains credentials, do not log. `Debug` hides them.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectArgs {
    /// Legacy Postgres: DSN string plus optional `host:port` keyword
    Dsn { dsn: String, host: Option<String> },
    /// Modern Postgres keyword arguments
    Postgres(PostgresArgs),
    /// Oracle DSN with threaded mode flag
    Oracle { dsn: String, threaded: bool },
}

impl fmt::Debug for PostgresArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresArgs")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .field("target", &self.target)
            .finish()
    }
}

// Both DSN forms embed the password, so the whole string is hidden
impl fmt::Debug for ConnectArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dsn { host, .. } => {
                f.debug_struct("Dsn").field("dsn", &REDACTED).field("host", host).finish()
            }
            Self::Postgres(args) => f.debug_tuple("Postgres").field(args).finish(),
            Self::Oracle { threaded, .. } => f
                .debug_struct("Oracle")
                .field("dsn", &REDACTED)
                .field("threaded", threaded)
                .finish(),
        }
    }
}

/// Statement argument as handed to a native cursor
#[derive(Debug)]
pub enum BindArg {
    Value(Value),
    /// Explicit bind variable created through `NativeCursor::var`
    Var(Box<dyn NativeVar>),
}

impl From<Value> for BindArg {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// Native bind variable (e.g. an NCLOB variable sized for one value)
pub trait NativeVar: Send + Sync + fmt::Debug {
    fn native_type(&self) -> NativeType;

    /// Allocated size, in characters for character types
    fn size(&self) -> usize;

    fn set_value(&mut self, pos: usize, value: Value) -> Result<()>;

    fn get_value(&self, pos: usize) -> Option<Value>;
}

/// Unread large-object handle returned in a result row
#[async_trait]
pub trait LobLocator: Send + Sync + fmt::Debug {
    fn lob_type(&self) -> NativeType;

    /// Read a character LOB fully into memory
    async fn read_text(&self) -> Result<String>;

    /// Read a binary LOB fully into memory
    async fn read_bytes(&self) -> Result<Vec<u8>>;
}

/// Native driver entry point
#[async_trait]
pub trait NativeDriver: Send + Sync {
    /// Driver name used in log events and error messages
    fn name(&self) -> &'static str;

    /// Open a physical connection
    async fn connect(&self, args: &ConnectArgs) -> Result<Box<dyn NativeConnection>>;
}

/// Native physical connection
#[async_trait]
pub trait NativeConnection: Send + Sync {
    async fn cursor(&self) -> Result<Box<dyn NativeCursor>>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Native cursor
#[async_trait]
pub trait NativeCursor: Send + Sync {
    async fn execute(&mut self, sql: &str, args: Vec<BindArg>) -> Result<()>;

    /// Drain the pending result set
    async fn fetch_all(&mut self) -> Result<Vec<Vec<NativeValue>>>;

    async fn close(&mut self) -> Result<()>;

    /// Rows produced or affected by the last statement, if known
    fn row_count(&self) -> Option<u64>;

    /// Result-set columns of the last statement, `None` if it produced no rows
    fn description(&self) -> Option<&[ColumnDescription]>;

    /// Create a bind variable of the given type and size
    fn var(&mut self, native_type: NativeType, size: usize) -> Result<Box<dyn NativeVar>> {
        let _ = size;
        Err(DbConnectError::unsupported(format!(
            "driver does not support {native_type} bind variables"
        )))
    }

    /// Call a stored procedure, returning the (possibly modified) arguments
    async fn call_proc(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let _ = args;
        Err(DbConnectError::unsupported(format!("driver cannot call procedure {name}")))
    }

    /// Call a stored function with a declared return type
    async fn call_func(
        &mut self,
        name: &str,
        return_type: NativeType,
        args: Vec<Value>,
    ) -> Result<Value> {
        let _ = (return_type, args);
        Err(DbConnectError::unsupported(format!("driver cannot call function {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&DriverKind::PostgresLegacy).unwrap(),
            r#""postgres-legacy""#
        );
        assert_eq!(
            serde_json::from_str::<DriverKind>(r#""postgres-modern""#).unwrap(),
            DriverKind::PostgresModern
        );
        assert_eq!(DriverKind::Oracle.to_string(), "oracle");
    }

    #[test]
    fn test_driver_kind_from_str() {
        assert_eq!("postgres-legacy".parse::<DriverKind>().unwrap(), DriverKind::PostgresLegacy);
        let err = "psycopg3".parse::<DriverKind>().unwrap_err();
        assert!(matches!(err, DbConnectError::UnknownDriverModule(ref m) if m == "psycopg3"));
    }
}
