//! dbconnect - Uniform Database Connection Layer
//!
//! dbconnect gives calling code one connection/cursor interface over
//! PostgreSQL and Oracle, whichever native driver family is installed.
//!
//! # Core Principles
//! - One factory call turns a backend name and an endpoint string into a
//!   reusable connector
//! - Every new physical connection runs a backend-specific preflight before
//!   anyone else sees it
//! - Each connection carries a human-readable label and a diagnostic state
//!   for watchdog/debugging output
//! - Oracle large-object handling (NCLOB binding, LOB materialization) is
//!   hidden behind the same cursor interface
//!
//! # Module Organization
//! - [`endpoint`] - Endpoint parsing and connection parameter resolution
//! - [`connector`] - Connector factory, per-driver builders, connect flow
//! - [`connection`] - Connection adapter and diagnostic state
//! - [`cursor`] - Cursor adapter and cursor flavors
//! - [`preflight`] - Session setup run on every new connection
//! - [`driver`] - Native driver traits plus built-in drivers
//! - [`environment`] - Oracle client environment bootstrap
//! - [`fs`] - Socket filesystem probes
//! - [`value`] - Bind/result value types
//! - [`config`] - Named role registry
//! - [`output`] - JSON output envelope types
//! - [`error`] - Error types and handling

pub mod config;
pub mod connection;
pub mod connector;
pub mod cursor;
pub mod driver;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod fs;
pub mod output;
pub mod preflight;
pub mod value;

// Re-export commonly used types for convenience
pub use connection::{ConnectionAdapter, DiagnosticState};
pub use connector::{BackendType, Connector, ConnectorFactory, ConnectorSettings};
pub use cursor::{CursorAdapter, CursorFlavor, LargeObjectOptions};
pub use driver::DriverKind;
pub use endpoint::{ConnectOptions, ConnectionParameters, Endpoint};
pub use environment::{init_oracle_environment, oracle_environment_ready};
pub use error::{DbConnectError, Result};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use preflight::{OraclePreflight, PostgresPreflight, Preflight};
pub use value::{ColumnDescription, Row, Value};
