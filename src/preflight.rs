//! Preflight Functions
//!
//! Session setup run exactly once on every new physical connection, inside
//! `Connector::connect`, before the connection is handed to anyone.
//!
//! Both preflights leave the connection outside any transaction: DB-API style
//! drivers open one implicitly on the first statement, and a pooled or reused
//! connection must not carry it along.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::ConnectionAdapter;
use crate::cursor::CursorAdapter;
use crate::error::Result;

/// Default bound on any single Postgres statement
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_millis(30_000);

pub const ORACLE_TIMESTAMP_FORMAT: &str =
    "alter session set NLS_TIMESTAMP_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF'";
pub const ORACLE_TIMESTAMP_TZ_FORMAT: &str =
    "alter session set NLS_TIMESTAMP_TZ_FORMAT = 'YYYY-MM-DD HH:MI:SS.FF+TZH:TZM'";

/// Session initializer bound into a connector
#[async_trait]
pub trait Preflight: Send + Sync + fmt::Debug {
    async fn run(&self, connection: &mut ConnectionAdapter) -> Result<()>;
}

/// Postgres family: standard strings, finite statement timeout, commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostgresPreflight {
    pub statement_timeout: Duration,
}

impl Default for PostgresPreflight {
    fn default() -> Self {
        Self { statement_timeout: DEFAULT_STATEMENT_TIMEOUT }
    }
}

impl PostgresPreflight {
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        vec![
            // Without this, backslashes in literals are escapes and parameter
            // interpolation by string-quoting drivers becomes injectable.
            "set standard_conforming_strings=on".to_string(),
            format!("set statement_timeout={}", self.statement_timeout.as_millis()),
        ]
    }
}

#[async_trait]
impl Preflight for PostgresPreflight {
    async fn run(&self, connection: &mut ConnectionAdapter) -> Result<()> {
        run_session_setup(connection, &self.statements()).await
    }
}

/// Oracle family: canonical timestamp output formats, commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OraclePreflight;

impl OraclePreflight {
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        vec![ORACLE_TIMESTAMP_FORMAT.to_string(), ORACLE_TIMESTAMP_TZ_FORMAT.to_string()]
    }
}

#[async_trait]
impl Preflight for OraclePreflight {
    async fn run(&self, connection: &mut ConnectionAdapter) -> Result<()> {
        run_session_setup(connection, &self.statements()).await
    }
}

/// Execute `statements` on a scratch cursor, commit, close the cursor
///
/// The cursor is closed on failure too; the error from the statement wins.
async fn run_session_setup(connection: &mut ConnectionAdapter, statements: &[String]) -> Result<()> {
    tracing::debug!(label = %connection.label(), "running preflight");

    let mut cursor = connection.cursor().await?;
    let outcome = match execute_all(&mut cursor, statements).await {
        Ok(()) => connection.commit().await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            cursor.close().await?;
            tracing::debug!(label = %connection.label(), "preflight complete");
            Ok(())
        }
        Err(e) => {
            if let Err(close_err) = cursor.close().await {
                tracing::warn!(label = %connection.label(), error = %close_err, "failed to close preflight cursor");
            }
            Err(e)
        }
    }
}

async fn execute_all(cursor: &mut CursorAdapter, statements: &[String]) -> Result<()> {
    for sql in statements {
        cursor.execute(sql, &[]).await?;
    }
    Ok(())
}
