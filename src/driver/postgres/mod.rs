//! `PostgreSQL` Native Driver
//!
//! Implements the native driver traits on top of `tokio-postgres` for both
//! Postgres driver families:
//! - `ConnectArgs::Dsn`: libpq key/value connection string, optionally with a
//!   `host:port` keyword supplying the port
//! - `ConnectArgs::Postgres`: discrete keywords, TCP or Unix-domain socket;
//!   a socket target connects to that file directly, whatever its name
//!
//! # Implementation Notes
//! - DB-API transaction semantics: the first statement after connect, commit
//!   or rollback opens a transaction (`BEGIN`); commit/rollback close it
//! - Statements are prepared so parameters bind against the server-declared
//!   types, and so statements without a result set report affected rows
//! - Results are buffered on execute and drained by `fetch_all`
//! - BYTEA comes back as bytes, JSON/UUID/DATE/TIME as text
//! - Connection task errors are logged at debug level without connect
//!   arguments, to avoid leaking credentials

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};

use crate::driver::{
    BindArg, ConnectArgs, NativeConnection, NativeCursor, NativeDriver, PostgresArgs,
    PostgresTarget,
};
use crate::error::{DbConnectError, Result};
use crate::value::{ColumnDescription, NativeValue, Value};

/// tokio-postgres backed driver for both Postgres families
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

#[async_trait]
impl NativeDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "tokio-postgres"
    }

    async fn connect(&self, args: &ConnectArgs) -> Result<Box<dyn NativeConnection>> {
        let config = build_pg_config(args)?;

        let (client, task) = match args {
            ConnectArgs::Postgres(PostgresArgs { target: PostgresTarget::UnixSocket(socket), .. }) => {
                connect_socket_file(&config, socket).await?
            }
            _ => {
                let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
                (client, spawn_connection(connection))
            }
        };

        Ok(Box::new(PostgresConnection {
            client: Arc::new(client),
            in_transaction: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            task,
        }))
    }
}

fn connect_error(e: tokio_postgres::Error) -> DbConnectError {
    DbConnectError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
}

fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "PostgreSQL connection ended with error");
        }
    })
}

/// Connect over the resolved socket file itself, whatever its name
#[cfg(unix)]
async fn connect_socket_file(config: &Config, socket: &Path) -> Result<(Client, JoinHandle<()>)> {
    let stream = tokio::net::UnixStream::connect(socket).await.map_err(|e| {
        DbConnectError::connection_failed(format!(
            "Failed to connect to PostgreSQL socket {}: {e}",
            socket.display()
        ))
    })?;
    let (client, connection) = config.connect_raw(stream, NoTls).await.map_err(connect_error)?;
    Ok((client, spawn_connection(connection)))
}

#[cfg(not(unix))]
async fn connect_socket_file(_config: &Config, socket: &Path) -> Result<(Client, JoinHandle<()>)> {
    Err(DbConnectError::unsupported(format!(
        "Unix-domain sockets are not available on this platform: {}",
        socket.display()
    )))
}

/// Build `tokio-postgres` config from bound connect arguments
fn build_pg_config(args: &ConnectArgs) -> Result<Config> {
    match args {
        ConnectArgs::Dsn { dsn, host } => {
            let mut config: Config = dsn.parse().map_err(|e| {
                DbConnectError::invalid_input(format!("Invalid PostgreSQL connection string: {e}"))
            })?;
            if let Some(host) = host {
                apply_host_keyword(&mut config, host)?;
            }
            Ok(config)
        }
        ConnectArgs::Postgres(args) => build_keyword_config(args),
        ConnectArgs::Oracle { .. } => Err(DbConnectError::invalid_input(
            "Oracle connect arguments cannot be used with the PostgreSQL driver",
        )),
    }
}

/// `host:port` keyword: the port applies to the DSN's host
fn apply_host_keyword(config: &mut Config, host: &str) -> Result<()> {
    let (name, port) = host.rsplit_once(':').ok_or_else(|| {
        DbConnectError::invalid_input(format!("PostgreSQL host keyword '{host}' must be host:port"))
    })?;
    let port = port.parse::<u16>().map_err(|_| {
        DbConnectError::invalid_input(format!("PostgreSQL host keyword '{host}' has an invalid port"))
    })?;

    if config.get_hosts().is_empty() {
        config.host(name);
    }
    config.port(port);
    Ok(())
}

fn build_keyword_config(args: &PostgresArgs) -> Result<Config> {
    let mut config = Config::new();

    if let Some(user) = &args.user {
        config.user(user.as_str());
    }
    if let Some(password) = &args.password {
        config.password(password.as_str());
    }
    if let Some(database) = &args.database {
        config.dbname(database.as_str());
    }

    match &args.target {
        PostgresTarget::Tcp { host, port } => {
            config.host(host.as_str());
            if let Some(port) = port {
                config.port(*port);
            }
        }
        // Reached through `connect_raw` on the socket file
        PostgresTarget::UnixSocket(_) => {}
    }

    Ok(config)
}

struct PostgresConnection {
    client: Arc<Client>,
    in_transaction: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PostgresConnection {
    async fn end_transaction(&self, statement: &str) -> Result<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.client.batch_execute(statement).await.map_err(|e| {
                DbConnectError::query_failed(format!("Failed to {statement}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl NativeConnection for PostgresConnection {
    async fn cursor(&self) -> Result<Box<dyn NativeCursor>> {
        if self.closed.load(Ordering::SeqCst) || self.client.is_closed() {
            return Err(DbConnectError::connection_failed("connection is closed"));
        }
        Ok(Box::new(PostgresCursor {
            client: Arc::clone(&self.client),
            in_transaction: Arc::clone(&self.in_transaction),
            connection_closed: Arc::clone(&self.closed),
            pending: Vec::new(),
            description: None,
            row_count: None,
            closed: false,
        }))
    }

    async fn commit(&mut self) -> Result<()> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<()> {
        // The flag stops cursors right away; the socket itself closes once the
        // aborted connection task is dropped by the runtime.
        self.closed.store(true, Ordering::SeqCst);
        self.task.abort();
        self.in_transaction.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct PostgresCursor {
    client: Arc<Client>,
    in_transaction: Arc<AtomicBool>,
    connection_closed: Arc<AtomicBool>,
    pending: Vec<Vec<NativeValue>>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<u64>,
    closed: bool,
}

#[async_trait]
impl NativeCursor for PostgresCursor {
    async fn execute(&mut self, sql: &str, args: Vec<BindArg>) -> Result<()> {
        if self.closed {
            return Err(DbConnectError::query_failed("cursor is closed"));
        }
        if self.connection_closed.load(Ordering::SeqCst) {
            return Err(DbConnectError::connection_failed("connection is closed"));
        }

        let values = args
            .into_iter()
            .map(|arg| match arg {
                BindArg::Value(v) => Ok(v),
                BindArg::Var(var) => Err(DbConnectError::unsupported(format!(
                    "PostgreSQL does not take {} bind variables",
                    var.native_type()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        if !self.in_transaction.load(Ordering::SeqCst) {
            self.client.batch_execute("BEGIN").await.map_err(|e| {
                DbConnectError::query_failed(format!("Failed to begin transaction: {e}"))
            })?;
            self.in_transaction.store(true, Ordering::SeqCst);
        }

        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| DbConnectError::query_failed(format!("Failed to prepare query: {e}")))?;

        if stmt.params().len() != values.len() {
            return Err(DbConnectError::invalid_input(format!(
                "Statement expects {} parameters, got {}",
                stmt.params().len(),
                values.len()
            )));
        }

        let params = values
            .iter()
            .zip(stmt.params())
            .map(|(value, ty)| to_sql_param(value, ty))
            .collect::<Result<Vec<_>>>()?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            // No result set (INSERT, UPDATE, DELETE, DDL, SET)
            let rows_affected = self
                .client
                .execute(&stmt, &param_refs)
                .await
                .map_err(|e| DbConnectError::query_failed(format!("Failed to execute query: {e}")))?;

            self.description = None;
            self.pending = Vec::new();
            self.row_count = Some(rows_affected);
        } else {
            let rows = self
                .client
                .query(&stmt, &param_refs)
                .await
                .map_err(|e| DbConnectError::query_failed(format!("Failed to execute query: {e}")))?;

            self.description = Some(
                stmt.columns()
                    .iter()
                    .map(|c| ColumnDescription::new(c.name(), c.type_().name()))
                    .collect(),
            );
            self.row_count = Some(rows.len() as u64);
            self.pending = rows
                .iter()
                .map(|row| {
                    (0..row.len())
                        .map(|idx| postgres_value(row, idx).map(NativeValue::Plain))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Vec<NativeValue>>> {
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.pending = Vec::new();
        Ok(())
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }
}

/// NULL typed to match the declared parameter type
fn null_for(ty: &Type) -> Box<dyn ToSql + Sync + Send> {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::JSON | Type::JSONB => Box::new(None::<serde_json::Value>),
        Type::UUID => Box::new(None::<uuid::Uuid>),
        _ => Box::new(None::<String>),
    }
}

fn out_of_range(value: i64, ty: &Type) -> DbConnectError {
    DbConnectError::invalid_input(format!("Integer {value} out of range for {}", ty.name()))
}

fn parse_text<T: std::str::FromStr>(text: &str, ty: &Type) -> Result<T> {
    text.trim().parse::<T>().map_err(|_| {
        DbConnectError::invalid_input(format!("Cannot bind '{text}' as {}", ty.name()))
    })
}

/// Convert a `Value` to a boxed parameter accepted by the declared type
fn to_sql_param(value: &Value, ty: &Type) -> Result<Box<dyn ToSql + Sync + Send>> {
    let param: Box<dyn ToSql + Sync + Send> = match value {
        Value::Null => null_for(ty),
        Value::Bool(v) => Box::new(*v),
        Value::Int(v) => match *ty {
            Type::INT2 => Box::new(i16::try_from(*v).map_err(|_| out_of_range(*v, ty))?),
            Type::INT4 => Box::new(i32::try_from(*v).map_err(|_| out_of_range(*v, ty))?),
            Type::FLOAT4 => Box::new(*v as f32),
            Type::FLOAT8 => Box::new(*v as f64),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(v.to_string()),
            _ => Box::new(*v),
        },
        Value::Float(v) => match *ty {
            Type::FLOAT4 => Box::new(*v as f32),
            _ => Box::new(*v),
        },
        Value::Text(v) => match *ty {
            Type::BOOL => Box::new(parse_text::<bool>(v, ty)?),
            Type::INT2 => Box::new(parse_text::<i16>(v, ty)?),
            Type::INT4 => Box::new(parse_text::<i32>(v, ty)?),
            Type::INT8 => Box::new(parse_text::<i64>(v, ty)?),
            Type::FLOAT4 => Box::new(parse_text::<f32>(v, ty)?),
            Type::FLOAT8 => Box::new(parse_text::<f64>(v, ty)?),
            Type::JSON | Type::JSONB => {
                Box::new(serde_json::from_str::<serde_json::Value>(v).map_err(|e| {
                    DbConnectError::invalid_input(format!("Invalid JSON parameter: {e}"))
                })?)
            }
            Type::UUID => Box::new(uuid::Uuid::parse_str(v).map_err(|e| {
                DbConnectError::invalid_input(format!("Invalid UUID parameter: {e}"))
            })?),
            _ => Box::new(v.clone()),
        },
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Timestamp(v) => match *ty {
            Type::TIMESTAMPTZ => Box::new(Utc.from_utc_datetime(v)),
            _ => Box::new(*v),
        },
    };
    Ok(param)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        DbConnectError::query_failed(format!("Failed to decode column {idx}: {e}"))
    })
}

/// Convert `PostgreSQL` value to a plain `Value`
fn postgres_value(row: &Row, idx: usize) -> Result<Value> {
    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),

        // Integers
        Type::INT2 => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),

        // Floats
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),

        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),

        // Timestamps
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx)?.map(|v| Value::Timestamp(v.naive_utc()))
        }
        Type::DATE => {
            get::<NaiveDate>(row, idx)?.map(|v| Value::Text(v.format("%Y-%m-%d").to_string()))
        }
        Type::TIME => get::<NaiveTime>(row, idx)?
            .map(|v| Value::Text(v.format("%H:%M:%S%.f").to_string())),

        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx)?.map(|v| Value::Text(v.to_string()))
        }
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::Text(v.to_string())),

        // Default: try to get as string
        _ => get::<String>(row, idx)
            .map_err(|_| {
                DbConnectError::query_failed(format!(
                    "Unsupported PostgreSQL type '{}' in column {idx}",
                    col_type.name()
                ))
            })?
            .map(Value::Text),
    };

    Ok(value.unwrap_or(Value::Null))
}
