//! Cursor Adapter
//!
//! Wraps a native cursor behind a uniform execute/fetch contract. The
//! backend-specific behavior is a [`CursorFlavor`] chosen when the connector is
//! built:
//!
//! - `Plain`: arguments and rows pass through untouched.
//! - `LargeObject`: byte-string arguments are decoded to text, long strings
//!   are bound through explicit NCLOB variables, and every output column is
//!   run through an [`OutputTypeMapper`] so LOB handles never reach callers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::{executing_state, DiagnosticState};
use crate::driver::{BindArg, NativeCursor};
use crate::error::{DbConnectError, Result};
use crate::value::{ColumnDescription, NativeType, NativeValue, Row, Value};

/// Strings longer than this many characters are bound as NCLOB variables
pub const DEFAULT_LOB_THRESHOLD: usize = 1024;

/// Converts one native output column into a plain value
#[async_trait]
pub trait OutputTypeMapper: Send + Sync + fmt::Debug {
    async fn map_output(&self, value: NativeValue) -> Result<Value>;
}

/// Reads large-object handles fully into memory
///
/// Character LOBs become `Value::Text`, binary LOBs become `Value::Bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LobMaterializer;

#[async_trait]
impl OutputTypeMapper for LobMaterializer {
    async fn map_output(&self, value: NativeValue) -> Result<Value> {
        match value {
            NativeValue::Plain(v) => Ok(v),
            NativeValue::Lob(lob) => match lob.lob_type() {
                NativeType::Blob => Ok(Value::Bytes(lob.read_bytes().await?)),
                _ => Ok(Value::Text(lob.read_text().await?)),
            },
        }
    }
}

/// Settings for the large-object cursor flavor
#[derive(Debug, Clone)]
pub struct LargeObjectOptions {
    /// Character count above which strings are bound as NCLOB variables
    pub threshold: usize,
    pub mapper: Arc<dyn OutputTypeMapper>,
}

impl Default for LargeObjectOptions {
    fn default() -> Self {
        Self { threshold: DEFAULT_LOB_THRESHOLD, mapper: Arc::new(LobMaterializer) }
    }
}

/// Backend-specific cursor behavior
#[derive(Debug, Clone, Default)]
pub enum CursorFlavor {
    #[default]
    Plain,
    LargeObject(LargeObjectOptions),
}

/// Uniform wrapper around a native cursor
pub struct CursorAdapter {
    native: Box<dyn NativeCursor>,
    state: DiagnosticState,
    flavor: CursorFlavor,
}

impl CursorAdapter {
    pub fn new(native: Box<dyn NativeCursor>, state: DiagnosticState, flavor: CursorFlavor) -> Self {
        Self { native, state, flavor }
    }

    /// Execute a statement
    ///
    /// The parent connection's state is updated before anything else happens,
    /// so it names this statement even when binding or execution fails.
    pub async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<()> {
        self.state.set(executing_state(sql));
        tracing::trace!(sql, "executing statement");

        let bound: Vec<BindArg> = match &self.flavor {
            CursorFlavor::Plain => args.iter().cloned().map(BindArg::Value).collect(),
            CursorFlavor::LargeObject(options) => {
                bind_large_objects(self.native.as_mut(), args, options.threshold)?
            }
        };

        self.native.execute(sql, bound).await
    }

    /// Fetch every remaining row of the current result set
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let rows = self.native.fetch_all().await?;

        match &self.flavor {
            CursorFlavor::Plain => rows
                .into_iter()
                .map(|row| row.into_iter().map(plain_value).collect::<Result<Row>>())
                .collect(),
            CursorFlavor::LargeObject(options) => {
                let mut mapped = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut values = Vec::with_capacity(row.len());
                    for column in row {
                        values.push(options.mapper.map_output(column).await?);
                    }
                    mapped.push(values);
                }
                Ok(mapped)
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.native.close().await
    }

    #[must_use]
    pub fn row_count(&self) -> Option<u64> {
        self.native.row_count()
    }

    #[must_use]
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.native.description()
    }

    /// Forward a stored-procedure call to the native cursor, unmodified
    pub async fn call_procedure(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        self.require_native_calls("procedure")?;
        self.native.call_proc(name, args).await
    }

    /// Forward a stored-function call to the native cursor, unmodified
    pub async fn call_function(
        &mut self,
        name: &str,
        return_type: NativeType,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.require_native_calls("function")?;
        self.native.call_func(name, return_type, args).await
    }

    fn require_native_calls(&self, what: &str) -> Result<()> {
        match self.flavor {
            CursorFlavor::LargeObject(_) => Ok(()),
            CursorFlavor::Plain => Err(DbConnectError::unsupported(format!(
                "{what} calls are only forwarded for large-object backends"
            ))),
        }
    }
}

impl fmt::Debug for CursorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorAdapter")
            .field("flavor", &self.flavor)
            .field("row_count", &self.native.row_count())
            .finish_non_exhaustive()
    }
}

fn plain_value(value: NativeValue) -> Result<Value> {
    match value {
        NativeValue::Plain(v) => Ok(v),
        NativeValue::Lob(lob) => Err(DbConnectError::unsupported(format!(
            "{} handle returned to a cursor without large-object support",
            lob.lob_type()
        ))),
    }
}

/// Prepare arguments for a backend whose implicit binding mishandles long strings
fn bind_large_objects(
    native: &mut dyn NativeCursor,
    args: &[Value],
    threshold: usize,
) -> Result<Vec<BindArg>> {
    let mut bound = Vec::with_capacity(args.len());

    for (idx, arg) in args.iter().enumerate() {
        let arg = match arg {
            Value::Bytes(bytes) => Value::Text(String::from_utf8(bytes.clone()).map_err(|e| {
                DbConnectError::invalid_input(format!("argument {idx} is not valid UTF-8: {e}"))
            })?),
            other => other.clone(),
        };

        let text_len = arg.as_str().map(|s| s.chars().count());
        match text_len {
            Some(len) if len > threshold => {
                let mut var = native.var(NativeType::Nclob, len + 1)?;
                var.set_value(0, arg)?;
                bound.push(BindArg::Var(var));
            }
            _ => bound.push(BindArg::Value(arg)),
        }
    }

    Ok(bound)
}
