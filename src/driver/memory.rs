//! In-Memory Scripted Driver
//!
//! A native driver that talks to no database. It records every call made
//! against it and answers statements from a script, which makes the adapter,
//! preflight and connector behavior observable without a server.
//!
//! # Example
//! ```
//! use dbconnect::driver::memory::{MemoryCell, MemoryDriver, MemoryResult};
//! use dbconnect::Value;
//!
//! let driver = MemoryDriver::new()
//!     .with_result(
//!         "select name from home",
//!         MemoryResult::new(&["name"]).row(vec![MemoryCell::Value(Value::from("alice"))]),
//!     )
//!     .fail_on("select broken", "syntax error at or near \"broken\"");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::driver::{
    BindArg, ConnectArgs, LobLocator, NativeConnection, NativeCursor, NativeDriver, NativeVar,
};
use crate::error::{DbConnectError, Result};
use crate::value::{ColumnDescription, NativeType, NativeValue, Value};

/// A native call observed by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEvent {
    Connect(ConnectArgs),
    Cursor,
    Execute { sql: String, args: Vec<RecordedArg> },
    Var { native_type: NativeType, size: usize },
    FetchAll,
    CursorClose,
    CallProc { name: String, args: Vec<Value> },
    CallFunc { name: String, return_type: NativeType, args: Vec<Value> },
    Commit,
    Rollback,
    Close,
}

/// Statement argument as the driver received it
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedArg {
    Value(Value),
    Var { native_type: NativeType, size: usize, value: Option<Value> },
}

/// Scripted column value
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryCell {
    Value(Value),
    Clob(String),
    Nclob(String),
    Blob(Vec<u8>),
}

impl MemoryCell {
    fn into_native(self) -> NativeValue {
        match self {
            Self::Value(v) => NativeValue::Plain(v),
            Self::Clob(text) => NativeValue::Lob(Arc::new(MemoryLob::Text(NativeType::Clob, text))),
            Self::Nclob(text) => {
                NativeValue::Lob(Arc::new(MemoryLob::Text(NativeType::Nclob, text)))
            }
            Self::Blob(bytes) => NativeValue::Lob(Arc::new(MemoryLob::Binary(bytes))),
        }
    }
}

/// Scripted statement result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryResult {
    columns: Vec<ColumnDescription>,
    rows: Vec<Vec<MemoryCell>>,
    affected: Option<u64>,
}

impl MemoryResult {
    /// Result set with the given column names
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| ColumnDescription::new(*c, "text")).collect(),
            ..Default::default()
        }
    }

    /// Statement without a result set that touched `rows` rows
    pub fn affected(rows: u64) -> Self {
        Self { affected: Some(rows), ..Default::default() }
    }

    #[must_use]
    pub fn row(mut self, cells: Vec<MemoryCell>) -> Self {
        self.rows.push(cells);
        self
    }
}

#[derive(Debug, Default)]
struct Shared {
    results: HashMap<String, MemoryResult>,
    failures: HashMap<String, String>,
    connect_failure: Option<String>,
    commit_failure: Option<String>,
    close_failure: Option<String>,
    events: Vec<MemoryEvent>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn record(shared: &Mutex<Shared>, event: MemoryEvent) {
    lock(shared).events.push(event);
}

/// Scripted in-memory driver
///
/// Clones share the same script and event log.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `result`
    #[must_use]
    pub fn with_result(self, sql: impl Into<String>, result: MemoryResult) -> Self {
        lock(&self.shared).results.insert(sql.into(), result);
        self
    }

    /// Fail every execution of `sql`
    #[must_use]
    pub fn fail_on(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        lock(&self.shared).failures.insert(sql.into(), message.into());
        self
    }

    /// Fail every physical connect
    #[must_use]
    pub fn fail_connect(self, message: impl Into<String>) -> Self {
        lock(&self.shared).connect_failure = Some(message.into());
        self
    }

    /// Fail every commit
    #[must_use]
    pub fn fail_commit(self, message: impl Into<String>) -> Self {
        lock(&self.shared).commit_failure = Some(message.into());
        self
    }

    /// Fail every connection and cursor close, after recording it
    #[must_use]
    pub fn fail_close(self, message: impl Into<String>) -> Self {
        lock(&self.shared).close_failure = Some(message.into());
        self
    }

    /// All recorded calls, oldest first
    pub fn events(&self) -> Vec<MemoryEvent> {
        lock(&self.shared).events.clone()
    }

    /// SQL of every recorded execution, oldest first
    pub fn executed_sql(&self) -> Vec<String> {
        lock(&self.shared)
            .events
            .iter()
            .filter_map(|event| match event {
                MemoryEvent::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.shared).events.iter().filter(|e| matches!(e, MemoryEvent::Connect(_))).count()
    }

    pub fn clear_events(&self) {
        lock(&self.shared).events.clear();
    }
}

#[async_trait]
impl NativeDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, args: &ConnectArgs) -> Result<Box<dyn NativeConnection>> {
        let mut shared = lock(&self.shared);
        if let Some(message) = &shared.connect_failure {
            return Err(DbConnectError::connection_failed(message.clone()));
        }
        shared.events.push(MemoryEvent::Connect(args.clone()));
        drop(shared);

        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Mutex<Shared>>,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        ensure_open(&self.closed)
    }
}

fn close_result(shared: &Mutex<Shared>) -> Result<()> {
    match &lock(shared).close_failure {
        Some(message) => Err(DbConnectError::connection_failed(message.clone())),
        None => Ok(()),
    }
}

fn ensure_open(closed: &AtomicBool) -> Result<()> {
    if closed.load(Ordering::SeqCst) {
        return Err(DbConnectError::connection_failed("connection is closed"));
    }
    Ok(())
}

#[async_trait]
impl NativeConnection for MemoryConnection {
    async fn cursor(&self) -> Result<Box<dyn NativeCursor>> {
        self.ensure_open()?;
        record(&self.shared, MemoryEvent::Cursor);
        Ok(Box::new(MemoryCursor {
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
            cursor_closed: false,
            pending: Vec::new(),
            description: None,
            row_count: None,
        }))
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut shared = lock(&self.shared);
        if let Some(message) = &shared.commit_failure {
            return Err(DbConnectError::query_failed(message.clone()));
        }
        shared.events.push(MemoryEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        record(&self.shared, MemoryEvent::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        record(&self.shared, MemoryEvent::Close);
        close_result(&self.shared)
    }
}

struct MemoryCursor {
    shared: Arc<Mutex<Shared>>,
    closed: Arc<AtomicBool>,
    cursor_closed: bool,
    pending: Vec<Vec<NativeValue>>,
    description: Option<Vec<ColumnDescription>>,
    row_count: Option<u64>,
}

impl MemoryCursor {
    fn ensure_open(&self) -> Result<()> {
        ensure_open(&self.closed)?;
        if self.cursor_closed {
            return Err(DbConnectError::query_failed("cursor is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl NativeCursor for MemoryCursor {
    async fn execute(&mut self, sql: &str, args: Vec<BindArg>) -> Result<()> {
        self.ensure_open()?;

        let recorded = args
            .iter()
            .map(|arg| match arg {
                BindArg::Value(v) => RecordedArg::Value(v.clone()),
                BindArg::Var(var) => RecordedArg::Var {
                    native_type: var.native_type(),
                    size: var.size(),
                    value: var.get_value(0),
                },
            })
            .collect();

        let mut shared = lock(&self.shared);
        shared.events.push(MemoryEvent::Execute { sql: sql.to_string(), args: recorded });

        if let Some(message) = shared.failures.get(sql) {
            return Err(DbConnectError::query_failed(message.clone()));
        }

        let result = shared.results.get(sql).cloned().unwrap_or_default();
        drop(shared);

        if result.columns.is_empty() {
            self.description = None;
            self.pending = Vec::new();
            self.row_count = Some(result.affected.unwrap_or(0));
        } else {
            self.row_count = Some(result.rows.len() as u64);
            self.description = Some(result.columns);
            self.pending = result
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(MemoryCell::into_native).collect())
                .collect();
        }

        Ok(())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Vec<NativeValue>>> {
        self.ensure_open()?;
        record(&self.shared, MemoryEvent::FetchAll);
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) -> Result<()> {
        self.cursor_closed = true;
        record(&self.shared, MemoryEvent::CursorClose);
        close_result(&self.shared)
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }

    fn var(&mut self, native_type: NativeType, size: usize) -> Result<Box<dyn NativeVar>> {
        self.ensure_open()?;
        record(&self.shared, MemoryEvent::Var { native_type, size });
        Ok(Box::new(MemoryVar { native_type, size, value: None }))
    }

    async fn call_proc(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        self.ensure_open()?;
        record(&self.shared, MemoryEvent::CallProc { name: name.to_string(), args: args.clone() });
        Ok(args)
    }

    async fn call_func(
        &mut self,
        name: &str,
        return_type: NativeType,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.ensure_open()?;
        record(
            &self.shared,
            MemoryEvent::CallFunc { name: name.to_string(), return_type, args },
        );
        Ok(Value::Null)
    }
}

/// Single-slot bind variable
#[derive(Debug)]
struct MemoryVar {
    native_type: NativeType,
    size: usize,
    value: Option<Value>,
}

impl NativeVar for MemoryVar {
    fn native_type(&self) -> NativeType {
        self.native_type
    }

    fn size(&self) -> usize {
        self.size
    }

    fn set_value(&mut self, pos: usize, value: Value) -> Result<()> {
        if pos != 0 {
            return Err(DbConnectError::invalid_input(format!(
                "position {pos} out of range for a single-slot variable"
            )));
        }
        if let Value::Text(text) = &value {
            let len = text.chars().count();
            if len > self.size {
                return Err(DbConnectError::invalid_input(format!(
                    "value of {len} characters exceeds variable size {}",
                    self.size
                )));
            }
        }
        self.value = Some(value);
        Ok(())
    }

    fn get_value(&self, pos: usize) -> Option<Value> {
        if pos == 0 {
            self.value.clone()
        } else {
            None
        }
    }
}

#[derive(Debug)]
enum MemoryLob {
    Text(NativeType, String),
    Binary(Vec<u8>),
}

#[async_trait]
impl LobLocator for MemoryLob {
    fn lob_type(&self) -> NativeType {
        match self {
            Self::Text(native_type, _) => *native_type,
            Self::Binary(_) => NativeType::Blob,
        }
    }

    async fn read_text(&self) -> Result<String> {
        match self {
            Self::Text(_, text) => Ok(text.clone()),
            Self::Binary(_) => Err(DbConnectError::unsupported("BLOB cannot be read as text")),
        }
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Text(_, text) => Ok(text.clone().into_bytes()),
            Self::Binary(bytes) => Ok(bytes.clone()),
        }
    }
}
