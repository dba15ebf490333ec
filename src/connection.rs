//! Connection Adapter
//!
//! Wraps one native connection and records a coarse, human-readable status
//! string describing what the connection is doing. The status is a debugging
//! aid for an external inspector (e.g. a watchdog looking at a hung worker);
//! nothing in this crate reads it to make decisions.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cursor::{CursorAdapter, CursorFlavor};
use crate::driver::NativeConnection;
use crate::error::Result;

/// Label used when `connect` is not given one
pub const DEFAULT_LABEL: &str = "<unlabeled>";

pub const STATE_START: &str = "idle (start)";
pub const STATE_AFTER_COMMIT: &str = "idle (after commit)";
pub const STATE_AFTER_ROLLBACK: &str = "idle (after rollback)";
pub const STATE_CLOSED: &str = "closed";

/// Shared, non-authoritative status string
///
/// Cloning yields another handle to the same status. Not synchronized with
/// the operations it describes.
#[derive(Debug, Clone)]
pub struct DiagnosticState(Arc<RwLock<String>>);

impl DiagnosticState {
    pub fn new(initial: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(initial.into())))
    }

    pub fn set(&self, state: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state.into();
    }

    #[must_use]
    pub fn get(&self) -> String {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl fmt::Display for DiagnosticState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get())
    }
}

/// Status string recorded just before a statement is dispatched
#[must_use]
pub fn executing_state(sql: &str) -> String {
    format!("executing {sql:?}")
}

/// Uniform wrapper around a native connection
pub struct ConnectionAdapter {
    native: Box<dyn NativeConnection>,
    label: String,
    state: DiagnosticState,
    flavor: CursorFlavor,
}

impl ConnectionAdapter {
    pub fn new(
        native: Box<dyn NativeConnection>,
        label: impl Into<String>,
        flavor: CursorFlavor,
    ) -> Self {
        Self { native, label: label.into(), state: DiagnosticState::new(STATE_START), flavor }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current status string
    #[must_use]
    pub fn state(&self) -> String {
        self.state.get()
    }

    /// Handle for reading the status from elsewhere (e.g. a watchdog task)
    #[must_use]
    pub fn state_handle(&self) -> DiagnosticState {
        self.state.clone()
    }

    #[must_use]
    pub const fn flavor(&self) -> &CursorFlavor {
        &self.flavor
    }

    /// Open a cursor of this backend's flavor
    pub async fn cursor(&self) -> Result<CursorAdapter> {
        let native = self.native.cursor().await?;
        Ok(CursorAdapter::new(native, self.state.clone(), self.flavor.clone()))
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.native.commit().await?;
        self.state.set(STATE_AFTER_COMMIT);
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.native.rollback().await?;
        self.state.set(STATE_AFTER_ROLLBACK);
        Ok(())
    }

    /// Close the native connection; cursors opened from it stop working
    pub async fn close(&mut self) -> Result<()> {
        self.native.close().await?;
        self.state.set(STATE_CLOSED);
        tracing::debug!(label = %self.label, "connection closed");
        Ok(())
    }
}

impl fmt::Debug for ConnectionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionAdapter")
            .field("label", &self.label)
            .field("state", &self.state.get())
            .field("flavor", &self.flavor)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConnectionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::{MemoryDriver, MemoryEvent};
    use crate::driver::{ConnectArgs, NativeDriver};
    use crate::error::DbConnectError;

    async fn open(driver: &MemoryDriver) -> ConnectionAdapter {
        let args = ConnectArgs::Dsn { dsn: "dbname=test".to_string(), host: None };
        let native = driver.connect(&args).await.unwrap();
        ConnectionAdapter::new(native, "test-conn", CursorFlavor::Plain)
    }

    #[test]
    fn test_executing_state_quotes_sql() {
        assert_eq!(executing_state("select 1"), r#"executing "select 1""#);
        assert_eq!(executing_state("select 'x'"), r#"executing "select 'x'""#);
    }

    #[test]
    fn test_state_handle_is_shared() {
        let state = DiagnosticState::new(STATE_START);
        let watcher = state.clone();
        state.set("busy");
        assert_eq!(watcher.get(), "busy");
        assert_eq!(watcher.to_string(), "busy");
    }

    #[tokio::test]
    async fn test_initial_state_and_label() {
        let driver = MemoryDriver::new();
        let conn = open(&driver).await;
        assert_eq!(conn.state(), STATE_START);
        assert_eq!(conn.label(), "test-conn");
        assert_eq!(conn.to_string(), "test-conn: idle (start)");
    }

    #[tokio::test]
    async fn test_commit_rollback_close_states() {
        let driver = MemoryDriver::new();
        let mut conn = open(&driver).await;

        conn.commit().await.unwrap();
        assert_eq!(conn.state(), STATE_AFTER_COMMIT);

        conn.rollback().await.unwrap();
        assert_eq!(conn.state(), STATE_AFTER_ROLLBACK);

        conn.close().await.unwrap();
        assert_eq!(conn.state(), STATE_CLOSED);

        let events = driver.events();
        assert!(events.contains(&MemoryEvent::Commit));
        assert!(events.contains(&MemoryEvent::Rollback));
        assert!(events.contains(&MemoryEvent::Close));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let driver = MemoryDriver::new().fail_commit("serialization failure");
        let mut conn = open(&driver).await;

        let err = conn.commit().await.unwrap_err();
        assert!(matches!(err, DbConnectError::QueryFailed(_)));
        assert_eq!(conn.state(), STATE_START);
    }

    #[tokio::test]
    async fn test_cursor_after_close_fails() {
        let driver = MemoryDriver::new();
        let mut conn = open(&driver).await;
        let mut cursor = conn.cursor().await.unwrap();
        conn.close().await.unwrap();

        assert!(cursor.execute("select 1", &[]).await.is_err());
        assert!(conn.cursor().await.is_err());
    }
}
