//! Process-wide driver environment bootstrap
//!
//! Oracle client libraries read `NLS_LANG` once, at the first physical
//! connect, and every later connection in the process inherits the result.
//! The connection character set must cover all of Unicode, so the value is
//! fixed rather than configurable.
//!
//! Call [`init_oracle_environment`] from the hosting process before building
//! any Oracle connector. `ConnectorFactory` refuses to build one otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

/// Client character set for Oracle connections
pub const ORACLE_NLS_LANG: &str = ".AL32UTF8";

static ORACLE_INIT: Once = Once::new();
static ORACLE_READY: AtomicBool = AtomicBool::new(false);

/// Set `NLS_LANG` for the Oracle client libraries (idempotent)
///
/// Must run before other threads read the environment, typically first thing
/// in `main`.
pub fn init_oracle_environment() {
    ORACLE_INIT.call_once(|| {
        std::env::set_var("NLS_LANG", ORACLE_NLS_LANG);
        ORACLE_READY.store(true, Ordering::SeqCst);
        tracing::debug!(nls_lang = ORACLE_NLS_LANG, "Oracle client environment initialized");
    });
}

/// Whether [`init_oracle_environment`] has run in this process
#[must_use]
pub fn oracle_environment_ready() -> bool {
    ORACLE_READY.load(Ordering::SeqCst)
}
