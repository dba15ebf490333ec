//! Connector Factory and Connect Entry Point
//!
//! `ConnectorFactory::connector_for` turns a backend name plus generic
//! options into a [`Connector`]: it picks the driver family, resolves the
//! endpoint into driver-specific connect arguments, and binds the matching
//! preflight and cursor flavor. `Connector::connect` then opens physical
//! connections on demand.
//!
//! # Dispatch
//! Backend name -> [`BackendType`] -> [`DriverKind`] -> builder, via a static
//! table. A kind with no registered native driver, or no builder, fails with
//! `UnknownDriverModule`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionAdapter, DEFAULT_LABEL};
use crate::cursor::{CursorFlavor, LargeObjectOptions, LobMaterializer, DEFAULT_LOB_THRESHOLD};
use crate::driver::{ConnectArgs, DriverKind, NativeDriver, PostgresArgs, PostgresTarget};
use crate::endpoint::{ConnectOptions, ConnectionParameters, Endpoint};
use crate::environment::oracle_environment_ready;
use crate::error::{DbConnectError, Result};
use crate::fs::{LocalFs, SocketFs};
use crate::preflight::{OraclePreflight, PostgresPreflight, Preflight, DEFAULT_STATEMENT_TIMEOUT};

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_ORACLE_PORT: u16 = 1521;

/// Logical backend requested by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Postgres,
    Oracle,
}

impl BackendType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = DbConnectError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "oracle" => Ok(Self::Oracle),
            other => Err(DbConnectError::unknown_backend_type(other)),
        }
    }
}

fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT.as_millis() as u64
}

const fn default_lob_threshold() -> usize {
    DEFAULT_LOB_THRESHOLD
}

const fn default_postgres_port() -> u16 {
    DEFAULT_POSTGRES_PORT
}

const fn default_oracle_port() -> u16 {
    DEFAULT_ORACLE_PORT
}

/// Tunables that are fixed per connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSettings {
    /// Postgres `statement_timeout` applied by preflight
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Strings longer than this are bound as NCLOB variables (Oracle)
    #[serde(default = "default_lob_threshold")]
    pub lob_threshold: usize,

    #[serde(default = "default_postgres_port")]
    pub default_postgres_port: u16,

    #[serde(default = "default_oracle_port")]
    pub default_oracle_port: u16,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            statement_timeout_ms: default_statement_timeout_ms(),
            lob_threshold: DEFAULT_LOB_THRESHOLD,
            default_postgres_port: DEFAULT_POSTGRES_PORT,
            default_oracle_port: DEFAULT_ORACLE_PORT,
        }
    }
}

/// Bound connect arguments plus the preflight to run on each new connection
pub struct Connector {
    kind: DriverKind,
    driver: Arc<dyn NativeDriver>,
    preflight: Arc<dyn Preflight>,
    args: ConnectArgs,
    flavor: CursorFlavor,
}

impl Connector {
    pub fn new(
        kind: DriverKind,
        driver: Arc<dyn NativeDriver>,
        preflight: Arc<dyn Preflight>,
        args: ConnectArgs,
        flavor: CursorFlavor,
    ) -> Self {
        Self { kind, driver, preflight, args, flavor }
    }

    #[must_use]
    pub const fn driver_kind(&self) -> DriverKind {
        self.kind
    }

    /// Arguments replayed on every physical connect (contains credentials)
    #[must_use]
    pub const fn connect_args(&self) -> &ConnectArgs {
        &self.args
    }

    #[must_use]
    pub const fn cursor_flavor(&self) -> &CursorFlavor {
        &self.flavor
    }

    /// Connect with the default `<unlabeled>` label
    pub async fn connect(&self) -> Result<ConnectionAdapter> {
        self.connect_labeled(DEFAULT_LABEL).await
    }

    /// Open, wrap and preflight a new physical connection
    ///
    /// Either every step succeeds or the error is returned and the physical
    /// connection, if one was opened, is closed.
    pub async fn connect_labeled(&self, label: &str) -> Result<ConnectionAdapter> {
        tracing::debug!(label, driver = self.driver.name(), kind = %self.kind, "connecting");

        let native = self.driver.connect(&self.args).await?;
        let mut connection = ConnectionAdapter::new(native, label, self.flavor.clone());

        if let Err(e) = self.preflight.run(&mut connection).await {
            tracing::warn!(label, error = %e, "preflight failed, closing connection");
            if let Err(close_err) = connection.close().await {
                tracing::warn!(label, error = %close_err, "failed to close connection after preflight failure");
            }
            return Err(e);
        }

        Ok(connection)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("kind", &self.kind)
            .field("driver", &self.driver.name())
            .field("preflight", &self.preflight)
            .field("flavor", &self.flavor)
            .finish_non_exhaustive()
    }
}

/// Builds a connector for one driver kind
type ConnectorBuilder =
    fn(&ConnectorFactory, &ConnectionParameters, Arc<dyn NativeDriver>) -> Result<Connector>;

static BUILDERS: &[(DriverKind, ConnectorBuilder)] = &[
    (DriverKind::PostgresLegacy, build_postgres_legacy),
    (DriverKind::PostgresModern, build_postgres_modern),
    (DriverKind::Oracle, build_oracle),
];

fn builder_for(kind: DriverKind) -> Option<ConnectorBuilder> {
    BUILDERS.iter().find(|(k, _)| *k == kind).map(|(_, builder)| *builder)
}

/// Registry of native drivers and the entry point for building connectors
pub struct ConnectorFactory {
    drivers: HashMap<DriverKind, Arc<dyn NativeDriver>>,
    postgres_kind: DriverKind,
    fs: Arc<dyn SocketFs>,
    settings: ConnectorSettings,
}

impl Default for ConnectorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorFactory {
    /// Factory with no drivers registered
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
            postgres_kind: DriverKind::PostgresModern,
            fs: Arc::new(LocalFs),
            settings: ConnectorSettings::default(),
        }
    }

    /// Factory with the built-in drivers registered
    ///
    /// With the `postgres` feature, tokio-postgres serves both Postgres
    /// driver families. Oracle drivers must be registered by the host.
    pub fn with_builtin_drivers() -> Self {
        #[allow(unused_mut)]
        let mut factory = Self::new();
        #[cfg(feature = "postgres")]
        {
            let driver: Arc<dyn NativeDriver> = Arc::new(crate::driver::postgres::PostgresDriver);
            factory = factory
                .register(DriverKind::PostgresLegacy, Arc::clone(&driver))
                .register(DriverKind::PostgresModern, driver);
        }
        factory
    }

    #[must_use]
    pub fn register(mut self, kind: DriverKind, driver: Arc<dyn NativeDriver>) -> Self {
        self.drivers.insert(kind, driver);
        self
    }

    /// Driver family used for the `postgres` backend
    ///
    /// Non-Postgres kinds are ignored.
    #[must_use]
    pub fn postgres_driver(mut self, kind: DriverKind) -> Self {
        if matches!(kind, DriverKind::PostgresLegacy | DriverKind::PostgresModern) {
            self.postgres_kind = kind;
        }
        self
    }

    #[must_use]
    pub fn with_filesystem(mut self, fs: Arc<dyn SocketFs>) -> Self {
        self.fs = fs;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ConnectorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    #[must_use]
    pub const fn driver_kind_for(&self, backend: BackendType) -> DriverKind {
        match backend {
            BackendType::Postgres => self.postgres_kind,
            BackendType::Oracle => DriverKind::Oracle,
        }
    }

    /// Build a connector for the named backend
    ///
    /// The backend name is checked before anything else, so an unknown
    /// name fails without touching the filesystem or network.
    pub fn connector_for(&self, backend: &str, options: &ConnectOptions) -> Result<Connector> {
        let backend: BackendType = backend.parse()?;
        let kind = self.driver_kind_for(backend);

        let driver = self
            .drivers
            .get(&kind)
            .cloned()
            .ok_or_else(|| DbConnectError::unknown_driver_module(kind.as_str()))?;
        let builder =
            builder_for(kind).ok_or_else(|| DbConnectError::unknown_driver_module(kind.as_str()))?;

        let params = ConnectionParameters::resolve(options)?;
        let connector = builder(self, &params, driver)?;

        tracing::debug!(%backend, %kind, endpoint = params.endpoint(), "connector built");
        Ok(connector)
    }

    fn postgres_preflight(&self) -> Arc<dyn Preflight> {
        Arc::new(PostgresPreflight {
            statement_timeout: Duration::from_millis(self.settings.statement_timeout_ms),
        })
    }
}

impl fmt::Debug for ConnectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.drivers.keys().map(DriverKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ConnectorFactory")
            .field("drivers", &kinds)
            .field("postgres_kind", &self.postgres_kind)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Quote a libpq key/value connection string value
fn quote_dsn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Legacy Postgres: one DSN string, plus `host:port` when a port was given
fn build_postgres_legacy(
    factory: &ConnectorFactory,
    params: &ConnectionParameters,
    driver: Arc<dyn NativeDriver>,
) -> Result<Connector> {
    let host = match params.address() {
        Endpoint::Tcp { host, .. } => host.clone(),
        Endpoint::Unix { socket, .. } => socket.display().to_string(),
    };

    let mut fields = vec![format!("host={}", quote_dsn_value(&host))];
    if let Some(database) = params.database() {
        fields.push(format!("dbname={}", quote_dsn_value(database)));
    }
    if let Some(user) = params.user() {
        fields.push(format!("user={}", quote_dsn_value(user)));
    }
    if let Some(password) = params.password() {
        fields.push(format!("password={}", quote_dsn_value(password)));
    }

    let host_keyword = params.port().map(|port| format!("{host}:{port}"));

    Ok(Connector::new(
        DriverKind::PostgresLegacy,
        driver,
        factory.postgres_preflight(),
        ConnectArgs::Dsn { dsn: fields.join(" "), host: host_keyword },
        CursorFlavor::Plain,
    ))
}

/// Modern Postgres: keyword arguments, with Unix-socket resolution
fn build_postgres_modern(
    factory: &ConnectorFactory,
    params: &ConnectionParameters,
    driver: Arc<dyn NativeDriver>,
) -> Result<Connector> {
    let target = match params.address() {
        Endpoint::Unix { socket, port } => {
            PostgresTarget::UnixSocket(resolve_postgres_socket(factory, socket.clone(), *port)?)
        }
        Endpoint::Tcp { host, port } => PostgresTarget::Tcp { host: host.clone(), port: *port },
    };

    let args = PostgresArgs {
        user: params.user().map(str::to_string),
        password: params.password().map(str::to_string),
        database: params.database().map(str::to_string),
        target,
    };

    Ok(Connector::new(
        DriverKind::PostgresModern,
        driver,
        factory.postgres_preflight(),
        ConnectArgs::Postgres(args),
        CursorFlavor::Plain,
    ))
}

/// A directory means "the server's socket in this directory"
fn resolve_postgres_socket(
    factory: &ConnectorFactory,
    mut socket: PathBuf,
    port: Option<u16>,
) -> Result<PathBuf> {
    if factory.fs.is_dir(&socket) {
        let port = port.unwrap_or(factory.settings.default_postgres_port);
        socket = socket.join(format!(".s.PGSQL.{port}"));
    }

    if !factory.fs.is_socket(&socket) {
        return Err(DbConnectError::socket_not_found(socket));
    }

    Ok(socket)
}

/// Oracle: `user/password@host:port/database`, threaded mode always on
fn build_oracle(
    factory: &ConnectorFactory,
    params: &ConnectionParameters,
    driver: Arc<dyn NativeDriver>,
) -> Result<Connector> {
    if !oracle_environment_ready() {
        return Err(DbConnectError::environment_not_initialized(
            "call environment::init_oracle_environment() before building Oracle connectors",
        ));
    }

    let host = params.host().ok_or_else(|| {
        DbConnectError::invalid_input("Oracle connections require a tcp: endpoint")
    })?;
    let port = params.port().unwrap_or(factory.settings.default_oracle_port);

    let dsn = format!(
        "{}/{}@{host}:{port}/{}",
        params.user().unwrap_or_default(),
        params.password().unwrap_or_default(),
        params.database().unwrap_or_default(),
    );

    let flavor = CursorFlavor::LargeObject(LargeObjectOptions {
        threshold: factory.settings.lob_threshold,
        mapper: Arc::new(LobMaterializer),
    });

    Ok(Connector::new(
        DriverKind::Oracle,
        driver,
        Arc::new(OraclePreflight),
        ConnectArgs::Oracle { dsn, threaded: true },
        flavor,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use crate::environment::init_oracle_environment;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake filesystem: fixed sets of directories and sockets, counts probes
    #[derive(Default)]
    struct FakeFs {
        dirs: Vec<PathBuf>,
        sockets: Vec<PathBuf>,
        probes: AtomicUsize,
    }

    impl SocketFs for FakeFs {
        fn is_dir(&self, path: &Path) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.dirs.iter().any(|d| d == path)
        }

        fn is_socket(&self, path: &Path) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.sockets.iter().any(|s| s == path)
        }
    }

    fn factory_with(fs: Arc<FakeFs>, driver: &MemoryDriver) -> ConnectorFactory {
        ConnectorFactory::new()
            .register(DriverKind::PostgresLegacy, Arc::new(driver.clone()))
            .register(DriverKind::PostgresModern, Arc::new(driver.clone()))
            .register(DriverKind::Oracle, Arc::new(driver.clone()))
            .with_filesystem(fs)
    }

    fn options(endpoint: &str) -> ConnectOptions {
        ConnectOptions::new(endpoint).user("u").password("p").database("d")
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("postgres".parse::<BackendType>().unwrap(), BackendType::Postgres);
        assert_eq!("oracle".parse::<BackendType>().unwrap(), BackendType::Oracle);
        assert!(matches!(
            "Postgres".parse::<BackendType>(),
            Err(DbConnectError::UnknownBackendType(_))
        ));
    }

    #[test]
    fn test_unknown_backend_does_no_io() {
        let fs = Arc::new(FakeFs::default());
        let driver = MemoryDriver::new();
        let factory = factory_with(Arc::clone(&fs), &driver);

        let err = factory.connector_for("bogus", &options("unix:/var/run/pg")).unwrap_err();
        assert!(matches!(err, DbConnectError::UnknownBackendType(ref name) if name == "bogus"));
        assert_eq!(fs.probes.load(Ordering::SeqCst), 0);
        assert!(driver.events().is_empty());
    }

    #[test]
    fn test_unregistered_driver_is_unknown_module() {
        let factory = ConnectorFactory::new();
        let err = factory.connector_for("postgres", &options("tcp:localhost")).unwrap_err();
        assert!(matches!(err, DbConnectError::UnknownDriverModule(ref kind) if kind == "postgres-modern"));
    }

    #[test]
    fn test_directory_socket_resolves_to_default_port_file() {
        let fs = Arc::new(FakeFs {
            dirs: vec![PathBuf::from("/var/run/pg")],
            sockets: vec![PathBuf::from("/var/run/pg/.s.PGSQL.5432")],
            ..Default::default()
        });
        let factory = factory_with(fs, &MemoryDriver::new());

        let connector = factory.connector_for("postgres", &options("unix:/var/run/pg")).unwrap();
        let ConnectArgs::Postgres(args) = connector.connect_args() else {
            panic!("expected keyword arguments");
        };
        assert_eq!(
            args.target,
            PostgresTarget::UnixSocket(PathBuf::from("/var/run/pg/.s.PGSQL.5432"))
        );
        assert_eq!(args.user.as_deref(), Some("u"));
        assert_eq!(args.database.as_deref(), Some("d"));
    }

    #[test]
    fn test_directory_socket_uses_explicit_port() {
        let fs = Arc::new(FakeFs {
            dirs: vec![PathBuf::from("/tmp")],
            sockets: vec![PathBuf::from("/tmp/.s.PGSQL.5433")],
            ..Default::default()
        });
        let factory = factory_with(fs, &MemoryDriver::new());

        let connector = factory.connector_for("postgres", &options("unix:/tmp:5433")).unwrap();
        assert!(matches!(
            connector.connect_args(),
            ConnectArgs::Postgres(PostgresArgs { target: PostgresTarget::UnixSocket(p), .. })
                if p.ends_with(".s.PGSQL.5433")
        ));
    }

    #[test]
    fn test_missing_socket_fails_before_connecting() {
        let fs = Arc::new(FakeFs { dirs: vec![PathBuf::from("/var/run/pg")], ..Default::default() });
        let driver = MemoryDriver::new();
        let factory = factory_with(fs, &driver);

        let err = factory.connector_for("postgres", &options("unix:/var/run/pg")).unwrap_err();
        assert!(
            matches!(err, DbConnectError::SocketNotFound(ref p) if p == Path::new("/var/run/pg/.s.PGSQL.5432"))
        );
        assert_eq!(driver.connect_count(), 0);
    }

    #[test]
    fn test_modern_tcp_arguments() {
        let factory = factory_with(Arc::new(FakeFs::default()), &MemoryDriver::new());
        let connector = factory.connector_for("postgres", &options("tcp:db.local:6432")).unwrap();

        assert_eq!(connector.driver_kind(), DriverKind::PostgresModern);
        assert!(matches!(connector.cursor_flavor(), CursorFlavor::Plain));
        assert_eq!(
            connector.connect_args(),
            &ConnectArgs::Postgres(PostgresArgs {
                user: Some("u".to_string()),
                password: Some("p".to_string()),
                database: Some("d".to_string()),
                target: PostgresTarget::Tcp { host: "db.local".to_string(), port: Some(6432) },
            })
        );
    }

    #[test]
    fn test_legacy_dsn_and_host_keyword() {
        let factory = factory_with(Arc::new(FakeFs::default()), &MemoryDriver::new())
            .postgres_driver(DriverKind::PostgresLegacy);

        let connector = factory.connector_for("postgres", &options("tcp:db.local:6432")).unwrap();
        assert_eq!(
            connector.connect_args(),
            &ConnectArgs::Dsn {
                dsn: "host='db.local' dbname='d' user='u' password='p'".to_string(),
                host: Some("db.local:6432".to_string()),
            }
        );

        let connector = factory.connector_for("postgres", &options("tcp:db.local")).unwrap();
        assert!(matches!(connector.connect_args(), ConnectArgs::Dsn { host: None, .. }));
    }

    #[test]
    fn test_dsn_quoting() {
        assert_eq!(quote_dsn_value("it's"), r"'it\'s'");
        assert_eq!(quote_dsn_value(r"a\b c"), r"'a\\b c'");
    }

    #[test]
    fn test_oracle_dsn_and_flavor() {
        init_oracle_environment();
        let factory = factory_with(Arc::new(FakeFs::default()), &MemoryDriver::new());

        let connector = factory.connector_for("oracle", &options("tcp:ora.local:1522")).unwrap();
        assert_eq!(
            connector.connect_args(),
            &ConnectArgs::Oracle { dsn: "u/p@ora.local:1522/d".to_string(), threaded: true }
        );
        assert!(matches!(
            connector.cursor_flavor(),
            CursorFlavor::LargeObject(LargeObjectOptions { threshold: 1024, .. })
        ));

        let connector = factory.connector_for("oracle", &options("tcp:ora.local")).unwrap();
        assert!(matches!(
            connector.connect_args(),
            ConnectArgs::Oracle { dsn, .. } if dsn == "u/p@ora.local:1521/d"
        ));
    }

    #[test]
    fn test_oracle_requires_tcp_endpoint() {
        init_oracle_environment();
        let factory = factory_with(Arc::new(FakeFs::default()), &MemoryDriver::new());
        let err = factory.connector_for("oracle", &options("unix:/tmp/ora")).unwrap_err();
        assert!(matches!(err, DbConnectError::InvalidInput(_)));
    }

    #[test]
    fn test_settings_flow_into_connector() {
        init_oracle_environment();
        let settings = ConnectorSettings { lob_threshold: 10, ..Default::default() };
        let factory = factory_with(Arc::new(FakeFs::default()), &MemoryDriver::new())
            .with_settings(settings);

        let connector = factory.connector_for("oracle", &options("tcp:ora")).unwrap();
        assert!(matches!(
            connector.cursor_flavor(),
            CursorFlavor::LargeObject(LargeObjectOptions { threshold: 10, .. })
        ));
    }

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: ConnectorSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ConnectorSettings::default());
        assert_eq!(settings.statement_timeout_ms, 30_000);
    }

    #[test]
    fn test_every_driver_kind_has_a_builder() {
        for kind in [DriverKind::PostgresLegacy, DriverKind::PostgresModern, DriverKind::Oracle] {
            assert!(builder_for(kind).is_some(), "{kind}");
        }
    }
}
