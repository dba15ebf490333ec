//! Edge Case Tests
//!
//! Boundary behavior of the public API:
//! - Endpoint descriptors (separators, ports, schemes)
//! - Unix-socket resolution against the real filesystem
//! - Large-object threshold boundaries in character counts
//! - Backend/driver lookup failures
//! - Credentials containing DSN metacharacters

use std::path::PathBuf;
use std::sync::Arc;

use dbconnect::config::StoredRole;
use dbconnect::driver::memory::{MemoryDriver, MemoryEvent, RecordedArg};
use dbconnect::driver::{ConnectArgs, DriverKind, PostgresTarget};
use dbconnect::value::NativeType;
use dbconnect::{
    init_oracle_environment, ConnectOptions, ConnectionParameters, ConnectorFactory,
    ConnectorSettings, DbConnectError, Endpoint, Value,
};

fn factory(driver: &MemoryDriver) -> ConnectorFactory {
    ConnectorFactory::new()
        .register(DriverKind::PostgresLegacy, Arc::new(driver.clone()))
        .register(DriverKind::PostgresModern, Arc::new(driver.clone()))
        .register(DriverKind::Oracle, Arc::new(driver.clone()))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dbconnect-edge-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ============================================================================
// Endpoint Descriptors
// ============================================================================

#[test]
fn test_endpoint_without_port() {
    let params = ConnectionParameters::resolve(&ConnectOptions::new("tcp:db.example")).unwrap();
    assert_eq!(params.host(), Some("db.example"));
    assert_eq!(params.port(), None);
    assert_eq!(params.unix_socket(), None);
}

#[test]
fn test_endpoint_port_bounds() {
    let max = ConnectionParameters::resolve(&ConnectOptions::new("tcp:h:65535")).unwrap();
    assert_eq!(max.port(), Some(65535));

    for bad in ["tcp:h:65536", "tcp:h:-1", "tcp:h:", "tcp:h:54x"] {
        let err = ConnectionParameters::resolve(&ConnectOptions::new(bad)).unwrap_err();
        assert!(matches!(err, DbConnectError::MalformedEndpoint(_)), "{bad}");
    }
}

#[test]
fn test_endpoint_more_than_one_separator() {
    for bad in ["tcp:h:1:2", "unix:/a:b:5432"] {
        let err = bad.parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, DbConnectError::MalformedEndpoint(_)), "{bad}");
    }
}

#[test]
fn test_endpoint_scheme_is_case_sensitive() {
    for bad in ["TCP:h", "Unix:/tmp", "http://h", "", "h:5432"] {
        let err = ConnectionParameters::resolve(&ConnectOptions::new(bad)).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_ENDPOINT", "{bad}");
    }
}

#[test]
fn test_endpoint_descriptor_preserved() {
    let params = ConnectionParameters::resolve(&ConnectOptions::new("unix:/var/run/pg:5433")).unwrap();
    assert_eq!(params.endpoint(), "unix:/var/run/pg:5433");
    assert_eq!(params.unix_socket(), Some(std::path::Path::new("/var/run/pg")));
    assert_eq!(params.port(), Some(5433));
}

// ============================================================================
// Backend and Driver Lookup
// ============================================================================

#[test]
fn test_unknown_backend_checked_before_endpoint() {
    let driver = MemoryDriver::new();
    let err = factory(&driver).connector_for("mysql", &ConnectOptions::new("nonsense")).unwrap_err();
    assert!(matches!(err, DbConnectError::UnknownBackendType(ref b) if b == "mysql"));
}

#[test]
fn test_backend_names_are_exact() {
    let driver = MemoryDriver::new();
    for name in ["Oracle", "POSTGRES", "postgresql", " postgres"] {
        let err = factory(&driver).connector_for(name, &ConnectOptions::new("tcp:h")).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_BACKEND_TYPE", "{name}");
    }
}

#[test]
fn test_no_oracle_driver_registered() {
    init_oracle_environment();
    let err = ConnectorFactory::with_builtin_drivers()
        .connector_for("oracle", &ConnectOptions::new("tcp:ora"))
        .unwrap_err();
    assert!(matches!(err, DbConnectError::UnknownDriverModule(ref m) if m == "oracle"));
}

#[test]
fn test_empty_factory_has_no_postgres_driver() {
    let err = ConnectorFactory::new()
        .connector_for("postgres", &ConnectOptions::new("tcp:h"))
        .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_DRIVER_MODULE");
}

// ============================================================================
// Unix Socket Resolution
// ============================================================================

#[cfg(unix)]
#[test]
fn test_socket_directory_resolves_to_bound_socket() {
    let dir = scratch_dir("socket-dir");
    let socket = dir.join(".s.PGSQL.6543");
    let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();

    let driver = MemoryDriver::new();
    let endpoint = format!("unix:{}:6543", dir.display());
    let connector = factory(&driver).connector_for("postgres", &ConnectOptions::new(endpoint)).unwrap();

    let ConnectArgs::Postgres(args) = connector.connect_args() else {
        panic!("modern connector must bind keyword arguments");
    };
    assert_eq!(args.target, PostgresTarget::UnixSocket(socket));

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn test_socket_directory_without_server() {
    let dir = scratch_dir("no-server");

    let driver = MemoryDriver::new();
    let endpoint = format!("unix:{}", dir.display());
    let err = factory(&driver).connector_for("postgres", &ConnectOptions::new(endpoint)).unwrap_err();

    match err {
        DbConnectError::SocketNotFound(path) => assert_eq!(path, dir.join(".s.PGSQL.5432")),
        other => panic!("expected SocketNotFound, got {other:?}"),
    }
    assert!(driver.events().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn test_regular_file_is_not_a_socket() {
    let dir = scratch_dir("regular-file");
    let file = dir.join("not-a-socket");
    std::fs::write(&file, b"").unwrap();

    let driver = MemoryDriver::new();
    let endpoint = format!("unix:{}", file.display());
    let err = factory(&driver).connector_for("postgres", &ConnectOptions::new(endpoint)).unwrap_err();
    assert_eq!(err.error_code(), "SOCKET_NOT_FOUND");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_legacy_family_skips_socket_probe() {
    let driver = MemoryDriver::new();
    let connector = factory(&driver)
        .postgres_driver(DriverKind::PostgresLegacy)
        .connector_for("postgres", &ConnectOptions::new("unix:/nonexistent/dbconnect/socket/dir"))
        .unwrap();

    let ConnectArgs::Dsn { dsn, host } = connector.connect_args() else {
        panic!("legacy connector must bind a DSN");
    };
    assert_eq!(dsn, "host='/nonexistent/dbconnect/socket/dir'");
    assert_eq!(host, &None);
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
fn test_dsn_metacharacters_are_quoted() {
    let driver = MemoryDriver::new();
    let options = ConnectOptions::new("tcp:h").user("o'brien").password(r"p\ss word");
    let connector = factory(&driver)
        .postgres_driver(DriverKind::PostgresLegacy)
        .connector_for("postgres", &options)
        .unwrap();

    let ConnectArgs::Dsn { dsn, .. } = connector.connect_args() else {
        panic!("legacy connector must bind a DSN");
    };
    assert_eq!(dsn, r"host='h' user='o\'brien' password='p\\ss word'");
}

#[test]
fn test_debug_output_hides_password() {
    init_oracle_environment();
    let driver = MemoryDriver::new();
    let options = ConnectOptions::new("tcp:h").user("u").password("topsecret");

    let modern = factory(&driver).connector_for("postgres", &options).unwrap();
    let legacy = factory(&driver)
        .postgres_driver(DriverKind::PostgresLegacy)
        .connector_for("postgres", &options)
        .unwrap();
    let oracle = factory(&driver).connector_for("oracle", &options).unwrap();

    let stored = StoredRole { password: Some("topsecret".to_string()), ..StoredRole::new("postgres", "tcp:h") };
    let resolved = stored.resolve("app").unwrap();

    let rendered = [
        format!("{options:?}"),
        format!("{:?}", ConnectionParameters::resolve(&options).unwrap()),
        format!("{modern:?}"),
        format!("{:?}", modern.connect_args()),
        format!("{:?}", legacy.connect_args()),
        format!("{:?}", oracle.connect_args()),
        format!("{stored:?}"),
        format!("{resolved:?}"),
    ];
    for text in &rendered {
        assert!(!text.contains("topsecret"), "{text}");
    }
    assert!(rendered[0].contains("<redacted>"));
    assert!(rendered[6].contains("<redacted>"));
}

// ============================================================================
// Large-Object Threshold
// ============================================================================

async fn bound_args(threshold: usize, text: &str) -> Vec<RecordedArg> {
    init_oracle_environment();
    let driver = MemoryDriver::new();
    let settings = ConnectorSettings { lob_threshold: threshold, ..Default::default() };
    let connector = factory(&driver)
        .with_settings(settings)
        .connector_for("oracle", &ConnectOptions::new("tcp:ora"))
        .unwrap();
    let connection = connector.connect().await.unwrap();
    driver.clear_events();

    let mut cursor = connection.cursor().await.unwrap();
    cursor.execute("insert into t values (:1)", &[Value::from(text)]).await.unwrap();

    driver
        .events()
        .into_iter()
        .find_map(|e| match e {
            MemoryEvent::Execute { args, .. } => Some(args),
            _ => None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_threshold_counts_characters_not_bytes() {
    // 8 characters, 22 bytes
    let text = "日本語テキスト!";
    assert_eq!(bound_args(8, text).await, vec![RecordedArg::Value(Value::from(text))]);

    let args = bound_args(7, text).await;
    assert_eq!(
        args,
        vec![RecordedArg::Var { native_type: NativeType::Nclob, size: 9, value: Some(Value::from(text)) }]
    );
}

#[tokio::test]
async fn test_empty_string_never_becomes_lob() {
    assert_eq!(bound_args(0, "").await, vec![RecordedArg::Value(Value::from(""))]);
}

#[tokio::test]
async fn test_non_text_arguments_untouched() {
    init_oracle_environment();
    let driver = MemoryDriver::new();
    let connection = factory(&driver)
        .connector_for("oracle", &ConnectOptions::new("tcp:ora"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    driver.clear_events();

    let mut cursor = connection.cursor().await.unwrap();
    cursor
        .execute("insert into t values (:1, :2, :3)", &[Value::Int(5), Value::Null, Value::Bool(true)])
        .await
        .unwrap();

    assert!(driver.events().contains(&MemoryEvent::Execute {
        sql: "insert into t values (:1, :2, :3)".to_string(),
        args: vec![
            RecordedArg::Value(Value::Int(5)),
            RecordedArg::Value(Value::Null),
            RecordedArg::Value(Value::Bool(true)),
        ],
    }));
}
