//! dbconnect CLI Entry Point
//!
//! Subcommands:
//! - `ping` - connect, run preflight, report the connection's label and state
//! - `query` - execute one statement and print its rows
//! - `roles` - list configured roles
//! - `save-role` - persist a role to the local or global config
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use dbconnect::config::{self, ConfigLocation, ResolvedRole, RoleConfig, StoredRole};
use dbconnect::connection::ConnectionAdapter;
use dbconnect::connector::{BackendType, Connector, ConnectorFactory, ConnectorSettings};
use dbconnect::driver::DriverKind;
use dbconnect::endpoint::ConnectOptions;
use dbconnect::environment::init_oracle_environment;
use dbconnect::output::{ErrorEnvelope, Metadata, PingData, QueryData, SuccessEnvelope};
use dbconnect::{DbConnectError, Result, Value};

/// Role name reported for targets given entirely on the command line
const COMMAND_LINE_ROLE: &str = "<command-line>";

/// dbconnect - uniform PostgreSQL/Oracle connection layer
#[derive(Parser)]
#[command(name = "dbconnect")]
#[command(about = "Connect to PostgreSQL or Oracle through a uniform adapter with per-connection preflight")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Named role from the config files (default role if omitted)
    #[arg(long)]
    role: Option<String>,

    /// Backend for an explicit endpoint: postgres or oracle
    #[arg(long, requires = "endpoint")]
    backend: Option<String>,

    /// unix:<path>[:<port>] or tcp:<host>[:<port>]
    #[arg(long, conflicts_with = "role")]
    endpoint: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    database: Option<String>,

    /// Postgres driver family: postgres-legacy or postgres-modern
    #[arg(long)]
    driver: Option<DriverKind>,

    /// Read the password interactively
    #[arg(long)]
    prompt_password: bool,

    /// Connection label shown in diagnostics (defaults to the role name)
    #[arg(long)]
    label: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, run preflight and report the connection state
    Ping {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Execute one SQL statement and print its rows
    Query {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long)]
        sql: String,

        /// Positional statement parameter; `null` binds NULL
        #[arg(long = "param")]
        params: Vec<String>,

        /// Commit instead of rolling back afterwards
        #[arg(long)]
        commit: bool,
    },

    /// List configured roles
    Roles,

    /// Save a role to the local (default) or global config
    SaveRole {
        name: String,

        #[arg(long, default_value = "postgres")]
        backend: String,

        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        database: Option<String>,

        /// Environment variable holding the password
        #[arg(long)]
        password_env: Option<String>,

        #[arg(long)]
        driver: Option<DriverKind>,

        /// Save to the per-user config instead of `.dbconnect/config.json`
        #[arg(long)]
        global: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbconnect=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match start_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!(
                r#"{{"ok": false, "error": {{"code": "INTERNAL_ERROR", "message": "Could not start async runtime: {}"}}}}"#,
                e.to_string().replace('"', "'")
            );
            std::process::exit(1);
        }
    };

    let ok = runtime.block_on(run(cli.command));

    if !ok {
        std::process::exit(1);
    }
}

/// Prepare process-wide state, then start the async runtime
fn start_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    // Writes environment variables; no worker thread may exist yet
    init_oracle_environment();
    tokio::runtime::Runtime::new()
}

async fn run(command: Commands) -> bool {
    match command {
        Commands::Ping { target } => run_ping(target).await,
        Commands::Query { target, sql, params, commit } => {
            run_query(target, &sql, &params, commit).await
        }
        Commands::Roles => run_roles(),
        Commands::SaveRole { name, backend, endpoint, user, database, password_env, driver, global } => {
            let role = StoredRole {
                user,
                database,
                password_env,
                driver,
                ..StoredRole::new(backend, endpoint)
            };
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            run_save_role(&name, role, location)
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => println!(
            r#"{{"ok": false, "error": {{"code": "INTERNAL_ERROR", "message": "Could not serialize output: {}"}}}}"#,
            e.to_string().replace('"', "'")
        ),
    }
}

/// Print the success or error envelope; `true` on success
fn emit<T: Serialize>(backend: &str, command: &str, started: Instant, result: Result<(T, Option<usize>)>) -> bool {
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok((data, rows)) => {
            let meta = match rows {
                Some(rows) => Metadata::with_rows(elapsed, rows),
                None => Metadata::new(elapsed),
            };
            print_json(&SuccessEnvelope::new(backend, command, data, meta));
            true
        }
        Err(e) => {
            print_json(&ErrorEnvelope::from_error(backend, command, &e));
            false
        }
    }
}

fn prompt_password() -> Result<String> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(|e| DbConnectError::invalid_input(format!("Could not read password: {e}")))
}

/// Resolve the command-line target against the config files
fn resolve_target(args: &TargetArgs, config: &RoleConfig) -> Result<ResolvedRole> {
    let mut role = match &args.endpoint {
        Some(endpoint) => ResolvedRole {
            name: COMMAND_LINE_ROLE.to_string(),
            backend: args.backend.clone().unwrap_or_else(|| BackendType::Postgres.to_string()),
            driver: None,
            options: ConnectOptions::new(endpoint.clone()),
        },
        None => config.resolve(args.role.as_deref())?,
    };

    if let Some(user) = &args.user {
        role.options.user = Some(user.clone());
    }
    if let Some(database) = &args.database {
        role.options.database = Some(database.clone());
    }
    if args.driver.is_some() {
        role.driver = args.driver;
    }
    if args.prompt_password {
        role.options.password = Some(prompt_password()?);
    }

    Ok(role)
}

fn build_connector(role: &ResolvedRole, settings: ConnectorSettings) -> Result<Connector> {
    let factory = role.configure(ConnectorFactory::with_builtin_drivers().with_settings(settings));
    factory.connector_for(&role.backend, &role.options)
}

fn load_target(args: &TargetArgs) -> Result<(ResolvedRole, ConnectorSettings)> {
    let config = config::load_with_precedence()?;
    let role = resolve_target(args, &config)?;
    Ok((role, config.effective_settings()))
}

async fn run_ping(args: TargetArgs) -> bool {
    let started = Instant::now();
    let (role, settings) = match load_target(&args) {
        Ok(target) => target,
        Err(e) => return emit::<()>("", "ping", started, Err(e)),
    };

    let result = ping(&role, settings, args.label.as_deref()).await;
    emit(&role.backend, "ping", started, result.map(|data| (data, None)))
}

async fn ping(role: &ResolvedRole, settings: ConnectorSettings, label: Option<&str>) -> Result<PingData> {
    let connector = build_connector(role, settings)?;
    let mut connection = connector.connect_labeled(label.unwrap_or(&role.name)).await?;

    let data = PingData {
        role: role.name.clone(),
        driver: connector.driver_kind().to_string(),
        label: connection.label().to_string(),
        state: connection.state(),
    };

    connection.close().await?;
    Ok(data)
}

async fn run_query(args: TargetArgs, sql: &str, params: &[String], commit: bool) -> bool {
    let started = Instant::now();
    let (role, settings) = match load_target(&args) {
        Ok(target) => target,
        Err(e) => return emit::<()>("", "query", started, Err(e)),
    };

    let params: Vec<Value> = params
        .iter()
        .map(|p| if p == "null" { Value::Null } else { Value::Text(p.clone()) })
        .collect();

    let result = query(&role, settings, args.label.as_deref(), sql, &params, commit).await;
    emit(
        &role.backend,
        "query",
        started,
        result.map(|data| {
            let rows = data.rows.len();
            (data, Some(rows))
        }),
    )
}

async fn query(
    role: &ResolvedRole,
    settings: ConnectorSettings,
    label: Option<&str>,
    sql: &str,
    params: &[Value],
    commit: bool,
) -> Result<QueryData> {
    let connector = build_connector(role, settings)?;
    let mut connection = connector.connect_labeled(label.unwrap_or(&role.name)).await?;

    let outcome = execute_statement(&connection, sql, params).await;
    let finished = if outcome.is_ok() && commit {
        connection.commit().await
    } else {
        connection.rollback().await
    };
    let closed = connection.close().await;

    let data = outcome?;
    finished?;
    closed?;
    Ok(data)
}

async fn execute_statement(connection: &ConnectionAdapter, sql: &str, params: &[Value]) -> Result<QueryData> {
    let mut cursor = connection.cursor().await?;
    cursor.execute(sql, params).await?;

    let columns = cursor.description().map(<[_]>::to_vec).unwrap_or_default();
    let rows = if columns.is_empty() { Vec::new() } else { cursor.fetch_all().await? };
    let row_count = cursor.row_count();
    cursor.close().await?;

    Ok(QueryData { columns, rows, row_count })
}

fn run_roles() -> bool {
    let started = Instant::now();
    emit("", "roles", started, config::list_roles().map(|roles| (roles, None)))
}

fn run_save_role(name: &str, role: StoredRole, location: ConfigLocation) -> bool {
    let started = Instant::now();
    let backend = role.backend.clone();

    let result = role
        .backend
        .parse::<BackendType>()
        .and_then(|_| config::save_role(name, role, location))
        .map(|path| (serde_json::json!({ "name": name, "path": path.display().to_string() }), None));

    emit(&backend, "save-role", started, result)
}
