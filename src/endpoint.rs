//! Endpoint Descriptors and Connection Parameters
//!
//! Parses the generic endpoint descriptor used by every backend:
//! - `unix:<path>[:<port>]` for Unix-domain sockets
//! - `tcp:<host>[:<port>]` for TCP
//!
//! Parsing is pure: no filesystem or network access happens here. Socket
//! existence is checked later, by the connector builder that needs it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DbConnectError, Result};

/// Printed in place of credentials by `Debug` impls
pub const REDACTED: &str = "<redacted>";

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp:";

/// Parsed endpoint descriptor
///
/// Exactly one of socket path or host is set, by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix-domain socket (file or directory containing the socket)
    Unix { socket: PathBuf, port: Option<u16> },
    /// TCP host
    Tcp { host: String, port: Option<u16> },
}

impl Endpoint {
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Tcp { host, .. } => Some(host),
            Self::Unix { .. } => None,
        }
    }

    #[must_use]
    pub fn unix_socket(&self) -> Option<&Path> {
        match self {
            Self::Unix { socket, .. } => Some(socket),
            Self::Tcp { .. } => None,
        }
    }

    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match self {
            Self::Unix { port, .. } | Self::Tcp { port, .. } => *port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = DbConnectError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(UNIX_PREFIX) {
            let (path, port) = split_port(s, rest)?;
            Ok(Self::Unix { socket: PathBuf::from(path), port })
        } else if let Some(rest) = s.strip_prefix(TCP_PREFIX) {
            let (host, port) = split_port(s, rest)?;
            Ok(Self::Tcp { host: host.to_string(), port })
        } else {
            Err(DbConnectError::malformed_endpoint(format!(
                "'{s}' must start with '{UNIX_PREFIX}' or '{TCP_PREFIX}'"
            )))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { socket, port: Some(port) } => {
                write!(f, "{UNIX_PREFIX}{}:{port}", socket.display())
            }
            Self::Unix { socket, port: None } => write!(f, "{UNIX_PREFIX}{}", socket.display()),
            Self::Tcp { host, port: Some(port) } => write!(f, "{TCP_PREFIX}{host}:{port}"),
            Self::Tcp { host, port: None } => write!(f, "{TCP_PREFIX}{host}"),
        }
    }
}

/// Split `<target>[:<port>]` with a strict single-separator rule
fn split_port<'a>(endpoint: &str, rest: &'a str) -> Result<(&'a str, Option<u16>)> {
    let (target, port) = match rest.split_once(':') {
        Some((target, port)) => {
            if port.contains(':') {
                return Err(DbConnectError::malformed_endpoint(format!(
                    "'{endpoint}' contains more than one port separator"
                )));
            }
            let port = port.parse::<u16>().map_err(|_| {
                DbConnectError::malformed_endpoint(format!(
                    "'{endpoint}' has an invalid port '{port}'"
                ))
            })?;
            (target, Some(port))
        }
        None => (rest, None),
    };

    if target.is_empty() {
        return Err(DbConnectError::malformed_endpoint(format!(
            "'{endpoint}' has an empty host or socket path"
        )));
    }

    Ok((target, port))
}

/// Generic keyword options accepted by `ConnectorFactory::connector_for`
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// `unix:<path>[:<port>]` or `tcp:<host>[:<port>]`
    pub endpoint: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Default::default() }
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// Resolved connection parameters
///
/// Built once per connector and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    endpoint: String,
    address: Endpoint,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("endpoint", &self.endpoint)
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParameters {
    /// Parse the endpoint and carry the credentials verbatim
    pub fn resolve(options: &ConnectOptions) -> Result<Self> {
        let address = options.endpoint.parse::<Endpoint>()?;
        Ok(Self {
            endpoint: options.endpoint.clone(),
            address,
            user: options.user.clone(),
            password: options.password.clone(),
            database: options.database.clone(),
        })
    }

    /// Original endpoint string
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub const fn address(&self) -> &Endpoint {
        &self.address
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.address.host()
    }

    #[must_use]
    pub fn unix_socket(&self) -> Option<&Path> {
        self.address.unix_socket()
    }

    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.address.port()
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}
