//! Connection options and service configuration.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};
use crate::types::TypeRegistry;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Transport used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// TCP socket
    Tcp,
    /// Unix domain socket
    Socket,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Tcp => f.write_str("tcp"),
            Scheme::Socket => f.write_str("socket"),
        }
    }
}

/// Options for one logical database, addressed by its alias.
///
/// Parsed from a connection string:
///
/// ```text
/// [alias=]scheme://[user[:password]@]host[:port]([database] | /database)[?k=v&...]
/// ```
///
/// - `scheme` is `tcp` or `socket`. For `socket` the host is the socket path
///   and the database must use the bracket form: `socket://me@/run/pg/.s.PGSQL.5432[app]`.
/// - Query parameters are sent to the server in the startup packet.
/// - Without an alias, one is generated: `user@host:port[database]`, or
///   `user@path[database]` for sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Logical name of the database.
    pub alias: String,

    /// Transport.
    ///
    /// Default: `Scheme::Tcp`
    pub scheme: Scheme,

    /// Hostname or IP address; the socket path for `Scheme::Socket`.
    pub host: String,

    /// Port number.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Username for authentication.
    pub user: String,

    /// Password for authentication.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Database name.
    pub database: String,

    /// Client parameters for the startup packet.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,
}

impl ConnectionOptions {
    /// Parse a connection string.
    pub fn parse(s: &str) -> Result<Self> {
        let scheme_end = s
            .find("://")
            .ok_or_else(|| config(format!("missing scheme in connection string '{}'", s)))?;

        // The alias may not contain ':' or '/', so the first '=' before the
        // scheme separator ends it
        let (alias, scheme_start) = match s[..scheme_end].find('=') {
            Some(eq) => (Some(s[..eq].trim()), eq + 1),
            None => (None, 0),
        };
        if alias.is_some_and(str::is_empty) {
            return Err(config("empty alias".to_string()));
        }

        let scheme = match &s[scheme_start..scheme_end] {
            "tcp" => Scheme::Tcp,
            "socket" => Scheme::Socket,
            "ssl" => {
                return Err(config("the ssl scheme is not supported".to_string()));
            }
            other => {
                return Err(config(format!(
                    "invalid scheme: expected 'tcp' or 'socket', got '{}'",
                    other
                )));
            }
        };

        let rest = &s[scheme_end + 3..];
        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (location, bracket_database) = split_bracket_database(location)?;

        let mut opts = match scheme {
            Scheme::Tcp => parse_tcp(location, bracket_database)?,
            Scheme::Socket => parse_socket(location, bracket_database)?,
        };

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                opts.params.push((key.into_owned(), value.into_owned()));
            }
        }

        if opts.user.is_empty() {
            return Err(config("user is required".to_string()));
        }
        if opts.database.is_empty() {
            return Err(config("database is required".to_string()));
        }

        opts.alias = match alias {
            Some(alias) => alias.to_string(),
            None => opts.default_alias(),
        };
        Ok(opts)
    }

    /// The alias generated when the connection string names none.
    pub fn default_alias(&self) -> String {
        match self.scheme {
            Scheme::Tcp => format!(
                "{}@{}:{}[{}]",
                self.user, self.host, self.port, self.database
            ),
            Scheme::Socket => format!("{}@{}[{}]", self.user, self.host, self.database),
        }
    }

    /// The unix socket path, for `Scheme::Socket`.
    pub fn socket_path(&self) -> Option<&Path> {
        match self.scheme {
            Scheme::Socket => Some(Path::new(&self.host)),
            Scheme::Tcp => None,
        }
    }

    /// Add `defaults` for every parameter not set explicitly.
    pub fn merge_params(&mut self, defaults: &[(String, String)]) {
        for (name, value) in defaults {
            if !self.params.iter().any(|(n, _)| n == name) {
                self.params.push((name.clone(), value.clone()));
            }
        }
    }

    /// Value of a client parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl TryFrom<&str> for ConnectionOptions {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::str::FromStr for ConnectionOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn config(message: String) -> Error {
    Error::Configuration(message)
}

/// Split `host[db]` into `host` and `db`.
fn split_bracket_database(location: &str) -> Result<(&str, Option<&str>)> {
    if !location.ends_with(']') {
        return Ok((location, None));
    }
    let open = location
        .rfind('[')
        .ok_or_else(|| config(format!("unbalanced ']' in '{}'", location)))?;
    Ok((&location[..open], Some(&location[open + 1..location.len() - 1])))
}

fn parse_tcp(location: &str, bracket_database: Option<&str>) -> Result<ConnectionOptions> {
    let url = Url::parse(&format!("tcp://{}", location))
        .map_err(|e| config(format!("invalid connection string: {}", e)))?;

    let host = url.host_str().unwrap_or_default();
    if host.is_empty() {
        return Err(config("host is required".to_string()));
    }

    let path = url.path().trim_start_matches('/');
    let database = match bracket_database {
        Some(_) if !path.is_empty() => {
            return Err(config(
                "database given both as path and in brackets".to_string(),
            ));
        }
        Some(database) => database,
        None => path,
    };

    Ok(ConnectionOptions {
        alias: String::new(),
        scheme: Scheme::Tcp,
        host: host.to_string(),
        port: url.port().unwrap_or(DEFAULT_PORT),
        user: decode_userinfo(url.username())?,
        password: url.password().map(decode_userinfo).transpose()?,
        database: database.to_string(),
        params: Vec::new(),
    })
}

fn parse_socket(location: &str, bracket_database: Option<&str>) -> Result<ConnectionOptions> {
    let database = bracket_database.ok_or_else(|| {
        config("socket connection strings need the [database] form".to_string())
    })?;

    let (userinfo, path) = match location.find('/') {
        Some(slash) => match location[..slash].strip_suffix('@') {
            Some(userinfo) => (userinfo, &location[slash..]),
            None if slash == 0 => ("", location),
            None => {
                return Err(config(format!("invalid socket location '{}'", location)));
            }
        },
        None => return Err(config(format!("socket path must be absolute in '{}'", location))),
    };
    let (user, password) = match userinfo.split_once(':') {
        Some((user, password)) => (user, Some(decode_userinfo(password)?)),
        None => (userinfo, None),
    };

    Ok(ConnectionOptions {
        alias: String::new(),
        scheme: Scheme::Socket,
        host: path.to_string(),
        port: DEFAULT_PORT,
        user: decode_userinfo(user)?,
        password,
        database: database.to_string(),
        params: Vec::new(),
    })
}

/// Undo percent-encoding in a user name or password.
fn decode_userinfo(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| config(format!("user info is not valid UTF-8: {}", e)))
}

/// Service-wide settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of connections per alias.
    ///
    /// Default: `4`
    pub pool_size: usize,

    /// Client parameters added to every connection that does not set them.
    ///
    /// Default: `[]`
    pub default_params: Vec<(String, String)>,

    /// Maximum number of rows delivered in one batch.
    ///
    /// Default: `1024`
    pub batch_rows: usize,

    /// Types whose results are requested in binary.
    ///
    /// Default: `TypeRegistry::with_builtins()`
    pub registry: Arc<TypeRegistry>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            default_params: Vec::new(),
            batch_rows: 1024,
            registry: Arc::new(TypeRegistry::with_builtins()),
        }
    }
}
