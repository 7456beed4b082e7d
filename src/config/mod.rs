//! Configuration layer: the gateway document plus layered precedence
//! (file → environment → CLI).

pub mod cli;
pub mod endpoints;

pub use cli::{CliArgs, Command, ServeArgs, load_with_cli};
pub use endpoints::{
    CacheConfig, EndpointConfig, HandlerConfig, QueryDef, RateLimitConfig, ResponseConfig,
    TransactionConfig,
};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_FILE: &str = "gateway.yaml";
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;

/// Environment override for the storage DSN.
pub const ENV_DB_DSN: &str = "VARCO_DB_DSN";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub http_addr: SocketAddr,
    /// Accepted by the schema; serving gRPC is not implemented.
    pub grpc_addr: Option<String>,
    /// Feature flags exposed to pipelines as the `features` scope key.
    pub features: BTreeMap<String, bool>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub dsn: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse configuration: {0}")]
    ParseString(#[source] serde_yaml::Error),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → env → CLI).
pub fn load(args: &CliArgs) -> Result<Settings, LoadError> {
    let path = args
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut raw = load_document(&path)?;
    apply_env(&mut raw);

    match args.command.as_ref() {
        Some(Command::Serve(serve)) => raw.apply_serve_overrides(serve),
        None => raw.apply_serve_overrides(&ServeArgs::default()),
    }

    Settings::from_raw(raw)
}

/// Parse a gateway document from a string. `include` is a file-system
/// feature and is rejected here.
pub fn load_from_str(contents: &str) -> Result<Settings, LoadError> {
    let raw: RawDocument = serde_yaml::from_str(contents).map_err(LoadError::ParseString)?;
    if !raw.include.is_empty() {
        return Err(LoadError::invalid(
            "include",
            "not supported when loading from a string",
        ));
    }
    Settings::from_raw(raw)
}

fn load_document(path: &Path) -> Result<RawDocument, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw: RawDocument =
        serde_yaml::from_str(&contents).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    // Includes resolve relative to the including file; their endpoints
    // append in order and their set values override, later includes last.
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let includes = std::mem::take(&mut raw.include);
    for include in includes {
        let child = load_document(&base.join(include))?;
        raw.merge(child);
    }

    Ok(raw)
}

fn apply_env(raw: &mut RawDocument) {
    if let Ok(dsn) = std::env::var(ENV_DB_DSN) {
        if !dsn.trim().is_empty() {
            raw.storage.dsn = Some(dsn);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocument {
    server: RawServer,
    storage: RawStorage,
    logging: RawLogging,
    include: Vec<PathBuf>,
    endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServer {
    http: Option<String>,
    grpc: Option<String>,
    features: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorage {
    dsn: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLogging {
    level: Option<String>,
    json: Option<bool>,
}

impl RawDocument {
    fn merge(&mut self, child: RawDocument) {
        if child.server.http.is_some() {
            self.server.http = child.server.http;
        }
        if child.server.grpc.is_some() {
            self.server.grpc = child.server.grpc;
        }
        for (flag, enabled) in child.server.features {
            self.server.features.insert(flag, enabled);
        }
        if child.storage.dsn.is_some() {
            self.storage.dsn = child.storage.dsn;
        }
        if child.storage.max_connections.is_some() {
            self.storage.max_connections = child.storage.max_connections;
        }
        if child.logging.level.is_some() {
            self.logging.level = child.logging.level;
        }
        if child.logging.json.is_some() {
            self.logging.json = child.logging.json;
        }
        self.endpoints.extend(child.endpoints);
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeArgs) {
        if let Some(addr) = overrides.server_http.as_ref() {
            self.server.http = Some(addr.clone());
        }
        if let Some(dsn) = overrides.database_dsn.as_ref() {
            self.storage.dsn = Some(dsn.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.storage.max_connections = Some(max);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawDocument) -> Result<Self, LoadError> {
        let RawDocument {
            server,
            storage,
            logging,
            include: _,
            endpoints,
        } = raw;

        let http_addr = server
            .http
            .as_deref()
            .unwrap_or(DEFAULT_HTTP_ADDR)
            .parse::<SocketAddr>()
            .map_err(|err| {
                LoadError::invalid("server.http", format!("invalid listen address: {err}"))
            })?;

        let dsn = storage.dsn.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let max_connections = NonZeroU32::new(
            storage.max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        )
        .ok_or_else(|| {
            LoadError::invalid("storage.max_connections", "must be greater than zero")
        })?;

        let level = match logging.level {
            Some(level) => LevelFilter::from_str(&level).map_err(|err| {
                LoadError::invalid("logging.level", format!("failed to parse: {err}"))
            })?,
            None => LevelFilter::INFO,
        };
        let format = if logging.json.unwrap_or(false) {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };

        for endpoint in &endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(LoadError::invalid(
                    "endpoints.path",
                    format!("path `{}` must start with `/`", endpoint.path),
                ));
            }
        }

        Ok(Self {
            server: ServerSettings {
                http_addr,
                grpc_addr: server.grpc,
                features: server.features,
            },
            storage: StorageSettings {
                dsn,
                max_connections,
            },
            logging: LoggingSettings { level, format },
            endpoints,
        })
    }
}
