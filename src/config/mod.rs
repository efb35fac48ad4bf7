//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{collections::HashMap, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheConfig, PolicyOverride, ResourceType};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "larder";
const ENV_PREFIX: &str = "LARDER";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// `None` selects the in-process repositories.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub route_cache_enabled: bool,
    /// `None` selects the in-process store.
    pub redis_url: Option<String>,
    pub store_timeout: Duration,
    pub key_version: String,
    pub default_ttl: Duration,
    pub route_ttl: Duration,
    pub route_body_limit_bytes: usize,
    pub memory_capacity: usize,
    pub policies: HashMap<ResourceType, PolicyOverride>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::Purge(args)) => raw.apply_redis_override(&args.redis),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        self.apply_redis_override(&overrides.redis);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(enabled) = overrides.cache_route_enabled {
            self.cache.route_cache_enabled = Some(enabled);
        }
        if let Some(ms) = overrides.cache_store_timeout_ms {
            self.cache.store_timeout_ms = Some(ms);
        }
        if let Some(version) = overrides.cache_key_version.as_ref() {
            self.cache.key_version = Some(version.clone());
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_route_ttl_seconds {
            self.cache.route_ttl_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_redis_override(&mut self, overrides: &RedisOverride) {
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let store_timeout = cache
        .store_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.store_timeout);
    if store_timeout.is_zero() {
        return Err(LoadError::invalid(
            "cache.store_timeout_ms",
            "must be greater than zero",
        ));
    }

    let key_version = cache
        .key_version
        .map(|value| value.trim().to_string())
        .unwrap_or(defaults.key_version);
    if key_version.is_empty() || key_version.contains([':', '*', '?', '[', ']']) {
        return Err(LoadError::invalid(
            "cache.key_version",
            "must be non-empty and free of `:` and glob characters",
        ));
    }

    let default_ttl = cache
        .default_ttl_seconds
        .map(|seconds| positive_seconds(seconds, "cache.default_ttl_seconds"))
        .transpose()?
        .unwrap_or(defaults.default_ttl);
    let route_ttl = cache
        .route_ttl_seconds
        .map(|seconds| positive_seconds(seconds, "cache.route_ttl_seconds"))
        .transpose()?
        .unwrap_or(defaults.route_ttl);

    let mut policies = HashMap::new();
    for (name, policy) in cache.policies {
        let resource = ResourceType::from_str(&name)
            .map_err(|err| LoadError::invalid("cache.policies", err.to_string()))?;
        let ttl = policy
            .ttl_seconds
            .map(|seconds| positive_seconds(seconds, "cache.policies.ttl_seconds"))
            .transpose()?;
        policies.insert(
            resource,
            PolicyOverride {
                ttl,
                invalidate: policy.invalidate,
            },
        );
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        route_cache_enabled: cache
            .route_cache_enabled
            .unwrap_or(defaults.route_cache_enabled),
        redis_url: non_blank(cache.redis_url),
        store_timeout,
        key_version,
        default_ttl,
        route_ttl,
        route_body_limit_bytes: cache
            .route_body_limit_bytes
            .unwrap_or(defaults.route_body_limit_bytes),
        memory_capacity: cache
            .memory_capacity
            .unwrap_or(defaults.memory_capacity),
        policies,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    route_cache_enabled: Option<bool>,
    redis_url: Option<String>,
    store_timeout_ms: Option<u64>,
    key_version: Option<String>,
    default_ttl_seconds: Option<u64>,
    route_ttl_seconds: Option<u64>,
    route_body_limit_bytes: Option<usize>,
    memory_capacity: Option<usize>,
    policies: HashMap<String, RawPolicySettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPolicySettings {
    ttl_seconds: Option<u64>,
    invalidate: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
