use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use serde_json::Value;

use crate::cache::{InvalidSelectorError, ResourceType, SelectorPart, selectors_from_values};

/// Command-line arguments for the larder binary.
#[derive(Debug, Parser)]
#[command(name = "larder", version, about = "Larder catering catalog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LARDER_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
    /// Invalidate cached entries of one record, as a write would.
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RedisOverride {
    /// Override the Redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub redis: RedisOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Enable the data cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Enable the route response cache.
    #[arg(
        long = "cache-route-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_route_enabled: Option<bool>,

    /// Override the store round-trip timeout in milliseconds.
    #[arg(long = "cache-store-timeout-ms", value_name = "MS")]
    pub cache_store_timeout_ms: Option<u64>,

    /// Override the key version suffix.
    #[arg(long = "cache-key-version", value_name = "VERSION")]
    pub cache_key_version: Option<String>,

    /// Override the default entry TTL.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the route response TTL.
    #[arg(long = "cache-route-ttl-seconds", value_name = "SECONDS")]
    pub cache_route_ttl_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub redis: RedisOverride,

    /// Resource type of the record (chef, dish or menu).
    #[arg(long, value_name = "RESOURCE")]
    pub resource: ResourceType,

    /// Id of the record.
    #[arg(long, value_name = "ID")]
    pub id: i64,

    /// Owning chef, required to reach owner-scoped lists.
    #[arg(long, value_name = "ID")]
    pub owner: Option<i64>,

    /// Further owner scopes to purge, e.g. the previous chef of a moved dish.
    /// Read as JSON scalars; unparseable text is taken as a string.
    #[arg(long = "extra-owner", value_name = "VALUE")]
    pub extra_owners: Vec<String>,
}

impl PurgeArgs {
    pub fn extra_selectors(&self) -> Result<Vec<SelectorPart>, InvalidSelectorError> {
        let values: Vec<Value> = self
            .extra_owners
            .iter()
            .map(|text| serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())))
            .collect();
        selectors_from_values(&values)
    }
}
