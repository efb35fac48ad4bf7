use std::{process, sync::Arc};

use larder::{
    application::error::AppError,
    cache::{
        CacheConfig, CacheContext, CachePolicies, CacheStore, MemoryStore, RedisStore, WriteEvent,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        memory::MemoryRepositories,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => serve(settings).await,
        config::Command::Migrate(_) => migrate(settings).await,
        config::Command::Purge(args) => purge(settings, args).await,
    }
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = init_store(&settings.cache, &cache_config).await?;
    let policies = CachePolicies::with_overrides(&cache_config, &settings.cache.policies);
    let cache = CacheContext::new(store, &cache_config, policies);
    let route_cache = cache.route_cache(&cache_config);

    let state = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
            let repos = Arc::new(PostgresRepositories::new(pool));
            ApiState::from_repositories(repos, cache, route_cache)
        }
        None => {
            warn!("database url is not configured; using in-memory repositories");
            let repos = Arc::new(MemoryRepositories::new());
            ApiState::from_repositories(repos, cache, route_cache)
        }
    };

    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, 1)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!("migrations applied");
    Ok(())
}

/// Run the invalidation of one record against the configured store.
async fn purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let extra_selectors = args
        .extra_selectors()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    let redis_url = settings
        .cache
        .redis_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("cache redis_url is not configured"))?;
    let store = RedisStore::connect(redis_url)
        .await
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let cache_config = CacheConfig::from(&settings.cache);
    let policies = CachePolicies::with_overrides(&cache_config, &settings.cache.policies);
    let cache = CacheContext::new(Arc::new(store), &cache_config, policies);

    let event = WriteEvent {
        extra_selectors,
        ..WriteEvent::new(args.resource, args.id, args.owner)
    };
    let report = cache.dispatcher().dispatch(&event).await;
    if let Some(partial) = report.partial {
        return Err(InfraError::cache(partial.to_string()).into());
    }

    info!(
        resource = %args.resource,
        id = args.id,
        owner = ?args.owner,
        removed = report.removed,
        "purge complete"
    );
    Ok(())
}

async fn init_store(
    settings: &config::CacheSettings,
    cache_config: &CacheConfig,
) -> Result<Arc<dyn CacheStore>, AppError> {
    match settings.redis_url.as_deref() {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
            info!(
                backend = store.backend(),
                connected = store.is_connected(),
                "cache store ready"
            );
            Ok(Arc::new(store))
        }
        None => {
            info!(
                capacity = cache_config.memory_capacity,
                "cache redis_url is not configured; using in-process store"
            );
            Ok(Arc::new(MemoryStore::new(
                cache_config.memory_capacity_non_zero(),
            )))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
