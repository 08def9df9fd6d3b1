//! HTTP server bootstrap for the founding spots engine.
//!
//! This module wires together:
//! - configuration
//! - the storage backend (Postgres pool or in-memory store)
//! - the redemption service
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::Router;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::infra::{
    serve_with_shutdown, MemoryStore, PgCodeRegistry, PgProfileStore, PgRedemptionLedger,
    PgSpotAllocator, RetryConfig,
};
use crate::metrics::MetricsRegistry;
use crate::service::RedemptionService;
use crate::telemetry::{init_telemetry, TelemetryConfig};

/// Which store implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?} (expected postgres or memory)"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    pub backend: StoreBackend,
    pub migrate_on_startup: bool,
    /// Conflict retries per redemption.
    pub allocation_max_retries: u32,
    /// Bound on one allocation including retries.
    pub allocation_timeout: Duration,
    /// Postgres `lock_timeout` for the code row lock.
    pub allocation_lock_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/founding_spots".to_string());

        let port: u16 = env_parse("PORT", 8080)?;
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let backend = match std::env::var("STORE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => StoreBackend::Postgres,
        };

        let migrate_on_startup = std::env::var("DB_MIGRATE_ON_STARTUP")
            .map(|v| {
                !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off"
                )
            })
            .unwrap_or(true);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections: env_parse("MAX_DB_CONNECTIONS", 10)?,
            backend,
            migrate_on_startup,
            allocation_max_retries: env_parse(
                "ALLOCATION_MAX_RETRIES",
                RetryConfig::allocation().max_retries,
            )?,
            allocation_timeout: Duration::from_millis(env_parse("ALLOCATION_TIMEOUT_MS", 5_000)?),
            allocation_lock_timeout: Duration::from_millis(env_parse(
                "ALLOCATION_LOCK_TIMEOUT_MS",
                2_000,
            )?),
        })
    }
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: RedemptionService,
}

impl AppState {
    pub fn new(service: RedemptionService) -> Self {
        Self { service }
    }
}

/// Open the Postgres pool.
pub async fn connect_postgres(config: &Config) -> anyhow::Result<PgPool> {
    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Service over the Postgres stores sharing one pool.
pub fn postgres_service(pool: PgPool, config: &Config) -> RedemptionService {
    RedemptionService::new(
        Arc::new(PgCodeRegistry::new(pool.clone())),
        Arc::new(
            PgSpotAllocator::new(pool.clone()).with_lock_timeout(config.allocation_lock_timeout),
        ),
        Arc::new(PgRedemptionLedger::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool)),
    )
}

async fn build_service(config: &Config) -> anyhow::Result<RedemptionService> {
    let service = match config.backend {
        StoreBackend::Postgres => {
            let pool = connect_postgres(config).await?;
            if config.migrate_on_startup {
                info!("Running database migrations...");
                crate::migrations::run_postgres(&pool).await?;
                info!("Database migrations applied");
            } else {
                info!("DB migrations skipped (DB_MIGRATE_ON_STARTUP=0)");
            }
            postgres_service(pool, config)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            RedemptionService::from_memory(Arc::new(MemoryStore::new()))
        }
    };

    Ok(service
        .with_metrics(Arc::new(MetricsRegistry::new()))
        .with_retry(RetryConfig::allocation().with_max_retries(config.allocation_max_retries))
        .with_allocation_timeout(config.allocation_timeout))
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    info!("Starting founding-spots v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Store backend: {:?}", config.backend);
    info!("  Max connections: {}", config.max_connections);
    info!(
        "  Allocation: {} retries, {:?} timeout, {:?} lock timeout",
        config.allocation_max_retries, config.allocation_timeout, config.allocation_lock_timeout
    );

    let service = build_service(&config).await?;
    let app = build_router(AppState::new(service))?;

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("founding-spots is ready to accept connections");
    serve_with_shutdown(listener, app).await?;

    Ok(())
}

/// Assemble the full router with tracing and optional CORS.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let mut router = Router::new()
        .nest("/api", crate::api::router())
        .merge(crate::api::ops_router())
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router.with_state(state))
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_env_parse_default_and_error() {
        assert_eq!(
            env_parse::<u32>("FOUNDING_SPOTS_TEST_UNSET_VAR", 7).unwrap(),
            7
        );

        std::env::set_var("FOUNDING_SPOTS_TEST_BAD_PORT", "eighty");
        assert!(env_parse::<u16>("FOUNDING_SPOTS_TEST_BAD_PORT", 80).is_err());
        std::env::remove_var("FOUNDING_SPOTS_TEST_BAD_PORT");
    }
}
