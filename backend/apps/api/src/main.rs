//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use anyhow::{Context, bail};
use axum::{
    Json, Router, http,
    http::{Method, header},
    routing::get,
};
use kernel::error::app_error::AppError;
use platform::cookie::SameSite;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use throttle::{
    AdminUseCase, Clock, CounterRepository, InMemoryCounterRepository, PgCounterRepository, Quota,
    RateLimitGuardState, SystemClock, ThrottleConfig, admin_router, admin_router_generic, governed,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Requests per minute allowed on the ping endpoint
const PING_REQUESTS_PER_MINUTE: u32 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,throttle=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = throttle_config()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = env::var("RATE_LIMIT_STORE").unwrap_or_else(|_| "postgres".to_string());
    let routes = match store.as_str() {
        "postgres" => {
            let pool = connect_database().await?;
            let repo = PgCounterRepository::new(pool);
            log_stats(&repo, &config, &clock).await;
            api_routes(repo.clone(), &config, &clock)?
                .nest("/api/admin/rate-limits", admin_router(repo, config))
        }
        "memory" => {
            tracing::warn!("Using in-memory rate limit store; counters are lost on restart");
            let repo = InMemoryCounterRepository::new();
            api_routes(repo.clone(), &config, &clock)?.nest(
                "/api/admin/rate-limits",
                admin_router_generic(repo, config, clock.clone()),
            )
        }
        other => bail!("RATE_LIMIT_STORE must be `postgres` or `memory`, got `{other}`"),
    };

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let app = routes
        .fallback(|| async { AppError::not_found("No route matches this path") })
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:31113".to_string())
        .parse()
        .context("BIND_ADDR must be a socket address")?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Connect to Postgres and run pending migrations
async fn connect_database() -> anyhow::Result<PgPool> {
    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL must be set in environment")?;
    let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
        Ok(value) => value
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
        Err(_) => 5,
    };

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await?;

    tracing::info!(max_connections, "Connected to database");

    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");
    Ok(pool)
}

fn throttle_config() -> anyhow::Result<ThrottleConfig> {
    let mut config = match env::var("GUEST_TOKEN_SECRET") {
        Ok(secret_b64) => {
            let secret_bytes = platform::crypto::from_base64(secret_b64.trim())
                .context("GUEST_TOKEN_SECRET must be base64")?;
            let secret: [u8; 32] = secret_bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("GUEST_TOKEN_SECRET must decode to 32 bytes"))?;
            ThrottleConfig {
                guest_secret: secret,
                cookie_secure: !cfg!(debug_assertions),
                ..ThrottleConfig::default()
            }
        }
        Err(_) if cfg!(debug_assertions) => {
            tracing::warn!("GUEST_TOKEN_SECRET not set, using a random secret");
            ThrottleConfig::development()
        }
        Err(_) => bail!("GUEST_TOKEN_SECRET must be set in production"),
    };

    if let Ok(value) = env::var("COOKIE_SAME_SITE") {
        config.cookie_same_site = SameSite::parse(&value)
            .with_context(|| format!("COOKIE_SAME_SITE must be strict, lax or none, got {value}"))?;
    }

    if let Ok(value) = env::var("TRUST_FORWARDED_HEADERS") {
        config.trust_forwarded_headers = value
            .trim()
            .parse()
            .with_context(|| format!("TRUST_FORWARDED_HEADERS must be true or false, got {value}"))?;
    }
    if config.trust_forwarded_headers {
        tracing::info!("Client addresses are taken from X-Forwarded-For / X-Real-IP");
    }

    Ok(config)
}

/// Public API routes, each behind its own rate limit guard
fn api_routes<R>(
    repo: R,
    config: &ThrottleConfig,
    clock: &Arc<dyn Clock>,
) -> anyhow::Result<Router>
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let quota = Quota::per_minutes(PING_REQUESTS_PER_MINUTE, 1).context("invalid ping quota")?;
    let guard = RateLimitGuardState::new(
        Arc::new(repo),
        Arc::new(config.clone()),
        clock.clone(),
        "ping",
        quota,
    );
    let ping = governed(Router::new().route("/ping", get(ping)), guard);

    Ok(Router::new().nest("/api", ping))
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "pong": true }))
}

/// Startup summary of the counter store
async fn log_stats<R>(repo: &R, config: &ThrottleConfig, clock: &Arc<dyn Clock>)
where
    R: CounterRepository + Clone + Send + Sync + 'static,
{
    let admin = AdminUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(config.clone()),
        clock.clone(),
    );
    // Errors here should not prevent server startup
    match admin.stats().await {
        Ok(stats) => {
            tracing::info!(
                total = stats.total,
                temporarily_blocked = stats.temporarily_blocked,
                permanently_blocked = stats.permanently_blocked,
                "Rate limit counters loaded"
            );
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Rate limit stats unavailable, continuing anyway"
            );
        }
    }
}
