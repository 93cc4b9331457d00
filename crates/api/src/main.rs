// API server clippy configuration
#![allow(clippy::single_match)]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Meridian API Server
//!
//! The backend for the Meridian telehealth subscription service: checkout
//! and intake, Stripe webhook reconciliation, admin reporting, and visitor
//! analytics.

use std::net::SocketAddr;

use axum::http::{header, Method};
use meridian_api::{auth, routes::create_router, AppState, Config};
use meridian_shared::{create_migration_pool, create_pool, run_migrations};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meridian_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Meridian API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Migrations run on a dedicated pool with longer timeouts
    let migration_pool = create_migration_pool(&config.database_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;

    // Seed the admin account when configured
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        match auth::seed_admin(&pool, email, password).await {
            Ok(true) => tracing::info!("Admin account seeded"),
            Ok(false) => tracing::debug!("Admin account already exists"),
            Err(e) => tracing::error!(error = %e, "Failed to seed admin account"),
        }
    }

    let state = AppState::new(pool, config.clone());

    // CORS: configured origins, defaulting to localhost for development
    let allowed_origins: Vec<axum::http::HeaderValue> = if config.allowed_origins.is_empty() {
        ["http://localhost:3000", "http://127.0.0.1:3000"]
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    } else {
        config
            .allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    };

    tracing::info!(
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
