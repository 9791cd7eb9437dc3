//! Vend Settlement Server - Main Application Entry Point
//!
//! REST API that sells airtime, data, exam PINs and electricity against prepaid
//! wallets. Each purchase is charged, sent to the vending gateway and settled
//! exactly once: completed, or failed with a full refund.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Provider**: reqwest client for the vending gateway
//! - **Authentication**: API key with SHA-256 hashing
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the provider client and vend orchestrator
//! 4. Refund attempts abandoned by a previous run
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    services::{
        provider_client::ProviderClient, recovery, settlement_store::PgSettlementStore,
        vend_orchestrator::VendOrchestrator,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    let recovery_stale_after = config.recovery_stale_after()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let provider = ProviderClient::new(config.provider()?)?;
    tracing::info!(base_url = %config.provider_base_url, "Provider client ready");

    let store = PgSettlementStore::shared(pool.clone());

    // Settle whatever a previous process left charged but unsettled
    let recovered = recovery::recover_abandoned(store.as_ref(), recovery_stale_after).await?;
    tracing::info!(recovered, "Abandoned attempt recovery complete");

    let orchestrator = Arc::new(VendOrchestrator::new(
        store,
        Arc::new(provider),
        config.settlement_policy(),
    ));

    let state = AppState {
        pool: pool.clone(),
        orchestrator,
    };

    let authenticated_routes = Router::new()
        .route("/api/v1/vend", post(handlers::vend::create_vend))
        .route("/api/v1/wallet", get(handlers::wallet::get_wallet))
        .route("/api/v1/services", get(handlers::services::list_services))
        .route(
            "/api/v1/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/api/v1/transactions/{reference}",
            get(handlers::transactions::get_transaction),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            pool,
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
