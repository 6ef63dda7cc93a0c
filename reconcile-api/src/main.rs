//! Reconcile API Server Entry Point
//!
//! Bootstraps telemetry, connects to PostgreSQL, ensures the schema and
//! starts the Axum HTTP server.

use std::sync::Arc;

use reconcile_api::telemetry::{init_tracer, TelemetryConfig};
use reconcile_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbClient, DbConfig};
use reconcile_engine::{IdentityResolver, ResolverConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    let db_time = db.probe().await?;
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        %db_time,
        "Connected to PostgreSQL"
    );

    if db_config.migrate {
        db.migrate().await?;
    }

    let resolver_config = ResolverConfig::from_env();
    tracing::info!(?resolver_config, "Resolver configured");
    let resolver = IdentityResolver::new(Arc::new(db), resolver_config);

    let app = create_api_router(AppState::new(resolver), &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting Reconcile API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
