//! Route Modules
//!
//! Assembles the service router: the identify endpoint, health checks and
//! the OpenAPI document, wrapped in tracing, timeout and CORS layers.

pub mod health;
pub mod identify;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue, Method},
    routing::post,
    BoxError, Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;

#[cfg(feature = "openapi")]
use axum::{response::IntoResponse, routing::get, Json};

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Turn middleware failures into structured API errors.
async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request timed out");
        ApiError::timeout("request")
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::internal_error("Unhandled internal error")
    }
}

/// Build the CORS layer from configuration.
///
/// An empty origin list allows every origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - `POST /identify`
/// - `GET /health/{ping,live,ready}`
/// - `GET /openapi.json` (feature `openapi`)
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/identify", post(identify::identify))
        .nest("/health", health::create_router());

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(build_cors_layer(config)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_maps_to_gateway_timeout() {
        let err: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let api_error = handle_middleware_error(err).await;
        assert_eq!(api_error.code, crate::error::ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_other_middleware_errors_are_internal() {
        let err: BoxError = "boom".into();
        let api_error = handle_middleware_error(err).await;
        assert_eq!(api_error.code, crate::error::ErrorCode::InternalError);
        assert!(!api_error.message.contains("boom"));
    }
}
