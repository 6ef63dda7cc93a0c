//! Reconcile API - HTTP Layer
//!
//! Exposes the identity resolution engine over Axum (`POST /identify`),
//! together with health probes and an OpenAPI document. `DbClient` is the
//! PostgreSQL contact store the service runs against.

pub mod config;
pub mod db;
pub mod error;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::{IdentifyRequest, IdentifyResponse};
