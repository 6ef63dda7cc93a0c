//! OpenAPI document for the Reconcile API.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{health, identify};
use crate::types::{IdentifyRequest, IdentifyResponse};
use reconcile_core::ConsolidatedContact;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reconcile API",
        version = "0.1.0",
        description = "Contact identity reconciliation: resolve an email and/or phone number to one consolidated customer identity",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Identity", description = "Identity resolution"),
        (name = "Health", description = "Liveness and readiness probes")
    ),
    paths(
        identify::identify,
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        IdentifyRequest,
        IdentifyResponse,
        ConsolidatedContact,
        ApiError,
        ErrorCode,
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
    ))
)]
pub struct ApiDoc;
