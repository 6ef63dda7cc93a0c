//! Identity Resolution Endpoint
//!
//! `POST /identify` resolves an email and/or phone number to the
//! consolidated identity it belongs to, creating, linking or merging
//! contact rows as needed.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use reconcile_engine::IdentityResolver;

use crate::error::{ApiError, ApiResult};
use crate::types::{IdentifyRequest, IdentifyResponse};

/// POST /identify - Resolve a contact observation
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/identify",
    tag = "Identity",
    request_body = IdentifyRequest,
    responses(
        (status = 200, description = "Consolidated identity", body = IdentifyResponse),
        (status = 400, description = "Missing, blank or malformed identifiers", body = ApiError),
        (status = 500, description = "Inconsistent data or failed merge", body = ApiError),
        (status = 503, description = "Contact store unavailable", body = ApiError),
    ),
))]
pub async fn identify(
    State(resolver): State<IdentityResolver>,
    payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> ApiResult<Json<IdentifyResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected identify body");
        ApiError::invalid_input(rejection.body_text())
    })?;

    let identifiers = request.into_identifiers()?;
    let contact = resolver.identify(&identifiers).await?;

    Ok(Json(contact.into()))
}
