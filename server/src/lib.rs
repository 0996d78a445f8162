//! HTTP API for the LongQ license service.
//!
//! - `POST /issue` issues or replays a license (`201` new, `200` replay)
//! - `GET /` is the liveness probe
//! - anything else answers `404 {"error":"not_found"}`

mod error;
mod provision;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use longq_license::{IssueRequest, License, LicenseError, LicenseIssuer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use error::{ApiError, ErrorBody};
pub use provision::load_allowlist_file;

/// Liveness probe body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub ok: bool,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn issue_handler(
    State(issuer): State<Arc<LicenseIssuer>>,
    body: Bytes,
) -> Result<(StatusCode, Json<License>), ApiError> {
    let request = parse_issue_request(&body)?;
    let issued = issuer.issue(&request).await?;
    let status = if issued.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(issued.license)))
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}

/// Decodes an `/issue` body.
///
/// Bytes that are not JSON are `invalid_json`; JSON of the wrong shape is
/// `invalid_request`.
fn parse_issue_request(body: &[u8]) -> Result<IssueRequest, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ApiError::InvalidJson)?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::Issue(LicenseError::InvalidRequest(e.to_string())))
}

/// Build the HTTP API router around a shared issuer.
pub fn build_router(issuer: Arc<LicenseIssuer>) -> Router {
    Router::new()
        .route("/", get(health_handler).fallback(not_found_handler))
        .route("/issue", post(issue_handler).fallback(not_found_handler))
        .fallback(not_found_handler)
        .with_state(issuer)
}
