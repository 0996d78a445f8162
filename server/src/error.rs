//! HTTP error mapping.
//!
//! Every failure becomes a JSON body `{"error": "<code>"}` with a matching
//! status. Internal details stay in the logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use longq_license::LicenseError;
use serde::{Deserialize, Serialize};

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
}

/// Errors returned by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// The request body is not JSON.
    InvalidJson,
    /// No route for this method and path.
    NotFound,
    /// Issuance failed.
    Issue(LicenseError),
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        Self::Issue(err)
    }
}

impl ApiError {
    /// Returns the HTTP status and error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidJson => (StatusCode::BAD_REQUEST, "invalid_json"),
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Self::Issue(err) => {
                let status = match err {
                    LicenseError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    LicenseError::EmailNotAllowed | LicenseError::SeatLimitReached { .. } => {
                        StatusCode::FORBIDDEN
                    }
                    LicenseError::ServerMisconfig(_)
                    | LicenseError::CorruptRecord { .. }
                    | LicenseError::Store(_)
                    | LicenseError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if let Self::Issue(err) = &self {
            if status.is_server_error() {
                tracing::error!(error = %err, "issuance failed");
            } else {
                tracing::debug!(error = %err, "issuance refused");
            }
        }

        let body = ErrorBody {
            error: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
