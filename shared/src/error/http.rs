//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::ProductNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::MaterialIdExists | Self::CurrencyCodeConflict => StatusCode::CONFLICT,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TimeoutError | Self::ServiceUnavailable | Self::SystemBusy => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            Self::InternalError | Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (validation, unknown category, malformed input)
            Self::ValidationFailed | Self::InvalidRequest | Self::CategoryNotFound => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}
