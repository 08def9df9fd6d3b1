//! Structured API error responses with error codes
//!
//! Malformed requests and infrastructure failures are reported as
//! [`ApiError`] bodies. Business-rule rejections keep the
//! `{success:false, error, reason}` shape but share the same [`ErrorCode`]
//! for their HTTP status and `x-error-code` header.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::Rejection;
use crate::infra::PromoError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors (3xxx)
    /// Request body is malformed or has the wrong shape
    InvalidRequestBody,
    /// Field value is invalid, or the user is unknown
    InvalidFieldValue,

    // Promo rejections (4xxx)
    PromoNotFound,
    PromoInactive,
    PromoExpired,
    SpotsExhausted,
    WrongUserType,
    WrongCountry,
    AlreadyRedeemed,

    // Infrastructure errors (8xxx)
    /// Database operation failed
    DatabaseError,
    /// Datastore unreachable or timed out
    DatastoreUnavailable,
    /// Allocation contention outlasted the retry budget
    AllocationContention,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3002,

            ErrorCode::PromoNotFound => 4001,
            ErrorCode::PromoInactive => 4002,
            ErrorCode::PromoExpired => 4003,
            ErrorCode::SpotsExhausted => 4004,
            ErrorCode::WrongUserType => 4005,
            ErrorCode::WrongCountry => 4006,
            ErrorCode::AlreadyRedeemed => 4007,

            ErrorCode::DatabaseError => 8001,
            ErrorCode::DatastoreUnavailable => 8002,
            ErrorCode::AllocationContention => 8003,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequestBody | ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,

            ErrorCode::PromoNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SpotsExhausted | ErrorCode::AlreadyRedeemed => StatusCode::CONFLICT,
            ErrorCode::PromoInactive
            | ErrorCode::PromoExpired
            | ErrorCode::WrongUserType
            | ErrorCode::WrongCountry => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::DatabaseError
            | ErrorCode::DatastoreUnavailable
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::AllocationContention => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn for_rejection(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::NotFound => ErrorCode::PromoNotFound,
            Rejection::Inactive => ErrorCode::PromoInactive,
            Rejection::Expired => ErrorCode::PromoExpired,
            Rejection::Exhausted => ErrorCode::SpotsExhausted,
            Rejection::WrongUserType { .. } => ErrorCode::WrongUserType,
            Rejection::WrongCountry { .. } => ErrorCode::WrongCountry,
            Rejection::AlreadyRedeemed => ErrorCode::AlreadyRedeemed,
        }
    }

    fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.to_string()).ok()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::PromoNotFound => "PROMO_NOT_FOUND",
            ErrorCode::PromoInactive => "PROMO_INACTIVE",
            ErrorCode::PromoExpired => "PROMO_EXPIRED",
            ErrorCode::SpotsExhausted => "SPOTS_EXHAUSTED",
            ErrorCode::WrongUserType => "WRONG_USER_TYPE",
            ErrorCode::WrongCountry => "WRONG_COUNTRY",
            ErrorCode::AlreadyRedeemed => "ALREADY_REDEEMED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::DatastoreUnavailable => "DATASTORE_UNAVAILABLE",
            ErrorCode::AllocationContention => "ALLOCATION_CONTENTION",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

/// Attach the `x-error-code` header to a response.
pub(crate) fn with_error_code(mut response: Response, code: ErrorCode) -> Response {
    if let Some(value) = code.header_value() {
        response.headers_mut().insert(
            axum::http::header::HeaderName::from_static("x-error-code"),
            value,
        );
    }
    response
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds after which a retry is reasonable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.error.code;
        with_error_code((status, Json(self)).into_response(), code)
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<PromoError> for ApiError {
    fn from(err: PromoError) -> Self {
        match err {
            PromoError::Validation(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            PromoError::Rejected(rejection) => {
                ApiError::new(ErrorCode::for_rejection(&rejection), rejection.to_string())
                    .with_details(serde_json::json!({ "reason": rejection.reason() }))
            }
            PromoError::AllocationConflict(_) => ApiError::new(
                ErrorCode::AllocationContention,
                "Too many concurrent redemptions, please try again",
            )
            .with_retry_after(1),
            PromoError::DatastoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Datastore unavailable");
                ApiError::new(ErrorCode::DatastoreUnavailable, "Datastore unavailable")
            }
            PromoError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ApiError::new(ErrorCode::DatabaseError, "Database error")
            }
            PromoError::ProfileProjection(msg)
            | PromoError::Configuration(msg)
            | PromoError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::new(ErrorCode::InternalError, "Internal error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorCode::InvalidRequestBody, rejection.body_text())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CountryCode, UserType};

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::InvalidRequestBody.numeric_code(), 3001);
        assert_eq!(ErrorCode::PromoNotFound.numeric_code(), 4001);
        assert_eq!(ErrorCode::AlreadyRedeemed.numeric_code(), 4007);
        assert_eq!(ErrorCode::DatabaseError.numeric_code(), 8001);
        assert_eq!(ErrorCode::InternalError.numeric_code(), 8999);
    }

    #[test]
    fn test_rejection_statuses() {
        let cases = [
            (Rejection::NotFound, StatusCode::NOT_FOUND),
            (Rejection::Inactive, StatusCode::UNPROCESSABLE_ENTITY),
            (Rejection::Expired, StatusCode::UNPROCESSABLE_ENTITY),
            (Rejection::Exhausted, StatusCode::CONFLICT),
            (
                Rejection::wrong_user_type(UserType::Agent),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Rejection::WrongCountry {
                    country: CountryCode::parse("GY").unwrap(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (Rejection::AlreadyRedeemed, StatusCode::CONFLICT),
        ];

        for (rejection, status) in cases {
            assert_eq!(ErrorCode::for_rejection(&rejection).http_status(), status);
            assert!(!ErrorCode::for_rejection(&rejection).http_status().is_server_error());
        }
    }

    #[test]
    fn test_promo_error_mapping() {
        let err: ApiError = PromoError::Validation("code must not be empty".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = PromoError::AllocationConflict("busy".into()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error.retry_after, Some(1));

        let err: ApiError = PromoError::DatastoreUnavailable("allocation timed out".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error.code, ErrorCode::DatastoreUnavailable);
    }

    #[test]
    fn test_error_response_header() {
        let response = ApiError::new(ErrorCode::InvalidRequestBody, "bad json").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("x-error-code").unwrap(),
            "INVALID_REQUEST_BODY"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = ApiError::new(ErrorCode::SpotsExhausted, "All spots claimed");
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("SPOTS_EXHAUSTED"));
        assert!(json.contains("4004"));
        assert!(!json.contains("retry_after"));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorCode::WrongUserType.to_string(), "WRONG_USER_TYPE");
        assert_eq!(
            ErrorCode::AllocationContention.to_string(),
            "ALLOCATION_CONTENTION"
        );
    }
}
