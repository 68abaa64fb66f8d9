//! HTTP error mapping.
//!
//! The §7-style taxonomy mapped onto status codes:
//! 400 validation, 401/403 policy and consent denials, 404 not found,
//! 409 integrity conflicts, 429 rate limits, 5xx upstream/timeout.
//! Bodies are `{error, reason, request_id}` and pass through the PHI
//! redactor so no response can leak identifiers.

use aegis_redaction::redact_phi;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("access denied: {0}")]
    PolicyDeny(String),

    #[error("consent denied: {0}")]
    ConsentDeny(String),

    #[error("{0}")]
    NotFound(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("rate limited")]
    RateLimit,

    #[error("deadline exceeded")]
    Timeout,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PolicyDeny(_) | Self::ConsentDeny(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Integrity(_) => StatusCode::CONFLICT,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PolicyDeny(_) => "policy_deny",
            Self::ConsentDeny(_) => "consent_deny",
            Self::NotFound(_) => "not_found",
            Self::Integrity(_) => "integrity",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }

    /// Attach the request id and render the response body.
    pub fn into_response_with_request_id(self, request_id: &str) -> Response {
        let body = json!({
            "error": self.kind(),
            "reason": redact_phi(&self.to_string()),
            "request_id": request_id,
        });
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with_request_id("-")
    }
}

impl From<aegis_data::DataError> for ApiError {
    fn from(error: aegis_data::DataError) -> Self {
        match error {
            aegis_data::DataError::PatientNotFound(id) => Self::NotFound(format!("patient {id}")),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<aegis_ai::GatewayError> for ApiError {
    fn from(error: aegis_ai::GatewayError) -> Self {
        match error {
            aegis_ai::GatewayError::GuardrailBlocked { violations } => {
                Self::Validation(format!("blocked by guardrails: {}", violations.join(", ")))
            }
            aegis_ai::GatewayError::DeadlineExceeded => Self::Timeout,
            aegis_ai::GatewayError::NoProviders => {
                Self::Upstream("no LLM providers configured".to_string())
            }
            aegis_ai::GatewayError::AllProvidersFailed { last } => Self::Upstream(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PolicyDeny("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Integrity("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::RateLimit.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::Upstream("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_reason_is_redacted() {
        let error = ApiError::Validation("bad SSN 123-45-6789 in field".into());
        // the rendered reason must not carry the SSN through
        assert!(!redact_phi(&error.to_string()).contains("123-45-6789"));
    }
}
