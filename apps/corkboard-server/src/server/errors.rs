use axum::{http::StatusCode, response::IntoResponse, Json};
use corkboard_core::DomainError;

use super::{metrics::record_business_rule_rejection, types::ErrorBody};

/// Failure taxonomy shared by every service and command.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("business rule violation: {0}")]
    BusinessRuleViolation(String),
    #[error("conflicting concurrent mutation")]
    Conflict,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid request")]
    InvalidRequest,
    #[error("internal error")]
    Internal,
}

impl From<DomainError> for ServiceError {
    fn from(_: DomainError) -> Self {
        Self::InvalidRequest
    }
}

/// Rejects a well-formed, authorized command that would break an invariant.
pub(crate) fn business_rule(rule: &'static str, reason: impl Into<String>) -> ServiceError {
    let reason = reason.into();
    record_business_rule_rejection(rule);
    tracing::info!(event = "business_rule.rejected", rule, reason = %reason);
    ServiceError::BusinessRuleViolation(reason)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody::new("not_found")),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(ErrorBody::new("forbidden")),
            )
                .into_response(),
            Self::BusinessRuleViolation(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    error: "business_rule_violation",
                    reason: Some(reason),
                }),
            )
                .into_response(),
            Self::Conflict => (
                StatusCode::CONFLICT,
                Json(ErrorBody::new("conflict")),
            )
                .into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new("unauthorized")),
            )
                .into_response(),
            Self::InvalidRequest => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("invalid_request")),
            )
                .into_response(),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("internal_error")),
            )
                .into_response(),
        }
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
