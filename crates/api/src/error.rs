//! API error taxonomy and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use meridian_billing::BillingError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields -> 400
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credential -> 401
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed -> 403
    #[error("{0}")]
    Forbidden(String),

    /// Referenced entity absent -> 404
    #[error("{0}")]
    NotFound(String),

    /// Billing not configured -> 503
    #[error("billing service unavailable")]
    ServiceUnavailable,

    /// Processor call failed -> 500
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Store access failed -> 500
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message surfaced to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => msg.clone(),
            ApiError::ServiceUnavailable => "Billing is not configured".to_string(),
            ApiError::Upstream(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::UnknownPlan { .. } => {
                ApiError::Validation("Invalid product or plan selection".to_string())
            }
            BillingError::CustomerNotFound(_) => {
                ApiError::NotFound("No subscription found".to_string())
            }
            BillingError::SubscriptionNotFound(_) => {
                ApiError::NotFound("Subscription not found".to_string())
            }
            BillingError::WebhookSignatureInvalid => {
                ApiError::Validation("Invalid signature".to_string())
            }
            BillingError::Stripe(err) => ApiError::Upstream(err.to_string()),
            BillingError::Database(err) => ApiError::Database(err),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::ServiceUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Database("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_not_leaked() {
        let e = ApiError::Database("connection refused to 10.0.0.5".into());
        assert_eq!(e.public_message(), "Internal server error");

        let e = ApiError::Validation("email is required".into());
        assert_eq!(e.public_message(), "email is required");
    }

    #[test]
    fn billing_errors_map_to_api_errors() {
        let e: ApiError = BillingError::UnknownPlan {
            product: "semaglutide".into(),
            plan: "weekly".into(),
        }
        .into();
        assert!(matches!(e, ApiError::Validation(_)));

        let e: ApiError = BillingError::CustomerNotFound("a@b.c".into()).into();
        assert!(matches!(e, ApiError::NotFound(_)));

        let e: ApiError = BillingError::WebhookSignatureInvalid.into();
        assert!(matches!(e, ApiError::Validation(_)));
    }
}
