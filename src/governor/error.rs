use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cache::{CacheError, QuotaMetric},
    db::DbError,
    models::PlanType,
};

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("An active subscription is required to use AI features")]
    PlanRequired,

    #[error("Model '{model}' is not available on the {plan} plan")]
    ForbiddenModel { model: String, plan: PlanType },

    #[error("Requested {requested} tokens exceeds the {plan} plan limit of {max} tokens per request")]
    RequestTooLarge {
        requested: u32,
        max: u32,
        plan: PlanType,
    },

    #[error("Rate limit exceeded: {limit} requests per minute")]
    RateLimited {
        limit: u32,
        current: i64,
        retry_after: u64,
    },

    #[error("Monthly AI {metric} quota exceeded for the {plan} plan")]
    QuotaExceeded {
        plan: PlanType,
        metric: QuotaMetric,
        current_messages: u64,
        current_tokens: u64,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Counter store error: {0}")]
    Cache(#[from] CacheError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl GovernorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GovernorError::PlanRequired | GovernorError::QuotaExceeded { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            GovernorError::ForbiddenModel { .. } => StatusCode::FORBIDDEN,
            GovernorError::RequestTooLarge { .. } | GovernorError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            GovernorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GovernorError::Cache(_) | GovernorError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GovernorError::PlanRequired => "plan_required",
            GovernorError::ForbiddenModel { .. } => "model_not_allowed",
            GovernorError::RequestTooLarge { .. } => "max_tokens_exceeded",
            GovernorError::RateLimited { .. } => "rate_limit_exceeded",
            GovernorError::QuotaExceeded { .. } => "quota_exceeded",
            GovernorError::Validation(_) => "invalid_request",
            GovernorError::Cache(_) => "cache_error",
            GovernorError::Database(_) => "database_error",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GovernorError::PlanRequired | GovernorError::QuotaExceeded { .. } => "billing_error",
            GovernorError::ForbiddenModel { .. } => "permission_error",
            GovernorError::RequestTooLarge { .. } | GovernorError::Validation(_) => {
                "invalid_request_error"
            }
            GovernorError::RateLimited { .. } => "rate_limit_error",
            GovernorError::Cache(_) | GovernorError::Database(_) => "server_error",
        }
    }

    /// Policy rejections are expected outcomes; everything else is a fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            GovernorError::Validation(_) | GovernorError::Cache(_) | GovernorError::Database(_)
        )
    }
}

/// Error body in OpenAI's format:
/// `{"error": {"type": "...", "message": "...", "param": null, "code": "..."}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
                param: None,
                code: Some(code.into()),
            },
        }
    }
}

fn insert_header(response: &mut Response, name: &'static str, value: impl ToString) {
    if let Ok(v) = HeaderValue::try_from(value.to_string()) {
        response.headers_mut().insert(name, v);
    }
}

impl IntoResponse for GovernorError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs
        let message = match &self {
            GovernorError::Cache(e) => {
                tracing::error!(error = %e, "Counter store failure");
                "Usage tracking is temporarily unavailable".to_string()
            }
            GovernorError::Database(e) => {
                tracing::error!(error = %e, "Database failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse::with_type(self.error_type(), self.code(), message);
        let mut response = (status, Json(body)).into_response();

        match self {
            GovernorError::RateLimited {
                limit,
                current,
                retry_after,
            } => {
                let remaining = (limit as i64).saturating_sub(current).max(0);
                insert_header(&mut response, "X-RateLimit-Limit", limit);
                insert_header(&mut response, "X-RateLimit-Remaining", remaining);
                insert_header(&mut response, "X-RateLimit-Reset", retry_after);
                insert_header(&mut response, "Retry-After", retry_after);
            }
            GovernorError::QuotaExceeded {
                current_messages,
                current_tokens,
                ..
            } => {
                insert_header(&mut response, "X-Usage-Messages", current_messages);
                insert_header(&mut response, "X-Usage-Tokens", current_tokens);
            }
            _ => {}
        }

        response
    }
}
