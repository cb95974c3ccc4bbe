//! Governor endpoints under `/v1`.

use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State},
    routing::{get, post},
};
use axum_valid::{Valid, ValidRejection};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    governor::{Admission, CallOutcome, GovernorError, RecordedUsage},
    models::{AvailableModels, CallStatus, UsageSummary},
};

pub fn get_api_routes() -> Router<AppState> {
    Router::new()
        .route("/admission", post(check_admission))
        .route("/usage", post(record_usage))
        .route("/orgs/{org_id}/usage", get(usage_summary))
        .route("/orgs/{org_id}/models", get(available_models))
}

/// Validated JSON body. Parse and validation failures are rejected with
/// [`GovernorError::Validation`], so they share the governor's error body.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = GovernorError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Valid(Json(value)) = Valid::<Json<T>>::from_request(req, state)
            .await
            .map_err(|rejection| match rejection {
                ValidRejection::Valid(errors) => GovernorError::Validation(errors.to_string()),
                ValidRejection::Inner(inner) => GovernorError::Validation(inner.body_text()),
            })?;
        Ok(Self(value))
    }
}

/// Pre-flight request for a metered call.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdmissionRequest {
    pub org_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub model: String,
    /// Output token budget the caller will request from the model.
    #[validate(range(min = 1))]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    #[default]
    Success,
    Error,
}

/// Report of a completed upstream call.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UsageReport {
    pub org_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 128))]
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub prompt_length: u64,
    #[serde(default)]
    pub response_length: u64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub status: ReportedStatus,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub error_message: Option<String>,
}

impl From<UsageReport> for CallOutcome {
    fn from(report: UsageReport) -> Self {
        let status = match report.status {
            ReportedStatus::Success => CallStatus::Success,
            ReportedStatus::Error => CallStatus::Error(report.error_message.unwrap_or_default()),
        };

        CallOutcome {
            org_id: report.org_id,
            user_id: report.user_id,
            model: report.model,
            input_tokens: report.input_tokens,
            output_tokens: report.output_tokens,
            prompt_length: report.prompt_length,
            response_length: report.response_length,
            duration_ms: report.duration_ms,
            status,
        }
    }
}

/// Decide whether a call may proceed.
#[tracing::instrument(name = "api.admission", skip_all)]
pub async fn check_admission(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<AdmissionRequest>,
) -> Result<Json<Admission>, GovernorError> {
    let admission = state
        .governor
        .check_admission(request.org_id, &request.model, request.max_tokens)
        .await?;
    Ok(Json(admission))
}

/// Account for a completed call.
#[tracing::instrument(name = "api.usage", skip_all)]
pub async fn record_usage(
    State(state): State<AppState>,
    ValidJson(report): ValidJson<UsageReport>,
) -> Result<Json<RecordedUsage>, GovernorError> {
    let recorded = state.governor.record_usage(report.into()).await?;
    Ok(Json(recorded))
}

#[tracing::instrument(name = "api.usage_summary", skip(state))]
pub async fn usage_summary(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<UsageSummary>, GovernorError> {
    Ok(Json(state.governor.usage_summary(org_id).await?))
}

#[tracing::instrument(name = "api.available_models", skip(state))]
pub async fn available_models(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<AvailableModels>, GovernorError> {
    Ok(Json(state.governor.available_models(org_id).await?))
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use crate::{
        models::{PlanType, SubscriptionStatus, UpsertSubscription},
        routes::test_app::{TestApp, get_json, post_json, test_app},
    };

    use super::*;

    async fn subscribe(app: &TestApp, plan: PlanType) -> Uuid {
        let org_id = Uuid::new_v4();
        app.db
            .subscriptions()
            .upsert(UpsertSubscription {
                org_id,
                plan,
                status: SubscriptionStatus::Active,
                current_period_end: None,
            })
            .await
            .unwrap();
        org_id
    }

    #[tokio::test]
    async fn test_admission_allowed() {
        let app = test_app().await;
        let org = subscribe(&app, PlanType::Pro).await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/admission",
            json!({"org_id": org, "model": "claude-3-haiku", "max_tokens": 4096}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plan"], "pro");
        assert_eq!(body["rate_limit_remaining"], 59);
        assert_eq!(body["usage"]["messages_limit"], 10_000);
    }

    #[tokio::test]
    async fn test_admission_without_plan() {
        let app = test_app().await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/admission",
            json!({"org_id": Uuid::new_v4(), "model": "gpt-4o-mini", "max_tokens": 10}),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "plan_required");
        assert_eq!(body["error"]["type"], "billing_error");
    }

    #[tokio::test]
    async fn test_admission_forbidden_model() {
        let app = test_app().await;
        let org = subscribe(&app, PlanType::Free).await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/admission",
            json!({"org_id": org, "model": "gemini-1.5-pro", "max_tokens": 10}),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "model_not_allowed");
    }

    #[tokio::test]
    async fn test_admission_rate_limited_headers() {
        let app = test_app().await;
        let org = subscribe(&app, PlanType::Free).await;
        let request = json!({"org_id": org, "model": "gpt-4o-mini", "max_tokens": 10});

        for _ in 0..5 {
            let (status, _, _) = post_json(&app.router, "/v1/admission", request.clone()).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, headers, body) = post_json(&app.router, "/v1/admission", request).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "rate_limit_exceeded");
        assert_eq!(headers["X-RateLimit-Limit"], "5");
        assert_eq!(headers["X-RateLimit-Remaining"], "0");
        assert!(headers.contains_key("Retry-After"));
    }

    #[tokio::test]
    async fn test_admission_rejects_invalid_body() {
        let app = test_app().await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/admission",
            json!({"org_id": Uuid::new_v4(), "model": "", "max_tokens": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_usage_rejects_malformed_json() {
        let app = test_app().await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/usage",
            json!({"org_id": "not-a-uuid", "model": "gpt-4o-mini"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_record_usage_and_summary() {
        let app = test_app().await;
        let org = subscribe(&app, PlanType::Free).await;

        let (status, _, body) = post_json(
            &app.router,
            "/v1/usage",
            json!({
                "org_id": org,
                "model": "gpt-4o-mini",
                "input_tokens": 1_000_000,
                "output_tokens": 1_000_000,
                "duration_ms": 1200
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_messages"], 1);
        assert_eq!(body["current_tokens"], 2_000_000);
        assert_eq!(body["cost_cents"], 75);

        let (status, _, body) = post_json(
            &app.router,
            "/v1/usage",
            json!({
                "org_id": org,
                "model": "gpt-4o-mini",
                "input_tokens": 500,
                "status": "error",
                "error_message": "upstream 503"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_messages"], 1);
        assert_eq!(body["cost_cents"], 0);

        let (status, body) = get_json(&app.router, &format!("/v1/orgs/{org}/usage")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plan"], "free");
        assert_eq!(body["current_messages"], 1);
        assert_eq!(body["usage_percentage"], 2.0);
        assert_eq!(body["totals"]["estimated_cost_cents"], 75);
        assert_eq!(body["by_model"][0]["model"], "gpt-4o-mini");

        let logs = app.db.usage().list_request_logs(org, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_available_models() {
        let app = test_app().await;

        let (status, body) =
            get_json(&app.router, &format!("/v1/orgs/{}/models", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plan"], "free");
        assert_eq!(body["models"].as_array().unwrap().len(), 3);
        assert_eq!(body["models"][0]["id"], "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_malformed_org_id() {
        let app = test_app().await;

        let (status, _) = get_json(&app.router, "/v1/orgs/not-a-uuid/usage").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
