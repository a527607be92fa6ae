//! Console statistics API router and handlers.
//!
//! Authentication happens upstream; the authenticated account id arrives in
//! the `X-Account-Id` header.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, HeaderValue, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono_tz::Tz;
use serde::Serialize;
use tower::{Layer, Service};

use crate::database::Database;
use crate::error::{ErrorContext, Result, StatsError};
use crate::models::{App, AppMode};
use crate::statistics::{StatisticsService, WorkflowRunCost};
use crate::timerange::{parse_timezone, TimeRangeQuery};

/// Header carrying the authenticated account id.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Header echoing the request id used in logs and error bodies.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const APP_NOT_FOUND: &str = "App not found.";
const APP_MODE_UNSUPPORTED: &str = "App mode is not in the supported list.";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Request id assigned by [`RequestLoggingLayer`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Request logging middleware layer
#[derive(Clone)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingService { inner }
    }
}

/// Tags each request with an id and logs method, path, status and response time
#[derive(Clone)]
pub struct RequestLoggingService<S> {
    inner: S,
}

impl<S> Service<Request> for RequestLoggingService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let start = std::time::Instant::now();

        let request_id = uuid::Uuid::new_v4().to_string();
        req.extensions_mut().insert(RequestId(request_id.clone()));

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            let duration = start.elapsed();
            let status = response.status();

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            tracing::info!(
                method = %method,
                path = %uri.path(),
                status = %status.as_u16(),
                duration_ms = %duration.as_millis(),
                request_id = %request_id,
                "HTTP request"
            );

            Ok(response)
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub stats: Arc<StatisticsService>,
    /// Used for accounts without a timezone.
    pub default_timezone: Tz,
}

impl AppState {
    pub fn new(db: Arc<Database>, default_timezone: Tz) -> Self {
        Self {
            stats: Arc::new(StatisticsService::new(db.clone())),
            db,
            default_timezone,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with a request ID for tracking
    pub fn with_request_id(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: Some(request_id.into()),
        }
    }
}

/// Convert a StatsError into an API error, logging it with its context.
fn handle_error(error: StatsError, context: ErrorContext) -> ApiError {
    error.log_with_context(&context);

    (
        error.status_code(),
        Json(ErrorResponse::with_request_id(
            error.user_message(),
            context.request_id,
        )),
    )
}

/// Statistic served under `/statistics/{metric}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    DailyMessages,
    DailyConversations,
    DailyEndUsers,
    TokenCosts,
    AverageSessionInteractions,
    UserSatisfactionRate,
    AverageResponseTime,
    TokensPerSecond,
    Conversations,
    WorkflowRuns,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::DailyMessages,
        Metric::DailyConversations,
        Metric::DailyEndUsers,
        Metric::TokenCosts,
        Metric::AverageSessionInteractions,
        Metric::UserSatisfactionRate,
        Metric::AverageResponseTime,
        Metric::TokensPerSecond,
        Metric::Conversations,
        Metric::WorkflowRuns,
    ];

    /// Route segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyMessages => "daily-messages",
            Self::DailyConversations => "daily-conversations",
            Self::DailyEndUsers => "daily-end-users",
            Self::TokenCosts => "token-costs",
            Self::AverageSessionInteractions => "average-session-interactions",
            Self::UserSatisfactionRate => "user-satisfaction-rate",
            Self::AverageResponseTime => "average-response-time",
            Self::TokensPerSecond => "tokens-per-second",
            Self::Conversations => "conversations",
            Self::WorkflowRuns => "workflow-runs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.as_str() == s)
    }

    /// App modes the metric is served for. Empty means every mode.
    pub fn modes(&self) -> &'static [AppMode] {
        match self {
            Self::AverageSessionInteractions => AppMode::CHAT_MODES,
            Self::AverageResponseTime => &[AppMode::Completion],
            Self::WorkflowRuns => AppMode::WORKFLOW_MODES,
            _ => &[],
        }
    }
}

/// Authenticated caller with the timezone and tenant statistics are scoped to.
#[derive(Debug, Clone)]
pub struct Caller {
    pub account_id: String,
    pub tenant_id: String,
    pub timezone: Tz,
    pub request_id: String,
}

impl Caller {
    fn error_context(&self, operation: &str) -> ErrorContext {
        ErrorContext::new(operation)
            .with_request_id(self.request_id.clone())
            .with_account_id(self.account_id.clone())
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let context = ErrorContext::new("resolve_caller").with_request_id(request_id.clone());

        let account_id = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let Some(account_id) = account_id else {
            return Err(handle_error(
                StatsError::Unauthorized("missing account".to_string()),
                context,
            ));
        };
        let context = context.with_account_id(account_id.clone());

        resolve_caller(state, &account_id, request_id)
            .await
            .map_err(|e| handle_error(e, context))
    }
}

async fn resolve_caller(state: &AppState, account_id: &str, request_id: String) -> Result<Caller> {
    let account = state
        .db
        .get_account(account_id)
        .await?
        .ok_or_else(|| StatsError::Unauthorized("unknown account".to_string()))?;

    let tenant_id = account
        .current_tenant_id
        .filter(|tenant| !tenant.is_empty())
        .ok_or_else(|| StatsError::Unauthorized("account has no current tenant".to_string()))?;

    let timezone = match account.timezone.as_deref().filter(|tz| !tz.is_empty()) {
        Some(name) => parse_timezone(name)?,
        None => state.default_timezone,
    };

    Ok(Caller {
        account_id: account.id,
        tenant_id,
        timezone,
        request_id,
    })
}

/// Load the app the caller addresses, restricted to `modes` (empty: any mode).
async fn resolve_app(
    db: &Database,
    caller: &Caller,
    app_id: &str,
    modes: &[AppMode],
) -> Result<App> {
    let app = db
        .get_tenant_app(&caller.tenant_id, app_id)
        .await?
        .ok_or_else(|| StatsError::AppNotFound(APP_NOT_FOUND.to_string()))?;

    if !app.supports(modes) {
        return Err(StatsError::AppNotFound(APP_MODE_UNSUPPORTED.to_string()));
    }

    Ok(app)
}

pub fn build_router(state: AppState) -> Router {
    let logging_layer = RequestLoggingLayer;

    let api_router = Router::new()
        .route(
            "/console/api/apps/{app_id}/statistics/{metric}",
            get(get_statistics),
        )
        .route(
            "/console/api/apps/{app_id}/workflow-runs/{run_id}/statistics",
            get(get_workflow_run_statistics),
        )
        .with_state(state.clone());

    api_router
        .merge(crate::health::router(state.db))
        .layer(logging_layer)
}

async fn get_statistics(
    State(state): State<AppState>,
    Path((app_id, metric)): Path<(String, String)>,
    Query(query): Query<TimeRangeQuery>,
    caller: Caller,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let context = caller.error_context(&metric).with_app_id(app_id.clone());

    let Some(metric) = Metric::parse(&metric) else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::with_request_id(
                format!("Unknown statistic: {}", metric),
                context.request_id,
            )),
        ));
    };

    let data = compute_statistic(&state, &caller, &app_id, metric, &query)
        .await
        .map_err(|e| handle_error(e, context))?;

    Ok(Json(serde_json::json!({ "data": data })))
}

async fn compute_statistic(
    state: &AppState,
    caller: &Caller,
    app_id: &str,
    metric: Metric,
    query: &TimeRangeQuery,
) -> Result<serde_json::Value> {
    let app = resolve_app(&state.db, caller, app_id, metric.modes()).await?;
    let range = query.normalize(caller.timezone)?;
    let tz = caller.timezone;
    let stats = &state.stats;

    let data = match metric {
        Metric::DailyMessages => serde_json::to_value(stats.daily_messages(&app.id, &range, tz).await?)?,
        Metric::DailyConversations => {
            serde_json::to_value(stats.daily_conversations(&app.id, &range, tz).await?)?
        }
        Metric::DailyEndUsers => serde_json::to_value(stats.daily_end_users(&app.id, &range, tz).await?)?,
        Metric::TokenCosts => serde_json::to_value(stats.daily_token_costs(&app.id, &range, tz).await?)?,
        Metric::AverageSessionInteractions => {
            serde_json::to_value(stats.average_session_interactions(&app.id, &range, tz).await?)?
        }
        Metric::UserSatisfactionRate => {
            serde_json::to_value(stats.user_satisfaction_rate(&app.id, &range, tz).await?)?
        }
        Metric::AverageResponseTime => {
            serde_json::to_value(stats.average_response_time(&app.id, &range, tz).await?)?
        }
        Metric::TokensPerSecond => serde_json::to_value(stats.tokens_per_second(&app.id, &range, tz).await?)?,
        Metric::Conversations => serde_json::to_value(stats.conversation_summary(&app.id, &range).await?)?,
        Metric::WorkflowRuns => serde_json::to_value(stats.workflow_run_summary(&app.id, &range).await?)?,
    };

    tracing::debug!(
        app_id = %app.id,
        metric = metric.as_str(),
        timezone = %tz,
        "Computed statistic"
    );

    Ok(data)
}

async fn get_workflow_run_statistics(
    State(state): State<AppState>,
    Path((app_id, run_id)): Path<(String, String)>,
    caller: Caller,
) -> std::result::Result<Json<WorkflowRunCost>, ApiError> {
    let context = caller
        .error_context("workflow_run_statistics")
        .with_app_id(app_id.clone());

    let result: Result<WorkflowRunCost> = async {
        let app = resolve_app(&state.db, &caller, &app_id, AppMode::WORKFLOW_MODES).await?;
        state.stats.workflow_run_cost(&app.id, &run_id).await
    }
    .await;

    result.map(Json).map_err(|e| handle_error(e, context))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::fixtures::{self, utc, MessageSeed};
    use crate::models::WorkflowRunStatus;

    const TENANT: &str = "tenant-1";

    async fn test_state(default_timezone: Tz) -> AppState {
        let db = Arc::new(Database::in_memory().await.expect("db"));
        fixtures::insert_account(&db, "acc-utc", Some("UTC"), Some(TENANT)).await;
        fixtures::insert_account(&db, "acc-sh", Some("Asia/Shanghai"), Some(TENANT)).await;
        fixtures::insert_account(&db, "acc-no-tz", None, Some(TENANT)).await;
        fixtures::insert_account(&db, "acc-bad-tz", Some("Mars/Olympus"), Some(TENANT)).await;
        fixtures::insert_account(&db, "acc-no-tenant", Some("UTC"), None).await;
        fixtures::insert_app(&db, "chat-app", TENANT, AppMode::Chat).await;
        fixtures::insert_app(&db, "wf-app", TENANT, AppMode::Workflow).await;
        fixtures::insert_app(&db, "foreign-app", "tenant-2", AppMode::Chat).await;
        AppState::new(db, default_timezone)
    }

    async fn get(
        state: &AppState,
        uri: &str,
        account: Option<&str>,
    ) -> (StatusCode, Option<String>, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(account) = account {
            builder = builder.header(ACCOUNT_HEADER, account);
        }
        let response = build_router(state.clone())
            .oneshot(builder.body(Body::empty()).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, request_id, json)
    }

    #[test]
    fn error_response_with_request_id() {
        let err = ErrorResponse::with_request_id("test error", "req-123");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("test error"));
        assert!(json.contains("req-123"));
    }

    #[test]
    fn metric_route_segments_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::parse(metric.as_str()), Some(metric));
        }
        assert_eq!(Metric::parse("daily_messages"), None);
        assert_eq!(Metric::WorkflowRuns.modes(), AppMode::WORKFLOW_MODES);
        assert!(Metric::DailyMessages.modes().is_empty());
    }

    #[tokio::test]
    async fn missing_account_header_is_unauthorized() {
        let state = test_state(Tz::UTC).await;
        let (status, _, body) =
            get(&state, "/console/api/apps/chat-app/statistics/daily-messages", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().expect("message").starts_with("Unauthorized"));
    }

    #[tokio::test]
    async fn unknown_account_or_tenantless_account_is_unauthorized() {
        let state = test_state(Tz::UTC).await;
        let uri = "/console/api/apps/chat-app/statistics/daily-messages";
        assert_eq!(get(&state, uri, Some("nobody")).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            get(&state, uri, Some("acc-no-tenant")).await.0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn app_of_another_tenant_is_not_found() {
        let state = test_state(Tz::UTC).await;
        let (status, _, body) = get(
            &state,
            "/console/api/apps/foreign-app/statistics/daily-messages",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "App not found.");
    }

    #[tokio::test]
    async fn wrong_app_mode_is_not_found() {
        let state = test_state(Tz::UTC).await;
        for uri in [
            "/console/api/apps/chat-app/statistics/average-response-time",
            "/console/api/apps/chat-app/statistics/workflow-runs",
            "/console/api/apps/wf-app/statistics/average-session-interactions",
        ] {
            let (status, _, body) = get(&state, uri, Some("acc-utc")).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body["error"], APP_MODE_UNSUPPORTED);
        }
    }

    #[tokio::test]
    async fn unknown_metric_is_not_found() {
        let state = test_state(Tz::UTC).await;
        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/daily-mood",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().expect("message").contains("daily-mood"));
    }

    #[tokio::test]
    async fn malformed_range_is_bad_request_with_request_id() {
        let state = test_state(Tz::UTC).await;
        let (status, header_id, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/daily-messages?start=2024-13-01%2000:00",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid start time format: time data '2024-13-01 00:00' does not match format '%Y-%m-%d %H:%M'"
        );
        assert_eq!(body["request_id"].as_str(), header_id.as_deref());
    }

    #[tokio::test]
    async fn inverted_range_is_bad_request() {
        let state = test_state(Tz::UTC).await;
        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/token-costs?start=2024-05-02%2000:00&end=2024-05-01%2000:00",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "start must be earlier than or equal to end");
    }

    #[tokio::test]
    async fn invalid_account_timezone_is_bad_request() {
        let state = test_state(Tz::UTC).await;
        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/daily-messages",
            Some("acc-bad-tz"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid timezone: Mars/Olympus");
    }

    #[tokio::test]
    async fn daily_messages_use_account_timezone() {
        let state = test_state(Tz::UTC).await;
        let conv = fixtures::insert_conversation(&state.db, "chat-app", utc(2024, 5, 1, 0, 0)).await;
        MessageSeed::new("chat-app", &conv, utc(2024, 5, 1, 15, 0)).insert(&state.db).await;
        MessageSeed::new("chat-app", &conv, utc(2024, 5, 1, 17, 0)).insert(&state.db).await;

        let uri = "/console/api/apps/chat-app/statistics/daily-messages";
        let (status, _, body) = get(&state, uri, Some("acc-utc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"data": [{"date": "2024-05-01", "message_count": 2}]})
        );

        let (_, _, body) = get(&state, uri, Some("acc-sh")).await;
        assert_eq!(
            body,
            serde_json::json!({"data": [
                {"date": "2024-05-01", "message_count": 1},
                {"date": "2024-05-02", "message_count": 1}
            ]})
        );
    }

    #[tokio::test]
    async fn account_without_timezone_uses_default() {
        let state = test_state(chrono_tz::Asia::Shanghai).await;
        let conv = fixtures::insert_conversation(&state.db, "chat-app", utc(2024, 5, 1, 0, 0)).await;
        MessageSeed::new("chat-app", &conv, utc(2024, 5, 1, 17, 0)).insert(&state.db).await;

        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/daily-end-users",
            Some("acc-no-tz"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["date"], "2024-05-02");
        assert_eq!(body["data"][0]["terminal_count"], 0);
    }

    #[tokio::test]
    async fn range_in_local_time_filters_messages() {
        let state = test_state(Tz::UTC).await;
        let conv = fixtures::insert_conversation(&state.db, "chat-app", utc(2024, 5, 1, 0, 0)).await;
        // 2024-05-01 15:30Z is 23:30 in Shanghai, 16:30Z is 00:30 the next day.
        MessageSeed::new("chat-app", &conv, utc(2024, 5, 1, 15, 30))
            .tokens(1, 2)
            .price(0.5)
            .insert(&state.db)
            .await;
        MessageSeed::new("chat-app", &conv, utc(2024, 5, 1, 16, 30))
            .tokens(3, 4)
            .insert(&state.db)
            .await;

        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/token-costs?start=2024-05-01%2000:00&end=2024-05-02%2000:00",
            Some("acc-sh"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"data": [{
                "date": "2024-05-01",
                "token_count": 3,
                "total_price": "0.5000000",
                "currency": "USD"
            }]})
        );
    }

    #[tokio::test]
    async fn empty_range_parameters_mean_all_history() {
        let state = test_state(Tz::UTC).await;
        let conv = fixtures::insert_conversation(&state.db, "chat-app", utc(2020, 1, 1, 0, 0)).await;
        MessageSeed::new("chat-app", &conv, utc(2020, 1, 1, 0, 0)).insert(&state.db).await;

        let (status, _, body) = get(
            &state,
            "/console/api/apps/chat-app/statistics/conversations?start=&end=",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"data": {
                "total_conversations": 1,
                "total_messages": 1,
                "total_tokens": 0,
                "avg_messages_per_conversation": 1.0
            }})
        );
    }

    #[tokio::test]
    async fn workflow_run_summary_and_per_run_cost() {
        let state = test_state(Tz::UTC).await;
        let run = fixtures::insert_workflow_run(
            &state.db,
            "wf-app",
            WorkflowRunStatus::Succeeded,
            2.5,
            30,
            3,
            utc(2024, 6, 1, 0, 0),
        )
        .await;
        fixtures::insert_workflow_run(
            &state.db,
            "wf-app",
            WorkflowRunStatus::Failed,
            0.5,
            10,
            1,
            utc(2024, 6, 1, 1, 0),
        )
        .await;
        fixtures::insert_node_execution(
            &state.db,
            "wf-app",
            &run,
            1,
            Some(r#"{"total_tokens": 30, "total_price": "0.25", "currency": "USD"}"#),
        )
        .await;

        let (status, _, body) = get(
            &state,
            "/console/api/apps/wf-app/statistics/workflow-runs",
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_runs"], 2);
        assert_eq!(body["data"]["success_rate"], 50.0);
        assert_eq!(body["data"]["avg_elapsed_time"], 1.5);
        assert_eq!(body["data"]["total_tokens"], 40);

        let (status, _, body) = get(
            &state,
            &format!("/console/api/apps/wf-app/workflow-runs/{}/statistics", run),
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"total_tokens": 30, "total_price": 0.25, "currency": "USD"})
        );

        let (status, _, _) = get(
            &state,
            &format!("/console/api/apps/chat-app/workflow-runs/{}/statistics", run),
            Some("acc-utc"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_served_without_account() {
        let state = test_state(Tz::UTC).await;
        let (status, request_id, body) = get(&state, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(request_id.is_some());
    }
}
