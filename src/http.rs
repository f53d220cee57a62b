use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    metrics::MetricsSnapshot,
    rate_limit::IpRateLimiter,
    request_log::RequestLogEntry,
    service::{AnswerError, AnswerInput, AnswerReply, AnswerService},
};

pub const API_KEY_HEADER: &str = "x-api-key";
const LOGS_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnswerService>,
    pub api_key: Arc<str>,
    pub limiter: Arc<IpRateLimiter>,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct AnswerBody {
    question: String,
    context: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    time: String,
}

#[derive(Serialize)]
struct LogsResponse {
    count: usize,
    logs: Vec<RequestLogEntry>,
}

pub fn router(state: AppState) -> Router {
    let answer = Router::new()
        .route("/api/answer", post(answer))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let protected = Router::new()
        .route("/api/metrics", get(metrics))
        .route("/api/logs", get(logs))
        .merge(answer)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .layer(cors_layer(&state.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(API_KEY_HEADER),
        ])
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().to_rfc3339(),
    })
}

async fn answer(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<AnswerReply>, Response> {
    let client_ip = client_ip(&request).to_string();
    let body = Bytes::from_request(request, &state)
        .await
        .ok()
        .and_then(|bytes| parse_answer_body(&bytes));

    let Some(body) = body else {
        state.service.record_bad_request(&client_ip);
        return Err(detail(StatusCode::BAD_REQUEST, "invalid json"));
    };

    let input = AnswerInput {
        question: body.question,
        context: body.context,
        client_ip,
    };

    state
        .service
        .answer(input)
        .await
        .map(Json)
        .map_err(IntoResponse::into_response)
}

// Any JSON object is accepted regardless of content type. The first of
// `question` / `prompt` that is present and non-blank is used; a non-string
// value there counts as a missing question.
fn parse_answer_body(bytes: &[u8]) -> Option<AnswerBody> {
    let Value::Object(payload) = serde_json::from_slice::<Value>(bytes).ok()? else {
        return None;
    };

    let question = ["question", "prompt"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(text) => !text.trim().is_empty(),
            _ => true,
        })
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let context = match payload.get("context") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };

    Some(AnswerBody { question, context })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.service.metrics().snapshot())
}

async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    let request_log = state.service.request_log();
    Json(LogsResponse {
        count: request_log.len().await,
        logs: request_log.recent(LOGS_LIMIT).await,
    })
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(state.api_key.as_ref()) {
        return detail(StatusCode::UNAUTHORIZED, "invalid api key");
    }
    next.run(request).await
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    if !state.limiter.check(ip) {
        warn!(client_ip = %ip, limit = state.limiter.limit(), "rate limit exceeded");
        return detail(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    next.run(request).await
}

// Requests served without connect info share the unspecified address.
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl IntoResponse for AnswerError {
    fn into_response(self) -> Response {
        match &self {
            AnswerError::Format { reason, .. } => detail(StatusCode::BAD_REQUEST, reason),
            AnswerError::Blocked { request_id, reason } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "request_id": request_id,
                    "blocked": true,
                    "reason": reason,
                })),
            )
                .into_response(),
            AnswerError::Upstream { .. } => {
                detail(StatusCode::BAD_GATEWAY, "model provider error")
            }
        }
    }
}
