//! HTTP API over the aggregation service.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/search`: JSON body `{query, tags, types, orderBy, page, perPage}`
//! - `GET /api/v1/search?q=&tags=a,b&type=video,text&sort=&page=&per_page=`
//! - `GET /health`: liveness
//! - `GET /health/ready`: store ping plus per-provider health
//!
//! Every response carries a request id, taken from an incoming
//! `x-request-id` header or generated.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Extension, Router};
use chrono::{SecondsFormat, Utc};
use hub_search::{AggregationService, ContentKind, ContentRecord, SearchError, SearchParams, SearchResult, SortMode};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HubError;

const REQUEST_ID_HEADER: &str = "x-request-id";
const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;
const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/search`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub tags: Vec<String>,
    pub types: Vec<String>,
    #[serde(rename = "orderBy")]
    pub order_by: String,
    pub page: i64,
    #[serde(rename = "perPage")]
    pub per_page: i64,
}

impl SearchRequest {
    /// Validate and convert into engine parameters.
    ///
    /// Pagination out of range falls back to defaults; an unknown sort or
    /// content type is a validation error.
    pub fn into_params(self) -> Result<SearchParams, SearchError> {
        let sort = if self.order_by.trim().is_empty() {
            SortMode::default()
        } else {
            self.order_by.trim().parse::<SortMode>()?
        };

        let kinds = self
            .types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::parse::<ContentKind>)
            .collect::<Result<Vec<_>, _>>()?;

        let page = u32::try_from(self.page).ok().filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let per_page = u32::try_from(self.per_page)
            .ok()
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE);

        let tags: Vec<String> = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(SearchParams::new(self.query)
            .with_tags(tags)
            .with_kinds(kinds)
            .with_sort(sort)
            .with_page(page, per_page))
    }
}

/// Query string of `GET /api/v1/search`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
    /// Comma-separated tags.
    pub tags: String,
    /// Comma-separated content types.
    #[serde(rename = "type")]
    pub kind: String,
    pub sort: String,
    pub page: String,
    pub per_page: String,
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl From<SearchQuery> for SearchRequest {
    fn from(q: SearchQuery) -> Self {
        Self {
            tags: split_csv(&q.tags),
            types: split_csv(&q.kind),
            order_by: q.sort,
            page: q.page.trim().parse().unwrap_or(0),
            per_page: q.per_page.trim().parse().unwrap_or(0),
            query: q.q,
        }
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Uniform response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchData {
    pub items: Vec<ContentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    pub request_id: String,
}

impl Envelope<SearchData> {
    fn success(result: SearchResult, request_id: &RequestId) -> Self {
        Self {
            success: true,
            data: Some(SearchData { items: result.items }),
            error: None,
            meta: Meta {
                page: Some(result.page),
                per_page: Some(result.per_page),
                total: Some(result.total),
                total_pages: Some(result.total_pages),
                request_id: request_id.0.clone(),
            },
        }
    }
}

/// An error answered to the client, already mapped to status and code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: String,
}

impl ApiError {
    fn validation(message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
            request_id: request_id.0.clone(),
        }
    }

    fn internal(request_id: &RequestId) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: "Internal server error".to_owned(),
            request_id: request_id.0.clone(),
        }
    }

    /// Validation errors are shown to the client; everything else is logged
    /// and reported as an opaque internal error.
    fn from_search(err: SearchError, request_id: &RequestId) -> Self {
        match err {
            SearchError::Validation(message) => Self::validation(message, request_id),
            other => {
                tracing::error!(request_id = %request_id.0, error = %other, "search failed");
                Self::internal(request_id)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorInfo {
                code: self.code.to_owned(),
                message: self.message,
            }),
            meta: Meta {
                request_id: self.request_id,
                ..Meta::default()
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Health types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, CheckResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    fn from_result(result: &Result<(), SearchError>) -> Self {
        match result {
            Ok(()) => Self {
                status: "healthy".to_owned(),
                message: None,
            },
            Err(e) => Self {
                status: "unhealthy".to_owned(),
                message: Some(e.to_string()),
            },
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    service: Arc<AggregationService>,
}

/// Identifier attached to one request and echoed in its response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Build the API router over `service`.
pub fn router(service: Arc<AggregationService>) -> Router {
    Router::new()
        .route("/api/v1/search", get(handle_search_get).post(handle_search_post))
        .route("/health", get(handle_liveness))
        .route("/health/ready", get(handle_readiness))
        .layer(middleware::from_fn(request_context))
        .with_state(AppState { service })
}

/// Assign the request id and log one line per completed request.
async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::error!(request_id = %request_id, %method, %path, status, elapsed_ms, "request completed");
    } else if response.status().is_client_error() {
        tracing::warn!(request_id = %request_id, %method, %path, status, elapsed_ms, "request completed");
    } else {
        tracing::info!(request_id = %request_id, %method, %path, status, elapsed_ms, "request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn handle_search_post(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text(), &request_id))?;
    run_search(&state, request, &request_id).await
}

async fn handle_search_get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(e.body_text(), &request_id))?;
    run_search(&state, query.into(), &request_id).await
}

async fn run_search(
    state: &AppState,
    request: SearchRequest,
    request_id: &RequestId,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let params = request
        .into_params()
        .map_err(|e| ApiError::from_search(e, request_id))?;
    let result = state
        .service
        .search(params)
        .await
        .map_err(|e| ApiError::from_search(e, request_id))?;
    Ok(Json(Envelope::success(result, request_id)))
}

async fn handle_liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        timestamp: timestamp(),
        checks: BTreeMap::new(),
    })
}

/// Store down is fatal for readiness; unhealthy providers are only reported.
async fn handle_readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();

    let ping = match tokio::time::timeout(READINESS_TIMEOUT, state.service.store().ping()).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout("store ping".into())),
    };
    let store_ok = ping.is_ok();
    checks.insert("database".to_owned(), CheckResult::from_result(&ping));

    for (name, result) in state.service.manager().health_check_all().await {
        checks.insert(format!("provider_{name}"), CheckResult::from_result(&result));
    }

    let (status, label) = if store_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    let body = HealthResponse {
        status: label.to_owned(),
        timestamp: timestamp(),
        checks,
    };
    (status, Json(body))
}

// ---------------------------------------------------------------------------
// ApiServer
// ---------------------------------------------------------------------------

/// The API served on a background task.
///
/// [`shutdown`](Self::shutdown) stops accepting connections and lets
/// in-flight requests finish; dropping the server aborts it outright.
pub struct ApiServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl ApiServer {
    /// Bind `bind_addr` (port `0` auto-assigns) and start serving.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Server`] if the listener cannot bind.
    pub async fn start(service: Arc<AggregationService>, bind_addr: &str) -> crate::error::Result<Self> {
        let app = router(service);

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| HubError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HubError::Server(format!("failed to get local addr: {e}")))?;

        tracing::info!("API listening on http://{addr}");

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("API server error: {e}");
            }
        });

        Ok(Self { addr, handle, shutdown })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Begin a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the serving task to finish.
    pub async fn stopped(&mut self) {
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                tracing::error!("API server task failed: {e}");
            }
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
