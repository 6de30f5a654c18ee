// 🌐 REST API with Axum
// Every route except /api/health is bearer-authenticated and owner-scoped.

use crate::analyzer::{prepare_analysis_text, ReceiptAnalyzer, ReceiptImage};
use crate::auth::{bearer_token, Identity, TokenVerifier};
use crate::config::AppConfig;
use crate::db::{ExpenseRecord, ExpenseUpdate};
use crate::error::{ErrorCategory, LedgerError};
use crate::export::{export_filename, write_export};
use crate::ledger::{analyze_and_record, ManualExpense, ReceiptOutcome};
use crate::query::{
    filter_expenses, paginate, tax_years, total_for, ExpenseQuery, Page, TaxYearFilter,
    DEFAULT_PER_PAGE,
};
use crate::store::ExpenseStore;
use crate::summary::{summarize, LedgerSummary};
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: ExpenseStore,
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        store: ExpenseStore,
        analyzer: Arc<dyn ReceiptAnalyzer>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            store,
            analyzer,
            verifier,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// `{ error }` body with a status derived from the error category
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err.category() {
            ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
            ErrorCategory::Service => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::Parse => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Request => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Malformed bodies, query strings and paths are client errors
fn rejection_error(status: StatusCode, detail: String) -> ApiError {
    warn!("Rejected malformed request: {}", detail);
    let status = if status == StatusCode::PAYLOAD_TOO_LARGE {
        status
    } else {
        StatusCode::BAD_REQUEST
    };
    ApiError::new(status, detail)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

// Extractors whose rejections still answer with `{ error }`
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;
type PathParam<T> = Result<Path<T>, PathRejection>;

// ============================================================================
// Authentication
// ============================================================================

/// Caller resolved from the `Authorization: Bearer` header
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let identity = bearer_token(header_value)
            .and_then(|token| state.verifier.verify(token))
            .map_err(|e| {
                warn!("Rejected request to {}: {}", parts.uri.path(), e);
                ApiError::from(e)
            })?;

        Ok(AuthUser(identity))
    }
}

// ============================================================================
// Request / response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub image_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub year: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListParams {
    fn query(&self) -> ApiResult<ExpenseQuery> {
        let year = self.year.as_deref().unwrap_or_default();
        let tax_year = TaxYearFilter::parse(year).ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid tax year '{}'", year))
        })?;
        Ok(ExpenseQuery::new(
            self.search.as_deref().unwrap_or_default(),
            tax_year,
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseListResponse {
    #[serde(flatten)]
    pub page: Page<ExpenseRecord>,
    /// Total of the whole filtered set, not just this page
    pub total: f64,
    pub tax_years: Vec<i32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/receipts/analyze - raw analysis text for the client to normalize
async fn analyze_receipt(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: JsonBody<ImageRequest>,
) -> ApiResult<Json<AnalysisResponse>> {
    let Json(body) = body?;
    if !state.analyzer.is_configured() {
        error!("Gemini API key not configured");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Gemini API key not configured",
        ));
    }

    let image = ReceiptImage::from_data_uri(&body.image_data)?;
    info!("Analyzing receipt {} for {}", image.source_tag(), user.uid);

    match state.analyzer.analyze(&image).await {
        Ok(raw) => Ok(Json(AnalysisResponse {
            text: prepare_analysis_text(&raw),
        })),
        Err(e) => {
            error!("Error analyzing receipt: {}", e);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to analyze receipt",
            ))
        }
    }
}

/// POST /api/receipts/record - analyze, normalize and write in one call
async fn record_receipt(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: JsonBody<ImageRequest>,
) -> ApiResult<(StatusCode, Json<ReceiptOutcome>)> {
    let Json(body) = body?;
    if !state.analyzer.is_configured() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Gemini API key not configured",
        ));
    }

    let image = ReceiptImage::from_data_uri(&body.image_data)?;
    let outcome =
        analyze_and_record(state.analyzer.as_ref(), &state.store, &user.uid, &image).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/expenses
async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    params: QueryParams<ListParams>,
) -> ApiResult<Json<ExpenseListResponse>> {
    let Query(params) = params?;
    let query = params.query()?;
    let records = state.store.list(&user.uid)?;
    let filtered = filter_expenses(&records, &query);

    Ok(Json(ExpenseListResponse {
        total: total_for(&filtered),
        tax_years: tax_years(&records),
        page: paginate(
            &filtered,
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(DEFAULT_PER_PAGE),
        ),
    }))
}

/// POST /api/expenses - manual add
async fn create_expense(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: JsonBody<ManualExpense>,
) -> ApiResult<(StatusCode, Json<ExpenseRecord>)> {
    let Json(body) = body?;
    let expense = body.into_new_expense()?;
    let record = state.store.add_expense(&user.uid, expense)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/expenses/:id - inline edit
async fn update_expense(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    id: PathParam<String>,
    update: JsonBody<ExpenseUpdate>,
) -> ApiResult<Json<ExpenseRecord>> {
    let Path(id) = id?;
    let Json(update) = update?;
    Ok(Json(state.store.update(&user.uid, &id, &update)?))
}

/// DELETE /api/expenses/:id
async fn delete_expense(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    id: PathParam<String>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.store.delete(&user.uid, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/expenses/export - CSV attachment of the filtered set
async fn export_expenses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    params: QueryParams<ListParams>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let query = params.query()?;
    let records = state.store.list(&user.uid)?;
    let filtered = filter_expenses(&records, &query);

    let mut buf = Vec::new();
    let summary = write_export(&filtered, &mut buf).map_err(LedgerError::Storage)?;
    let filename = export_filename(query.tax_year);
    info!(
        "Exported {} rows (${:.2}) for {} as {}",
        summary.rows_written, summary.total, user.uid, filename
    );

    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        filename,
        urlencoding::encode(&filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buf,
    )
        .into_response())
}

/// GET /api/expenses/summary - chart series
async fn expense_summary(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    params: QueryParams<ListParams>,
) -> ApiResult<Json<LedgerSummary>> {
    let Query(params) = params?;
    let query = params.query()?;
    let records = state.store.list(&user.uid)?;
    Ok(Json(summarize(&filter_expenses(&records, &query))))
}

/// GET /api/expenses/stream - one `snapshot` event per change
async fn expense_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Snapshot stream opened for {}", user.uid);
    let mut subscription = state.store.subscribe(&user.uid);

    let stream = async_stream::stream! {
        while let Some(snapshot) = subscription.next_snapshot().await {
            let records = match snapshot {
                Ok(records) => records,
                Err(e) => {
                    warn!("Snapshot for {} failed: {}", subscription.owner_id(), e);
                    continue;
                }
            };
            match Event::default().event("snapshot").json_data(&records) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("Failed to serialize snapshot: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/receipts/analyze", post(analyze_receipt))
        .route("/receipts/record", post(record_receipt))
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/export", get(export_expenses))
        .route("/expenses/summary", get(expense_summary))
        .route("/expenses/stream", get(expense_stream))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
}

pub fn build_router(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .nest("/api", api_routes())
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        info!("Serving front end from {:?}", dir);
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}
