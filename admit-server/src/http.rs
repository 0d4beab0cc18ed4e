//! HTTP surface: a thin axum router mapping operations 1:1.
//!
//! Caller identity is resolved from `Authorization: Bearer <magic token>`
//! by hashing the token and looking up the credential hash. There is no
//! other session machinery.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use admit_core::{ApplicationForm, Decision, Role, RsvpReply, UserId};

use crate::error::ServiceError;
use crate::repository::Settings;
use crate::services::Identity;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/verify", post(verify))
        .route("/me", get(me))
        .route("/application", put(edit_application))
        .route("/application/submit", post(submit_application))
        .route("/rsvp", post(rsvp))
        .route("/scan", post(scan))
        .route("/scan/count", get(scan_count))
        .route("/decisions", get(list_staged))
        .route("/decisions/stage", post(stage))
        .route("/decisions/release", post(release))
        .route("/decisions/remove", post(remove_staged))
        .route("/walk-ins", post(walk_ins))
        .route("/settings", get(read_settings).put(write_settings))
        .route("/users/:id/role", put(set_role))
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

enum ApiError {
    Unauthorized,
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid credential".to_string()),
            Self::Service(e) => {
                let status = match &e {
                    ServiceError::Authorization { .. } => StatusCode::FORBIDDEN,
                    ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                    ServiceError::Business(_) => StatusCode::CONFLICT,
                    ServiceError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
                    ServiceError::Storage(inner) => {
                        error!(error = %inner, "storage failure");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Resolve the caller from the bearer token, or 401.
async fn authenticated(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    state
        .admissions
        .authenticate(token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "admit"
    }))
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let receipt = state.admissions.register(&req.email).await?;
    Ok(Json(json!({
        "user_id": receipt.user_id,
        "delivered": receipt.delivered
    })))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let status = state.admissions.verify(&identity).await?;
    Ok(Json(json!({ "status": status })))
}

async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let view = state.admissions.me(&identity).await?;
    Ok(Json(serde_json::to_value(view).unwrap_or_default()))
}

async fn edit_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(form): Json<ApplicationForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let status = state.admissions.edit_application(&identity, &form).await?;
    Ok(Json(json!({ "status": status })))
}

async fn submit_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let errors = state.admissions.submit_application(&identity).await?;
    Ok(Json(json!({
        "submitted": errors.is_empty(),
        "errors": errors
    })))
}

#[derive(Deserialize)]
struct RsvpRequest {
    reply: RsvpReply,
}

async fn rsvp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RsvpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let status = state.admissions.rsvp(&identity, req.reply).await?;
    Ok(Json(json!({ "status": status })))
}

#[derive(Deserialize)]
struct ScanRequest {
    user_id: UserId,
    action: String,
}

async fn scan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ScanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let count = state
        .admissions
        .record_scan(&identity, req.user_id, &req.action)
        .await?;
    Ok(Json(json!({ "count": count })))
}

#[derive(Deserialize)]
struct ScanCountQuery {
    action: String,
}

async fn scan_count(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ScanCountQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let count = state
        .admissions
        .count_scanned(&identity, &query.action)
        .await?;
    Ok(Json(json!({ "action": query.action, "count": count })))
}

async fn list_staged(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let staged = state.admissions.staged_decisions(&identity, None).await?;
    let staged: Vec<_> = staged
        .into_iter()
        .map(|record| json!({ "user_id": record.user_id, "decision": record.decision }))
        .collect();
    Ok(Json(json!({ "staged": staged })))
}

#[derive(Deserialize)]
struct StageRequest {
    ids: Vec<UserId>,
    decision: Decision,
}

async fn stage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let staged = state
        .admissions
        .stage_decisions(&identity, &req.ids, req.decision)
        .await?;
    Ok(Json(json!({ "staged": staged })))
}

#[derive(Deserialize)]
struct ReleaseRequest {
    /// Absent means release everything staged.
    ids: Option<Vec<UserId>>,
}

async fn release(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let report = state
        .admissions
        .release_decisions(&identity, req.ids.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

#[derive(Deserialize)]
struct IdListRequest {
    ids: Vec<UserId>,
}

async fn remove_staged(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IdListRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let removed = state
        .admissions
        .remove_staged_decisions(&identity, &req.ids)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn walk_ins(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IdListRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let confirmed = state.admissions.confirm_walk_ins(&identity, &req.ids).await?;
    Ok(Json(json!({ "confirmed": confirmed })))
}

async fn read_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Settings>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    let settings = state.admissions.settings(&identity).await?;
    Ok(Json(settings))
}

async fn write_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<Settings>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    state
        .admissions
        .update_settings(&identity, &settings)
        .await?;
    Ok(Json(json!({ "updated": true })))
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: Role,
}

async fn set_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let identity = authenticated(&state, &headers).await?;
    state
        .admissions
        .set_role(&identity, UserId(id), req.role)
        .await?;
    Ok(Json(json!({ "updated": true })))
}
