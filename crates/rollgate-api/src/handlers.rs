//! API Handlers
use crate::error::ApiError;
use crate::middleware::RequestActor;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use rollgate_core::validate_document;
use rollgate_query::parse_query;
use rollgate_workflow::{
    ChangeRequest, ChangeRequestDetail, ChangeRequestFilter, ChangeRequestStatus,
    NewChangeRequest, ReviewDecision, ReviewOutcome, StoredFlag,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })),
    )
}

pub async fn validate_config(Json(doc): Json<Value>) -> ApiResult<Json<Value>> {
    let config = validate_document(&doc)?;
    Ok(Json(json!({ "valid": true, "config": config })))
}

#[derive(Debug, Deserialize)]
pub struct QueryCheck {
    pub query: String,
}

pub async fn validate_query(Json(body): Json<QueryCheck>) -> ApiResult<Json<Value>> {
    let expr = parse_query(&body.query)?;
    Ok(Json(json!({ "valid": true, "attributes": expr.attributes() })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub search: Option<String>,
}

pub async fn list_change_requests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    let status = params
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ChangeRequestStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let filter = ChangeRequestFilter {
        status,
        search: params.search,
    };
    let requests = state.workflow.list(&filter).await?;
    Ok(Json(json!({ "changeRequests": requests, "total": requests.len() })))
}

pub async fn create_change_request(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(input): Json<NewChangeRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state.workflow.create(input, actor).await?;
    state.metrics.record("created");
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn count_pending(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let count = state.workflow.count_pending().await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn get_change_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ChangeRequestDetail>> {
    let detail = state.workflow.get(id).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: String,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn review_change_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
    Json(body): Json<ReviewBody>,
) -> ApiResult<Json<ReviewOutcome>> {
    let decision: ReviewDecision = body.decision.parse().map_err(ApiError::BadRequest)?;
    let outcome = state.workflow.review(id, decision, actor, body.comment).await?;
    state.metrics.record("reviewed");
    Ok(Json(outcome))
}

pub async fn apply_change_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
) -> ApiResult<Json<Value>> {
    let applied = state.workflow.apply(id, actor).await?;
    state.metrics.record("applied");
    Ok(Json(json!({
        "changeRequest": applied.request,
        "flag": applied.flag,
        "projectCreated": applied.project_created,
    })))
}

pub async fn cancel_change_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
) -> ApiResult<Json<ChangeRequest>> {
    let request = state.workflow.cancel(id, actor).await?;
    state.metrics.record("cancelled");
    Ok(Json(request))
}

pub async fn get_flag(
    State(state): State<AppState>,
    Path((project, key)): Path<(String, String)>,
) -> ApiResult<Json<StoredFlag>> {
    let flag = state
        .workflow
        .flag(&project, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("flag {}/{}", project, key)))?;
    Ok(Json(flag))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditParams {
    pub limit: Option<usize>,
    pub resource_id: Option<String>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(100);
    let events = match params.resource_id {
        Some(id) => {
            let mut events = state.audit.entries_for_resource(&id);
            events.reverse();
            events.truncate(limit);
            events
        }
        None => state.audit.recent(limit),
    };
    Json(json!({ "events": events, "stats": state.audit.stats() }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(format!("metrics unavailable: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
