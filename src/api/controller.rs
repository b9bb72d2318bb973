use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;

use super::actor::{resolve_actor, resolve_user};
use super::error::AppError;
use super::schema::{
    ApiResponse, DoApprovalRequest, FlowRequest, FlowStatusQuery, HealthResponse, PageQuery,
    StartApprovalRequest,
};
use super::AppState;
use crate::flow::FlowDefinition;
use crate::record::ApprovalRecord;
use crate::service::{FlowDetail, RecordDetail};
use crate::store::{Page, PageRequest};
use crate::types::{FlowId, RecordId, ReviewAction};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        env: state.config.rust_env.clone(),
    })
}

pub async fn list_flows(State(state): State<AppState>) -> ApiResult<Vec<FlowDefinition>> {
    let flows = state.engine.list_flows()?;
    Ok(Json(ApiResponse::ok("ok", flows)))
}

pub async fn get_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<FlowId>,
) -> ApiResult<FlowDetail> {
    let detail = state.engine.get_flow(flow_id)?;
    Ok(Json(ApiResponse::ok("ok", detail)))
}

pub async fn create_flow(
    State(state): State<AppState>,
    Json(req): Json<FlowRequest>,
) -> ApiResult<FlowDetail> {
    let (draft, nodes) = req.into_parts()?;
    let detail = state.engine.create_flow(draft, nodes)?;
    Ok(Json(ApiResponse::ok("flow created", detail)))
}

pub async fn update_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<FlowId>,
    Json(req): Json<FlowRequest>,
) -> ApiResult<FlowDetail> {
    let (draft, nodes) = req.into_parts()?;
    let detail = state.engine.update_flow(flow_id, draft, nodes)?;
    Ok(Json(ApiResponse::ok("flow updated", detail)))
}

pub async fn set_flow_status(
    State(state): State<AppState>,
    Path(flow_id): Path<FlowId>,
    Query(query): Query<FlowStatusQuery>,
) -> ApiResult<FlowDefinition> {
    let flow = state.engine.set_flow_enabled(flow_id, query.enabled)?;
    Ok(Json(ApiResponse::ok("flow status updated", flow)))
}

pub async fn delete_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<FlowId>,
) -> ApiResult<()> {
    state.engine.delete_flow(flow_id)?;
    Ok(Json(ApiResponse::ok_empty("flow deleted")))
}

pub async fn start_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StartApprovalRequest>,
) -> ApiResult<ApprovalRecord> {
    let initiator = resolve_actor(
        state.actors.as_ref(),
        &headers,
        req.initiator_id,
        req.initiator_name,
    )?;
    let record = state.engine.start_approval(
        &req.business_type,
        req.business_id,
        &req.business_no,
        &initiator,
    )?;
    Ok(Json(ApiResponse::ok("approval started", record)))
}

pub async fn do_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DoApprovalRequest>,
) -> ApiResult<ApprovalRecord> {
    let action: ReviewAction = req.action.parse()?;
    let approver = resolve_actor(
        state.actors.as_ref(),
        &headers,
        req.approver_id,
        req.approver_name,
    )?;
    let record = state
        .engine
        .do_approval(req.record_id, &approver, action, req.comment)?;
    Ok(Json(ApiResponse::ok("approval recorded", record)))
}

pub async fn cancel_approval(
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
) -> ApiResult<ApprovalRecord> {
    let record = state.engine.cancel_approval(record_id)?;
    Ok(Json(ApiResponse::ok("approval cancelled", record)))
}

pub async fn my_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<ApprovalRecord>> {
    let actor = resolve_user(state.actors.as_ref(), &headers, query.user_id)?;
    let page = page_request(&state, &query);
    let records = state.engine.my_pending_approvals(&actor, page)?;
    Ok(Json(ApiResponse::ok("ok", records)))
}

pub async fn my_initiated(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<ApprovalRecord>> {
    let actor = resolve_user(state.actors.as_ref(), &headers, query.user_id)?;
    let page = page_request(&state, &query);
    let records = state.engine.my_initiated_approvals(actor.id, page)?;
    Ok(Json(ApiResponse::ok("ok", records)))
}

pub async fn get_record_detail(
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
) -> ApiResult<RecordDetail> {
    let detail = state.engine.get_record_detail(record_id)?;
    Ok(Json(ApiResponse::ok("ok", detail)))
}

fn page_request(state: &AppState, query: &PageQuery) -> PageRequest {
    PageRequest::new(query.current.unwrap_or(1), state.config.page_size(query.size))
}
