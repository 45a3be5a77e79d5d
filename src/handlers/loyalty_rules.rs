use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::entities::loyalties;
use crate::models::common::{ErrorResponse, OwnerQuery};
use crate::models::loyalty::{
    CreateRuleRequest, DeleteRuleRequest, MessageResponse, RuleListResponse, RuleResponse,
    UpdateRuleRequest,
};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler for GET /api/loyalty/rules
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<RuleListResponse>, ApiError> {
    let rules = state.rules.list(query.owner_id).await?;
    Ok(Json(RuleListResponse { rules }))
}

/// Handler for POST /api/loyalty/rules
/// Returns 201 when the rule was created, 200 when the code already existed
pub async fn create_rule(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<RuleResponse>), ApiError> {
    let (rule, created) = state.rules.create(query.owner_id, payload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(RuleResponse { rule, created })))
}

/// Handler for PUT /api/loyalty/rules
pub async fn update_rule(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<loyalties::Model>, ApiError> {
    let rule = state.rules.update(query.owner_id, payload).await?;
    Ok(Json(rule))
}

/// Handler for DELETE /api/loyalty/rules
pub async fn delete_rule(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
    Json(payload): Json<DeleteRuleRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.rules.delete(query.owner_id, &payload.code).await?;
    Ok(Json(MessageResponse {
        message: "Loyalty deleted".to_string(),
    }))
}
