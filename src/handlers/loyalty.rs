use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::entities::loyalty_transactions;
use crate::error::AppError;
use crate::models::common::{ErrorResponse, UserOwnerQuery};
use crate::models::loyalty::{
    AccrualOutcome, ClaimCodeRequest, LeaderboardPeriod, LeaderboardQuery, LeaderboardResponse,
    TotalPointsResponse,
};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler for GET /api/loyalty/points
pub async fn get_total_points(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
) -> Result<Json<TotalPointsResponse>, ApiError> {
    let total_points = state
        .loyalty
        .total_points(query.user_id, query.owner_id)
        .await?;

    Ok(Json(TotalPointsResponse { total_points }))
}

/// Handler for GET /api/loyalty/transactions
/// Ledger entries for the user in this owner's program, newest first
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
) -> Result<Json<Vec<loyalty_transactions::Model>>, ApiError> {
    let entries = state
        .loyalty
        .transactions(query.user_id, query.owner_id)
        .await?;

    Ok(Json(entries))
}

/// Handler for POST /api/loyalty/claim
pub async fn claim_code(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
    Json(payload): Json<ClaimCodeRequest>,
) -> Result<Json<AccrualOutcome>, ApiError> {
    tracing::info!(
        user_id = query.user_id,
        owner_id = query.owner_id,
        code = %payload.code,
        "Claiming loyalty code"
    );

    let outcome = state
        .loyalty
        .accrue(query.user_id, query.owner_id, &payload.code, payload.value)
        .await?;

    Ok(Json(outcome))
}

/// Handler for POST /api/loyalty/admin/add-code
/// Same engine as a claim; ADMIN_ADD and ADMIN_SUBTRACT rules decide the sign
pub async fn admin_add_code(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
    Json(payload): Json<ClaimCodeRequest>,
) -> Result<Json<AccrualOutcome>, ApiError> {
    tracing::info!(
        user_id = query.user_id,
        owner_id = query.owner_id,
        code = %payload.code,
        value = ?payload.value,
        "Admin loyalty adjustment"
    );

    let outcome = state
        .loyalty
        .accrue(query.user_id, query.owner_id, &payload.code, payload.value)
        .await?;

    Ok(Json(outcome))
}

/// Handler for GET /api/loyalty/leaderboard
/// Users ranked by successful points earned in the last day, week or month
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let period: LeaderboardPeriod = query
        .period
        .parse()
        .map_err(|p| AppError::Validation(format!("Invalid leaderboard period: {}", p)))?;

    let leaderboard = state
        .loyalty
        .leaderboard(query.owner_id, period, query.limit, query.offset)
        .await?;

    Ok(Json(LeaderboardResponse { leaderboard }))
}
