use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::models::common::{ErrorResponse, UserOwnerQuery};
use crate::models::streak::{CheckInResponse, StreakResponse};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler for POST /api/streaks/check-in
pub async fn check_in(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
) -> Result<Json<CheckInResponse>, ApiError> {
    let outcome = state.streaks.check_in(query.user_id, query.owner_id).await?;
    Ok(Json(outcome))
}

/// Handler for GET /api/streaks
pub async fn get_streak(
    State(state): State<AppState>,
    Query(query): Query<UserOwnerQuery>,
) -> Result<Json<StreakResponse>, ApiError> {
    let streak_count = state
        .streaks
        .get_streak(query.user_id, query.owner_id)
        .await?;

    Ok(Json(StreakResponse { streak_count }))
}
