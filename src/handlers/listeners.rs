use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::models::common::ErrorResponse;
use crate::models::listener::{ListenerListResponse, ListenerStatusResponse};
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler for GET /api/listeners
pub async fn list_listeners(State(state): State<AppState>) -> Json<ListenerListResponse> {
    Json(ListenerListResponse {
        collections: state.listeners.active_collections(),
    })
}

/// Handler for POST /api/listeners/{collection_id}/reset
/// Called after a collection's chain or contract address changes
pub async fn reset_listener(
    State(state): State<AppState>,
    Path(collection_id): Path<i32>,
) -> Result<Json<ListenerStatusResponse>, ApiError> {
    let active = state.listeners.reset(collection_id).await?;
    Ok(Json(ListenerStatusResponse {
        collection_id,
        active,
    }))
}

/// Handler for DELETE /api/listeners/{collection_id}
/// Called when a collection is deleted; succeeds whether or not one was running
pub async fn remove_listener(
    State(state): State<AppState>,
    Path(collection_id): Path<i32>,
) -> Json<ListenerStatusResponse> {
    state.listeners.remove(collection_id);
    Json(ListenerStatusResponse {
        collection_id,
        active: false,
    })
}
