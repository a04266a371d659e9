//! Harvest hand-off endpoints
//!
//! Finishing a session parks resell and donate parts here for the
//! signed-in user until the marketplace or donation flow picks them up.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::auth::CurrentUser;
use crate::models::HarvestHandoff;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/marketplace/pending
pub async fn pending_resell(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<HarvestHandoff>> {
    state
        .workflow
        .pending_resell(identity.user_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No parts waiting for the marketplace".to_string()))
}

/// DELETE /api/marketplace/pending
pub async fn clear_resell(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> StatusCode {
    if state.workflow.clear_resell(identity.user_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// GET /api/donate/pending
pub async fn pending_donate(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<HarvestHandoff>> {
    state
        .workflow
        .pending_donate(identity.user_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No parts waiting for donation".to_string()))
}

pub fn marketplace_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/marketplace/pending",
            get(pending_resell).delete(clear_resell),
        )
        .route("/api/donate/pending", get(pending_donate))
}
