//! Session valuation endpoint

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::auth::MaybeUser;
use crate::models::ValuationSnapshot;
use crate::{ApiResult, AppState};

/// GET /api/sessions/:id/valuation
///
/// Baseline figures are returned immediately; the refined figures replace
/// them once the pricing collaborator answers (see `ValuationRefined`).
pub async fn get_valuation(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ValuationSnapshot>> {
    Ok(Json(state.workflow.valuation(session_id, user.user_id()).await?))
}

pub fn valuation_routes() -> Router<AppState> {
    Router::new().route("/api/sessions/:id/valuation", get(get_valuation))
}
