//! Leaderboard endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::services::LeaderboardEntry;
use crate::{ApiResult, AppState};

/// GET /api/leaderboard
///
/// Top users by XP, ranks starting at 1.
pub async fn get_leaderboard(State(state): State<AppState>) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    Ok(Json(state.ledger.leaderboard().await?))
}

pub fn leaderboard_routes() -> Router<AppState> {
    Router::new().route("/api/leaderboard", get(get_leaderboard))
}
