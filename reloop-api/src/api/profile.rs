//! Profile endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::auth::CurrentUser;
use crate::services::ProfileView;
use crate::{ApiResult, AppState};

/// GET /api/profile
///
/// Requires a bearer token.
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ProfileView>> {
    Ok(Json(state.ledger.profile(identity.user_id).await?))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/api/profile", get(get_profile))
}
