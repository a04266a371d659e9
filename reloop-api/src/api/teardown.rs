//! Teardown session endpoints
//!
//! A session walks the device's ordered steps. Gated steps must be
//! acknowledged before the runner enters them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::MaybeUser;
use crate::models::{NavigationView, SessionView};
use crate::{ApiResult, AppState};

/// POST /api/devices/:id/sessions
///
/// **Errors:** 404 for an unknown device or one without teardown steps.
pub async fn start_session(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(device_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let view = state.workflow.start_session(device_id, user.user_id()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.workflow.snapshot(session_id, user.user_id()).await?))
}

/// DELETE /api/sessions/:id
pub async fn discard_session(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.workflow.discard(session_id, user.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:id/next
///
/// Returns `gate_required` instead of moving when the next step is gated.
pub async fn next_step(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<NavigationView>> {
    Ok(Json(state.workflow.advance(session_id, user.user_id()).await?))
}

/// POST /api/sessions/:id/previous
pub async fn previous_step(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<NavigationView>> {
    Ok(Json(state.workflow.retreat(session_id, user.user_id()).await?))
}

/// POST /api/sessions/:id/acknowledge
///
/// **Errors:** 409 when no gate is pending.
pub async fn acknowledge_gate(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<NavigationView>> {
    Ok(Json(
        state
            .workflow
            .acknowledge_gate(session_id, user.user_id())
            .await?,
    ))
}

/// POST /api/sessions/:id/cancel-gate
pub async fn cancel_gate(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.workflow.cancel_gate(session_id, user.user_id()).await?))
}

pub fn teardown_routes() -> Router<AppState> {
    Router::new()
        .route("/api/devices/:id/sessions", post(start_session))
        .route("/api/sessions/:id", get(get_session).delete(discard_session))
        .route("/api/sessions/:id/next", post(next_step))
        .route("/api/sessions/:id/previous", post(previous_step))
        .route("/api/sessions/:id/acknowledge", post(acknowledge_gate))
        .route("/api/sessions/:id/cancel-gate", post(cancel_gate))
}
