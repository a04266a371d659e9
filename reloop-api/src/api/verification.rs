//! Component verification and harvest endpoints
//!
//! Photo uploads are raw image bodies. The handler returns 202 as soon as
//! the photo is normalized; the verdict follows on `/api/events`.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::MaybeUser;
use crate::models::{ComponentView, CompletionView, Decision, FinishOutcome};
use crate::services::SubmissionAccepted;
use crate::{ApiError, ApiResult, AppState};

/// Upper bound on an uploaded photo
pub const MAX_PHOTO_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// `null` clears a previous choice
    pub decision: Option<Decision>,
}

fn require_image_body(headers: &HeaderMap, body: &Bytes) -> ApiResult<()> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "Expected an image content type, got '{}'",
            content_type
        )));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Photo body is empty".to_string()));
    }
    Ok(())
}

/// POST /api/sessions/:id/components/:component_id/photo
///
/// **Errors:** 400 for a non-image body, 404 for an unknown session or
/// component, 409 if the component is already being verified.
pub async fn submit_photo(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((session_id, component_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmissionAccepted>)> {
    require_image_body(&headers, &body)?;

    let accepted = state
        .workflow
        .submit_photo(session_id, component_id, user.user_id(), body.to_vec())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/sessions/:id/components/:component_id/bypass
///
/// Only offered after a failed verification.
pub async fn bypass(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((session_id, component_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ComponentView>> {
    Ok(Json(
        state
            .workflow
            .bypass(session_id, component_id, user.user_id())
            .await?,
    ))
}

/// POST /api/sessions/:id/components/:component_id/decision
pub async fn decide(
    State(state): State<AppState>,
    user: MaybeUser,
    Path((session_id, component_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<Json<ComponentView>> {
    Ok(Json(
        state
            .workflow
            .decide(session_id, component_id, user.user_id(), payload.decision)
            .await?,
    ))
}

/// GET /api/sessions/:id/completion
pub async fn completion(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CompletionView>> {
    Ok(Json(
        state
            .workflow
            .completion_view(session_id, user.user_id())
            .await?,
    ))
}

/// POST /api/sessions/:id/finish
///
/// **Errors:** 409 when the session was already finished.
pub async fn finish(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<FinishOutcome>> {
    Ok(Json(state.workflow.finish(session_id, user.user_id()).await?))
}

pub fn verification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/sessions/:id/components/:component_id/photo",
            post(submit_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES)),
        )
        .route(
            "/api/sessions/:id/components/:component_id/bypass",
            post(bypass),
        )
        .route(
            "/api/sessions/:id/components/:component_id/decision",
            post(decide),
        )
        .route("/api/sessions/:id/completion", get(completion))
        .route("/api/sessions/:id/finish", post(finish))
}
