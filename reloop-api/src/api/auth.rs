//! Sign-up, sign-in and sign-out endpoints
//!
//! `POST /api/auth/signup`, `POST /api/auth/login`, `POST /api/auth/logout`
//! and the protected `GET /api/auth/me`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{bearer_token, AuthSession, CurrentUser, Identity};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub school: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub signed_out: bool,
}

/// POST /api/auth/signup
///
/// **Errors:** 400 for a malformed email or short password, 409 when the
/// email is taken.
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<AuthSession>)> {
    let session = state
        .session_store
        .sign_up(
            &payload.email,
            &payload.password,
            payload.name.as_deref(),
            payload.school.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/auth/login
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> ApiResult<Json<AuthSession>> {
    let session = state
        .session_store
        .sign_in(&payload.email, &payload.password)
        .await?;
    Ok(Json(session))
}

/// POST /api/auth/logout
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SignOutResponse>> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("No session to sign out".to_string()))?;
    let signed_out = state.session_store.sign_out(token).await;
    Ok(Json(SignOutResponse { signed_out }))
}

/// GET /api/auth/me
pub async fn me(CurrentUser(identity): CurrentUser) -> Json<Identity> {
    Json(identity)
}

/// Public auth routes; `/api/auth/me` is mounted behind the auth layer
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(sign_in))
        .route("/api/auth/logout", post(sign_out))
}
