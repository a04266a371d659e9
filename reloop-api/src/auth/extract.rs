//! Bearer token middleware and extractors

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::Identity;
use crate::{ApiError, AppState};

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a live token; stores the `Identity` for handlers
///
/// Applied to protected routes only.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))?;

    let identity = state
        .session_store
        .resolve(&token)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Identity placed by [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
    }
}

/// Optional identity for public routes
///
/// No header means anonymous; a header carrying a dead token is rejected
/// rather than silently downgraded.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Identity>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|i| i.user_id)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(MaybeUser(Some(identity.clone())));
        }

        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };

        match state.session_store.resolve(token).await {
            Some(identity) => Ok(MaybeUser(Some(identity))),
            None => Err(ApiError::Unauthorized("Session expired or invalid".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
