//! Request authentication
//!
//! The session token travels in the `session` cookie or as an
//! `Authorization: Bearer` header. Handlers pick the extractor matching the
//! access they need; admin routes sit behind [`require_admin`].

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::database::AppState;
use crate::error::AppError;
use crate::model::{Role, UserIdentity};

pub const SESSION_COOKIE: &str = "session";

/// Session token presented with a request, if any
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string())
        })
        .filter(|token| !token.is_empty())
}

/// Resolves the caller of a request; `None` for anonymous requests
pub async fn current_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<UserIdentity>, AppError> {
    match session_token(headers) {
        Some(token) => state.users.session_identity(&token).await,
        None => Ok(None),
    }
}

/// Authenticated caller; rejects anonymous requests with 401
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserIdentity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<UserIdentity>() {
            return Ok(CurrentUser(identity.clone()));
        }
        current_identity(state, &parts.headers)
            .await?
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Caller identity when there is one
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserIdentity>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(current_identity(state, &parts.headers).await?))
    }
}

/// Middleware guarding admin routes
///
/// Anonymous callers get 401, authenticated non-admins 403. On success the
/// identity is stored in the request extensions for [`CurrentUser`].
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = current_identity(&state, request.headers())
        .await?
        .ok_or(AppError::Unauthorized)?;
    identity.require_role(Role::Admin)?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
