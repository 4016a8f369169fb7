//! Registration, login and logout

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;

use crate::database::AppState;
use crate::error::AppError;
use crate::middleware::{session_token, CurrentUser, SESSION_COOKIE};
use crate::model::{LoginRequest, RegisterRequest, UserResponse};

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Creates an account and signs it in
///
/// # Response
///
/// - **201 Created** - account created, `session` cookie set
/// - **400 Bad Request** - invalid username, email or password
/// - **409 Conflict** - username or email already registered
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    let token = state.users.create_session(user.id).await?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token)),
        Json(UserResponse::from(user)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state.users.create_session(user.id).await?;
    tracing::debug!(user_id = user.id, "user logged in");

    Ok((jar.add(session_cookie(token)), Json(UserResponse::from(user))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token(&headers) {
        state.users.end_session(&token).await?;
    }

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

pub async fn current_user(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.get(identity.id).await?;
    Ok(Json(UserResponse::from(user)))
}
