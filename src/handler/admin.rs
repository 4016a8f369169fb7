//! Admin endpoints
//!
//! Mounted behind [`require_admin`](crate::middleware::require_admin).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::with_url;
use crate::database::AppState;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::model::{
    BusinessCard, CardFields, GenerateLinksRequest, GenerateLinksResponse, LinkResponse,
    ToggleLinkRequest, UpdateRoleRequest, UserResponse,
};

/// Pre-generates a batch of unbound links for NFC tags
///
/// # Request Body
///
/// ```json
/// {
///   "count": 50,
///   "prefix": "conf",    // Optional
///   "templateId": 3      // Optional
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - `{ "slugs": [...], "links": [...] }`
/// - **400 Bad Request** - count outside 1..=1000 or malformed prefix
/// - **404 Not Found** - template card does not exist
/// - **503 Service Unavailable** - a unique slug could not be generated; nothing was stored
pub async fn generate_links(
    State(state): State<AppState>,
    Json(payload): Json<GenerateLinksRequest>,
) -> Result<(StatusCode, Json<GenerateLinksResponse>), AppError> {
    let links = state
        .links
        .batch_generate(payload.count, payload.prefix, payload.template_id)
        .await?;

    let slugs = links.iter().map(|link| link.unique_slug.clone()).collect();
    let links = links
        .into_iter()
        .map(|link| with_url(&state.config, link))
        .collect();
    Ok((StatusCode::CREATED, Json(GenerateLinksResponse { slugs, links })))
}

pub async fn unassigned_links(
    State(state): State<AppState>,
) -> Result<Json<Vec<LinkResponse>>, AppError> {
    let links = state.links.list_unassigned().await?;
    Ok(Json(
        links
            .into_iter()
            .map(|link| with_url(&state.config, link))
            .collect(),
    ))
}

pub async fn list_links(
    State(state): State<AppState>,
) -> Result<Json<Vec<LinkResponse>>, AppError> {
    let links = state.links.list_all().await?;
    Ok(Json(
        links
            .into_iter()
            .map(|link| with_url(&state.config, link))
            .collect(),
    ))
}

pub async fn toggle_link(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<ToggleLinkRequest>,
) -> Result<Json<LinkResponse>, AppError> {
    let link = state.links.toggle_active(id, payload.is_active).await?;
    Ok(Json(with_url(&state.config, link)))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.links.delete_link(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<Vec<BusinessCard>>, AppError> {
    Ok(Json(state.cards.list_templates().await?))
}

pub async fn create_template(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(fields): Json<CardFields>,
) -> Result<(StatusCode, Json<BusinessCard>), AppError> {
    let card = state.cards.create_template(admin.id, fields).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn list_cards(
    State(state): State<AppState>,
) -> Result<Json<Vec<BusinessCard>>, AppError> {
    Ok(Json(state.cards.list_all().await?))
}

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.users.set_role(id, payload.role).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Deletes an account, its cards and their links
///
/// Admins cannot delete their own account.
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    if admin.id == id {
        return Err(AppError::invalid("You cannot delete your own account"));
    }
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
