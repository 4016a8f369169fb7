//! Business card endpoints
//!
//! Anonymous visitors edit their card through the device id their client
//! generated; signed-in users through their session.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::cards::check_access;
use crate::database::AppState;
use crate::error::AppError;
use crate::middleware::MaybeUser;
use crate::model::{
    AutoSaveRequest, BusinessCard, CardPatch, CardQuery, CreateCardRequest, DeviceParams, NewCard,
};

/// Lists a user's cards or fetches a device's card
///
/// # Query Parameters
///
/// - `userId` - cards owned by this user (caller must be that user or an admin)
/// - `deviceId` - the card saved from this device, or `null`
///
/// One of the two is required.
pub async fn list_cards(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Query(params): Query<CardQuery>,
) -> Result<Response, AppError> {
    if let Some(user_id) = params.user_id {
        let identity = identity.ok_or(AppError::Unauthorized)?;
        if identity.id != user_id && !identity.is_admin() {
            return Err(AppError::Forbidden);
        }
        let cards = state.cards.list_by_owner(user_id).await?;
        return Ok(Json(cards).into_response());
    }

    if let Some(device_id) = params.device_id.filter(|d| !d.is_empty()) {
        let card = state.cards.find_by_device(&device_id).await?;
        if let Some(card) = &card {
            check_access(card, identity.as_ref(), Some(device_id.as_str()))?;
        }
        return Ok(Json(card).into_response());
    }

    Err(AppError::invalid("Missing userId or deviceId parameter"))
}

pub async fn get_card(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Path(id): Path<u64>,
    Query(params): Query<DeviceParams>,
) -> Result<Json<BusinessCard>, AppError> {
    let card = state.cards.get(id).await?;
    check_access(&card, identity.as_ref(), params.device_id.as_deref())?;
    Ok(Json(card))
}

/// Creates a card
///
/// A signed-in caller owns the new card; an anonymous caller must send a
/// `deviceId`.
pub async fn create_card(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Json(payload): Json<CreateCardRequest>,
) -> Result<(StatusCode, Json<BusinessCard>), AppError> {
    let card = state
        .cards
        .create(NewCard {
            user_id: identity.map(|i| i.id),
            device_id: payload.device_id,
            is_template: false,
            fields: payload.fields,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn update_card(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Path(id): Path<u64>,
    Query(params): Query<DeviceParams>,
    Json(patch): Json<CardPatch>,
) -> Result<Json<BusinessCard>, AppError> {
    let card = state.cards.get(id).await?;
    check_access(&card, identity.as_ref(), params.device_id.as_deref())?;
    let card = state.cards.update(id, patch).await?;
    Ok(Json(card))
}

/// Deletes a card along with all of its public links
pub async fn delete_card(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Path(id): Path<u64>,
    Query(params): Query<DeviceParams>,
) -> Result<StatusCode, AppError> {
    let card = state.cards.get(id).await?;
    check_access(&card, identity.as_ref(), params.device_id.as_deref())?;
    state.cards.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Saves the device's card, creating it on the first save
///
/// # Response
///
/// - **201 Created** - first save from this device
/// - **200 OK** - existing card updated
/// - **400 Bad Request** - missing `deviceId` or invalid fields
/// - **401 / 403** - the device's card belongs to an account
pub async fn auto_save(
    State(state): State<AppState>,
    MaybeUser(identity): MaybeUser,
    Json(payload): Json<AutoSaveRequest>,
) -> Result<(StatusCode, Json<BusinessCard>), AppError> {
    let device_id = payload.device_id.unwrap_or_default();
    let (card, created) = state
        .cards
        .auto_save(&device_id, identity, payload.patch)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(card)))
}
