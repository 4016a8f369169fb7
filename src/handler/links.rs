//! Public link and NFC claim endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::with_url;
use crate::cards::check_access;
use crate::database::AppState;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::model::{
    ClaimResponse, CreateLinkRequest, LinkResponse, LinkStatus, PublicCard, Role, UserIdentity,
};

/// Only the card's owner (or an admin) may manage its links
async fn authorize_card_owner(
    state: &AppState,
    identity: &UserIdentity,
    card_id: u64,
) -> Result<(), AppError> {
    let card = state.cards.get(card_id).await?;
    check_access(&card, Some(identity), None)
}

/// Creates a share link for one of the caller's cards
///
/// # Request Body
///
/// ```json
/// {
///   "businessCardId": 12,
///   "uniqueSlug": "jane-doe"  // Optional
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - link created
/// - **403 Forbidden** - caller does not own the card
/// - **409 Conflict** - requested slug already taken
pub async fn create_link(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkResponse>), AppError> {
    authorize_card_owner(&state, &identity, payload.business_card_id).await?;
    let link = state
        .links
        .create_link(payload.business_card_id, payload.unique_slug)
        .await?;
    Ok((StatusCode::CREATED, Json(with_url(&state.config, link))))
}

pub async fn list_card_links(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(card_id): Path<u64>,
) -> Result<Json<Vec<LinkResponse>>, AppError> {
    authorize_card_owner(&state, &identity, card_id).await?;
    let links = state.links.list_by_card(card_id).await?;
    Ok(Json(
        links
            .into_iter()
            .map(|link| with_url(&state.config, link))
            .collect(),
    ))
}

/// Deletes one of the caller's links
///
/// Unbound pre-generated links have no owner; only admins remove those.
pub async fn delete_link(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let link = state.links.get_by_id(id).await?;
    match link.business_card_id {
        Some(card_id) => authorize_card_owner(&state, &identity, card_id).await?,
        None => identity.require_role(Role::Admin)?,
    }
    state.links.delete_link(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Shows the card behind a public link and counts the view
///
/// # Response
///
/// - **200 OK** - the card, without owner or device identifiers
/// - **404 Not Found** - unknown, deactivated or not yet claimed link
pub async fn view_link(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicCard>, AppError> {
    let card = state.links.resolve_for_view(&slug).await?;
    Ok(Json(PublicCard::from(card)))
}

/// Claim status of an NFC link, for the claim page
///
/// # Response
///
/// - **200 OK** - link status, including the template card if any
/// - **404 Not Found** - unknown link
/// - **410 Gone** - link deactivated
pub async fn claim_status(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<LinkStatus>, AppError> {
    let status = state.links.resolve_for_claim_check(&slug).await?;
    Ok(Json(status))
}

/// Claims an NFC link for the signed-in caller
///
/// # Response
///
/// - **201 Created** - new card bound to the link
/// - **401 Unauthorized** - not signed in
/// - **404 Not Found** - unknown link
/// - **409 Conflict** - already claimed
/// - **410 Gone** - link deactivated
/// - **422 Unprocessable Entity** - link was never claimable
pub async fn claim_link(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(slug): Path<String>,
) -> Result<(StatusCode, Json<ClaimResponse>), AppError> {
    let outcome = state.claims.claim(&slug, identity.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ClaimResponse {
            business_card_id: outcome.business_card_id,
            link: outcome.link,
            card: outcome.card,
        }),
    ))
}
