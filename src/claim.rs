//! Claiming pre-generated NFC links
//!
//! A claim turns an unbound pre-generated link into one bound to a brand-new
//! card owned by the claimant. The new card starts as a copy of the link's
//! template card when there is one, otherwise as an empty default card.
//!
//! ```text
//! [unbound, pre-generated, unclaimed] --claim(user)--> [bound, claimed]  (terminal)
//! ```

use std::sync::Arc;

use chrono::Utc;

use crate::cards::CardStore;
use crate::error::AppError;
use crate::links::LinkRegistry;
use crate::model::{BusinessCard, CardFields, NewCard, PublicLink};
use crate::token::TokenGenerator;

/// Length of the device id minted for a claimed card
pub const DEVICE_ID_LEN: usize = 21;

/// Guards a link must pass to be claimed
///
/// Evaluated once when the claim starts and again inside the binding write.
pub fn check_claimable(link: &PublicLink) -> Result<(), AppError> {
    if !link.is_pre_generated {
        return Err(AppError::NotClaimable);
    }
    if !link.is_active {
        return Err(AppError::LinkInactive);
    }
    if link.is_claimed {
        return Err(AppError::AlreadyClaimed);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub business_card_id: u64,
    pub link: PublicLink,
    pub card: BusinessCard,
}

#[derive(Clone)]
pub struct ClaimWorkflow {
    cards: CardStore,
    links: LinkRegistry,
    tokens: Arc<dyn TokenGenerator>,
}

impl ClaimWorkflow {
    pub fn new(cards: CardStore, links: LinkRegistry, tokens: Arc<dyn TokenGenerator>) -> Self {
        Self {
            cards,
            links,
            tokens,
        }
    }

    /// Claims `slug` for `user_id`
    ///
    /// If binding loses a race after the card was stored, the card is left
    /// behind unreferenced and the caller gets `AlreadyClaimed`. Nothing is
    /// retried.
    pub async fn claim(&self, slug: &str, user_id: u64) -> Result<ClaimOutcome, AppError> {
        let link = self.links.get_by_slug(slug).await?;
        check_claimable(&link)?;

        let fields = self.starting_fields(&link).await?;
        let card = self
            .cards
            .create(NewCard {
                user_id: Some(user_id),
                device_id: Some(self.tokens.token(DEVICE_ID_LEN)),
                is_template: false,
                fields,
            })
            .await?;

        let link = match self
            .links
            .bind_claim(slug, card.id, user_id, Utc::now())
            .await
        {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(
                    slug,
                    user_id,
                    orphaned_card = card.id,
                    error = %err,
                    "claim lost after card creation"
                );
                return Err(err);
            }
        };

        tracing::info!(slug, user_id, card_id = card.id, "link claimed");
        Ok(ClaimOutcome {
            business_card_id: card.id,
            link,
            card,
        })
    }

    /// Presentable fields of the link's template, or a blank card
    async fn starting_fields(&self, link: &PublicLink) -> Result<CardFields, AppError> {
        let Some(template_id) = link.template_id else {
            return Ok(CardFields::default());
        };

        match self.cards.get(template_id).await {
            Ok(template) => Ok(template.fields),
            Err(AppError::NotFound(_)) => {
                tracing::warn!(
                    slug = %link.unique_slug,
                    template_id,
                    "template card missing, claiming with a blank card"
                );
                Ok(CardFields::default())
            }
            Err(err) => Err(err),
        }
    }
}
