//! Public link registry
//!
//! Slug-addressed links to business cards. A link is either created bound to
//! a card by its owner, or pre-generated unbound by an admin for printing on
//! an NFC tag and bound later by a claim (see [`crate::claim`]).
//!
//! Links are keyed by slug in `public_links_v1`, so a slug can never be
//! stored twice. Random slugs are retried a bounded number of times on
//! collision; generation never loops indefinitely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::cards;
use crate::claim::check_claimable;
use crate::database::{
    decode, index_key, index_range, next_id, Store, TABLE_CARDS, TABLE_CARD_LINKS, TABLE_LINKS,
    TABLE_LINK_IDS,
};
use crate::error::AppError;
use crate::model::{BusinessCard, LinkStatus, PublicCard, PublicLink};
use crate::token::TokenGenerator;

/// Candidates tried before giving up on a random slug
pub const SLUG_ATTEMPTS: usize = 5;

/// Length of a slug generated without a prefix
pub const RANDOM_SLUG_LEN: usize = 10;

/// Length of the random part of a prefixed slug
pub const SUFFIX_LEN: usize = 8;

/// Largest batch an admin may generate at once
pub const MAX_BATCH: i64 = 1000;

const MAX_SLUG_LEN: usize = 64;
const MAX_PREFIX_LEN: usize = 32;
const LINK_SEQUENCE: &str = "public_links";

#[derive(Clone)]
pub struct LinkRegistry {
    store: Store,
    tokens: Arc<dyn TokenGenerator>,
}

impl LinkRegistry {
    pub fn new(store: Store, tokens: Arc<dyn TokenGenerator>) -> Self {
        Self { store, tokens }
    }

    /// Creates an active link bound to an existing card
    ///
    /// A requested slug is used verbatim and fails with `SlugConflict` when
    /// taken; otherwise a random slug is generated.
    pub async fn create_link(
        &self,
        card_id: u64,
        requested_slug: Option<String>,
    ) -> Result<PublicLink, AppError> {
        let requested = requested_slug
            .map(|slug| slug.trim().to_string())
            .filter(|slug| !slug.is_empty());
        if let Some(slug) = &requested {
            validate_token("Slug", slug, MAX_SLUG_LEN)?;
        }

        let tokens = Arc::clone(&self.tokens);
        let link = self
            .store
            .write(move |txn| {
                if !cards::card_exists(txn, card_id)? {
                    return Err(AppError::NotFound("Business card"));
                }

                let slug = match requested {
                    Some(slug) => {
                        let table = txn.open_table(TABLE_LINKS)?;
                        if table.get(slug.as_str())?.is_some() {
                            return Err(AppError::SlugConflict(slug));
                        }
                        slug
                    }
                    None => fresh_slug(txn, || tokens.slug(RANDOM_SLUG_LEN))?,
                };

                let link = PublicLink {
                    id: next_id(txn, LINK_SEQUENCE)?,
                    unique_slug: slug,
                    business_card_id: Some(card_id),
                    is_active: true,
                    is_pre_generated: false,
                    is_claimed: false,
                    claimed_at: None,
                    claimed_by_user_id: None,
                    template_id: None,
                    view_count: 0,
                    created_at: Utc::now(),
                };
                insert_link(txn, &link)?;
                Ok(link)
            })
            .await?;

        tracing::info!(link_id = link.id, slug = %link.unique_slug, card_id, "public link created");
        Ok(link)
    }

    /// Pre-generates `count` unbound links for NFC tags
    ///
    /// Slugs are `{prefix}-{suffix}` when a prefix is given. The batch is one
    /// transaction: a missing template or any slug that cannot be generated
    /// within its retry bound fails the whole batch and stores nothing.
    pub async fn batch_generate(
        &self,
        count: i64,
        prefix: Option<String>,
        template_id: Option<u64>,
    ) -> Result<Vec<PublicLink>, AppError> {
        if !(1..=MAX_BATCH).contains(&count) {
            return Err(AppError::invalid(format!(
                "Count must be between 1 and {}",
                MAX_BATCH
            )));
        }
        let prefix = prefix
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            validate_token("Prefix", prefix, MAX_PREFIX_LEN)?;
        }

        let tokens = Arc::clone(&self.tokens);
        let links = self
            .store
            .write(move |txn| {
                if let Some(template_id) = template_id {
                    if !cards::card_exists(txn, template_id)? {
                        return Err(AppError::NotFound("Template card"));
                    }
                }

                let candidate = || match &prefix {
                    Some(prefix) => format!("{}-{}", prefix, tokens.slug(SUFFIX_LEN)),
                    None => tokens.slug(RANDOM_SLUG_LEN),
                };

                let now = Utc::now();
                let mut links = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let slug = fresh_slug(txn, candidate)?;
                    let link = PublicLink {
                        id: next_id(txn, LINK_SEQUENCE)?,
                        unique_slug: slug,
                        business_card_id: None,
                        is_active: true,
                        is_pre_generated: true,
                        is_claimed: false,
                        claimed_at: None,
                        claimed_by_user_id: None,
                        template_id,
                        view_count: 0,
                        created_at: now,
                    };
                    insert_link(txn, &link)?;
                    links.push(link);
                }
                Ok(links)
            })
            .await?;

        tracing::info!(count = links.len(), ?template_id, "pre-generated links created");
        Ok(links)
    }

    /// Resolves a slug for a public visitor and counts the view
    ///
    /// Inactive, unbound and orphaned links are all reported as `NotFound`.
    /// The view counter is bumped after the read; a failed bump is logged and
    /// does not fail the visit.
    pub async fn resolve_for_view(&self, slug: &str) -> Result<BusinessCard, AppError> {
        let key = slug.to_string();
        let card = self
            .store
            .read(move |txn| {
                let link = load_link(txn, &key)?;
                if !link.is_active {
                    return Err(AppError::NotFound("Public link"));
                }
                let card_id = link
                    .business_card_id
                    .ok_or(AppError::NotFound("Business card"))?;
                let table = txn.open_table(TABLE_CARDS)?;
                let card: BusinessCard =
                    decode(table.get(card_id)?)?.ok_or(AppError::NotFound("Business card"))?;
                Ok(card)
            })
            .await?;

        if let Err(err) = self.record_view(slug).await {
            tracing::warn!(slug, error = %err, "failed to record link view");
        }
        Ok(card)
    }

    /// Reports a link's claim state without touching it
    pub async fn resolve_for_claim_check(&self, slug: &str) -> Result<LinkStatus, AppError> {
        let slug = slug.to_string();
        self.store
            .read(move |txn| {
                let link = load_link(txn, &slug)?;
                if !link.is_active {
                    return Err(AppError::LinkInactive);
                }

                let template_card: Option<BusinessCard> = match link.template_id {
                    Some(template_id) => {
                        let table = txn.open_table(TABLE_CARDS)?;
                        let card = decode(table.get(template_id)?)?;
                        card
                    }
                    None => None,
                };

                Ok(LinkStatus {
                    unique_slug: link.unique_slug,
                    is_active: link.is_active,
                    is_pre_generated: link.is_pre_generated,
                    is_claimed: link.is_claimed,
                    template_card: template_card.map(PublicCard::from),
                })
            })
            .await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<PublicLink, AppError> {
        let slug = slug.to_string();
        self.store.read(move |txn| load_link(txn, &slug)).await
    }

    pub async fn get_by_id(&self, id: u64) -> Result<PublicLink, AppError> {
        self.store
            .read(move |txn| {
                let ids = txn.open_table(TABLE_LINK_IDS)?;
                let slug = ids
                    .get(id)?
                    .map(|slug| slug.value().to_string())
                    .ok_or(AppError::NotFound("Public link"))?;
                load_link(txn, &slug)
            })
            .await
    }

    pub async fn toggle_active(&self, id: u64, is_active: bool) -> Result<PublicLink, AppError> {
        let link = self
            .store
            .write(move |txn| {
                let slug = slug_for_id(txn, id)?;
                let mut table = txn.open_table(TABLE_LINKS)?;
                let mut link: PublicLink =
                    decode(table.get(slug.as_str())?)?.ok_or(AppError::NotFound("Public link"))?;
                link.is_active = is_active;
                table.insert(slug.as_str(), serde_json::to_string(&link)?.as_str())?;
                Ok(link)
            })
            .await?;

        tracing::info!(link_id = id, is_active, "public link toggled");
        Ok(link)
    }

    pub async fn delete_link(&self, id: u64) -> Result<(), AppError> {
        self.store
            .write(move |txn| {
                let slug = slug_for_id(txn, id)?;
                remove_link(txn, &slug)
            })
            .await?;

        tracing::info!(link_id = id, "public link deleted");
        Ok(())
    }

    pub async fn list_by_card(&self, card_id: u64) -> Result<Vec<PublicLink>, AppError> {
        self.store
            .read(move |txn| {
                let index = txn.open_table(TABLE_CARD_LINKS)?;
                let (start, end) = index_range(card_id);
                let mut slugs = Vec::new();
                for entry in index.range(start.as_str()..end.as_str())? {
                    let (_, slug) = entry?;
                    slugs.push(slug.value().to_string());
                }

                let table = txn.open_table(TABLE_LINKS)?;
                let mut links: Vec<PublicLink> = Vec::with_capacity(slugs.len());
                for slug in slugs {
                    if let Some(link) = decode(table.get(slug.as_str())?)? {
                        links.push(link);
                    }
                }
                Ok(links)
            })
            .await
    }

    /// Pre-generated links still waiting for a claimant
    pub async fn list_unassigned(&self) -> Result<Vec<PublicLink>, AppError> {
        self.store
            .read(|txn| scan_links(txn, PublicLink::is_unassigned))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<PublicLink>, AppError> {
        self.store.read(|txn| scan_links(txn, |_| true)).await
    }

    /// Binds an unbound link to a freshly created card
    ///
    /// The claim guards are evaluated again inside the write transaction, so
    /// of two claims that both passed their read-time check only the first
    /// writer binds; the other gets `AlreadyClaimed`. A card deleted since
    /// its creation fails the bind with `NotFound`.
    pub(crate) async fn bind_claim(
        &self,
        slug: &str,
        card_id: u64,
        user_id: u64,
        claimed_at: DateTime<Utc>,
    ) -> Result<PublicLink, AppError> {
        let slug = slug.to_string();
        self.store
            .write(move |txn| {
                if !cards::card_exists(txn, card_id)? {
                    return Err(AppError::NotFound("Business card"));
                }

                let mut table = txn.open_table(TABLE_LINKS)?;
                let mut link: PublicLink =
                    decode(table.get(slug.as_str())?)?.ok_or(AppError::NotFound("Public link"))?;
                check_claimable(&link)?;

                link.business_card_id = Some(card_id);
                link.is_claimed = true;
                link.claimed_by_user_id = Some(user_id);
                link.claimed_at = Some(claimed_at);
                table.insert(slug.as_str(), serde_json::to_string(&link)?.as_str())?;

                let mut index = txn.open_table(TABLE_CARD_LINKS)?;
                index.insert(index_key(card_id, link.id).as_str(), slug.as_str())?;
                Ok(link)
            })
            .await
    }

    async fn record_view(&self, slug: &str) -> Result<(), AppError> {
        let slug = slug.to_string();
        self.store
            .write(move |txn| {
                let mut table = txn.open_table(TABLE_LINKS)?;
                let found: Option<PublicLink> = decode(table.get(slug.as_str())?)?;
                if let Some(mut link) = found {
                    link.view_count = link.view_count.saturating_add(1);
                    table.insert(slug.as_str(), serde_json::to_string(&link)?.as_str())?;
                }
                Ok(())
            })
            .await
    }
}

/// Removes every link bound to `card_id` inside `txn`
pub(crate) fn remove_card_links(txn: &WriteTransaction, card_id: u64) -> Result<usize, AppError> {
    let (start, end) = index_range(card_id);
    let mut slugs = Vec::new();
    {
        let index = txn.open_table(TABLE_CARD_LINKS)?;
        for entry in index.range(start.as_str()..end.as_str())? {
            let (_, slug) = entry?;
            slugs.push(slug.value().to_string());
        }
    }

    for slug in &slugs {
        remove_link(txn, slug)?;
    }
    Ok(slugs.len())
}

fn remove_link(txn: &WriteTransaction, slug: &str) -> Result<(), AppError> {
    let mut table = txn.open_table(TABLE_LINKS)?;
    let link: PublicLink = decode(table.remove(slug)?)?.ok_or(AppError::NotFound("Public link"))?;
    drop(table);

    let mut ids = txn.open_table(TABLE_LINK_IDS)?;
    ids.remove(link.id)?;
    if let Some(card_id) = link.business_card_id {
        let mut index = txn.open_table(TABLE_CARD_LINKS)?;
        index.remove(index_key(card_id, link.id).as_str())?;
    }
    Ok(())
}

fn insert_link(txn: &WriteTransaction, link: &PublicLink) -> Result<(), AppError> {
    let slug = link.unique_slug.as_str();

    let mut table = txn.open_table(TABLE_LINKS)?;
    table.insert(slug, serde_json::to_string(link)?.as_str())?;

    let mut ids = txn.open_table(TABLE_LINK_IDS)?;
    ids.insert(link.id, slug)?;

    if let Some(card_id) = link.business_card_id {
        let mut index = txn.open_table(TABLE_CARD_LINKS)?;
        index.insert(index_key(card_id, link.id).as_str(), slug)?;
    }
    Ok(())
}

/// Draws candidates until one is free, at most `SLUG_ATTEMPTS` times
fn fresh_slug(
    txn: &WriteTransaction,
    mut candidate: impl FnMut() -> String,
) -> Result<String, AppError> {
    let table = txn.open_table(TABLE_LINKS)?;
    for _ in 0..SLUG_ATTEMPTS {
        let slug = candidate();
        if table.get(slug.as_str())?.is_none() {
            return Ok(slug);
        }
        tracing::debug!(slug = %slug, "slug collision, retrying");
    }
    Err(AppError::GenerationExhausted(SLUG_ATTEMPTS))
}

fn slug_for_id(txn: &WriteTransaction, id: u64) -> Result<String, AppError> {
    let ids = txn.open_table(TABLE_LINK_IDS)?;
    let slug = ids
        .get(id)?
        .map(|slug| slug.value().to_string())
        .ok_or(AppError::NotFound("Public link"))?;
    Ok(slug)
}

fn load_link(txn: &ReadTransaction, slug: &str) -> Result<PublicLink, AppError> {
    let table = txn.open_table(TABLE_LINKS)?;
    let link = decode(table.get(slug)?)?.ok_or(AppError::NotFound("Public link"))?;
    Ok(link)
}

fn scan_links(
    txn: &ReadTransaction,
    keep: impl Fn(&PublicLink) -> bool,
) -> Result<Vec<PublicLink>, AppError> {
    let table = txn.open_table(TABLE_LINKS)?;
    let mut links = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let link: PublicLink = serde_json::from_str(value.value())?;
        if keep(&link) {
            links.push(link);
        }
    }
    links.sort_by_key(|link| link.id);
    Ok(links)
}

/// Slugs and prefixes are URL path segments: ASCII letters, digits, '-' and '_'
fn validate_token(what: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    if value.len() > max_len {
        return Err(AppError::invalid(format!(
            "{} must be at most {} characters",
            what, max_len
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::invalid(format!(
            "{} may only contain letters, digits, '-' and '_'",
            what
        )));
    }
    Ok(())
}
