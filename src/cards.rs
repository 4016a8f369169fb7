//! Business card storage
//!
//! Cards are addressed by id, and additionally through the owner index
//! (`owner_cards_v1`) and the device index (`device_cards_v1`) used by
//! anonymous auto-save.

use chrono::Utc;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::database::{
    decode, index_key, index_range, next_id, Store, TABLE_CARDS, TABLE_DEVICE_CARDS,
    TABLE_OWNER_CARDS,
};
use crate::error::AppError;
use crate::links;
use crate::model::{BusinessCard, CardFields, CardPatch, NewCard, UserIdentity};

const CARD_SEQUENCE: &str = "business_cards";

#[derive(Clone)]
pub struct CardStore {
    store: Store,
}

impl CardStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: u64) -> Result<BusinessCard, AppError> {
        self.store.read(move |txn| load_card(txn, id)).await
    }

    /// Persists a new card
    ///
    /// A card must be addressable through an owner or a device id.
    pub async fn create(&self, new: NewCard) -> Result<BusinessCard, AppError> {
        let has_device = new.device_id.as_deref().is_some_and(|d| !d.is_empty());
        if new.user_id.is_none() && !has_device {
            return Err(AppError::invalid("Device ID is required"));
        }
        new.fields.validate()?;

        let card = self.store.write(move |txn| insert_card(txn, new)).await?;
        tracing::debug!(card_id = card.id, owner = ?card.user_id, "business card created");
        Ok(card)
    }

    /// Creates a reusable template card owned by an admin
    pub async fn create_template(
        &self,
        admin_id: u64,
        fields: CardFields,
    ) -> Result<BusinessCard, AppError> {
        self.create(NewCard {
            user_id: Some(admin_id),
            device_id: None,
            is_template: true,
            fields,
        })
        .await
    }

    pub async fn update(&self, id: u64, patch: CardPatch) -> Result<BusinessCard, AppError> {
        patch.validate()?;
        self.store
            .write(move |txn| {
                let mut table = txn.open_table(TABLE_CARDS)?;
                let mut card: BusinessCard =
                    decode(table.get(id)?)?.ok_or(AppError::NotFound("Business card"))?;
                patch.apply(&mut card.fields);
                card.updated_at = Utc::now();
                table.insert(id, serde_json::to_string(&card)?.as_str())?;
                Ok(card)
            })
            .await
    }

    /// Deletes a card and every public link bound to it
    ///
    /// Returns the number of links removed along with the card.
    pub async fn delete(&self, id: u64) -> Result<usize, AppError> {
        let removed = self.store.write(move |txn| delete_card(txn, id)).await?;
        tracing::info!(card_id = id, links_removed = removed, "business card deleted");
        Ok(removed)
    }

    pub async fn list_by_owner(&self, user_id: u64) -> Result<Vec<BusinessCard>, AppError> {
        self.store
            .read(move |txn| {
                let index = txn.open_table(TABLE_OWNER_CARDS)?;
                let (start, end) = index_range(user_id);
                let mut ids = Vec::new();
                for entry in index.range(start.as_str()..end.as_str())? {
                    let (_, card_id) = entry?;
                    ids.push(card_id.value());
                }

                let table = txn.open_table(TABLE_CARDS)?;
                let mut cards: Vec<BusinessCard> = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(card) = decode(table.get(id)?)? {
                        cards.push(card);
                    }
                }
                Ok(cards)
            })
            .await
    }

    pub async fn find_by_device(&self, device_id: &str) -> Result<Option<BusinessCard>, AppError> {
        let device_id = device_id.to_string();
        self.store
            .read(move |txn| {
                let index = txn.open_table(TABLE_DEVICE_CARDS)?;
                let card_id = index.get(device_id.as_str())?.map(|id| id.value());
                let card: Option<BusinessCard> = match card_id {
                    Some(id) => decode(txn.open_table(TABLE_CARDS)?.get(id)?)?,
                    None => None,
                };
                Ok(card)
            })
            .await
    }

    pub async fn list_templates(&self) -> Result<Vec<BusinessCard>, AppError> {
        self.store
            .read(|txn| scan_cards(txn, |card| card.is_template))
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<BusinessCard>, AppError> {
        self.store.read(|txn| scan_cards(txn, |_| true)).await
    }

    /// Saves a device's card, creating it on first save
    ///
    /// An existing card must pass [`check_access`] for `identity`; the device
    /// id alone does not unlock an owned card. Returns the card and whether
    /// it was newly created.
    pub async fn auto_save(
        &self,
        device_id: &str,
        identity: Option<UserIdentity>,
        patch: CardPatch,
    ) -> Result<(BusinessCard, bool), AppError> {
        if device_id.is_empty() {
            return Err(AppError::invalid("Device ID is required"));
        }
        patch.validate()?;

        let device_id = device_id.to_string();
        self.store
            .write(move |txn| {
                let existing = txn
                    .open_table(TABLE_DEVICE_CARDS)?
                    .get(device_id.as_str())?
                    .map(|id| id.value());

                if let Some(id) = existing {
                    let mut table = txn.open_table(TABLE_CARDS)?;
                    let found: Option<BusinessCard> = decode(table.get(id)?)?;
                    if let Some(mut card) = found {
                        check_access(&card, identity.as_ref(), Some(device_id.as_str()))?;
                        patch.apply(&mut card.fields);
                        card.updated_at = Utc::now();
                        table.insert(id, serde_json::to_string(&card)?.as_str())?;
                        return Ok((card, false));
                    }
                }

                let mut fields = CardFields::default();
                patch.apply(&mut fields);
                let card = insert_card(
                    txn,
                    NewCard {
                        user_id: None,
                        device_id: Some(device_id),
                        is_template: false,
                        fields,
                    },
                )?;
                Ok((card, true))
            })
            .await
    }
}

/// Checks that the caller may manage `card`
///
/// Admins manage every card. Owned cards belong to their owner; anonymous
/// cards to whoever presents the matching device id.
pub fn check_access(
    card: &BusinessCard,
    identity: Option<&UserIdentity>,
    device_id: Option<&str>,
) -> Result<(), AppError> {
    if identity.is_some_and(UserIdentity::is_admin) {
        return Ok(());
    }

    match (card.user_id, identity) {
        (Some(owner), Some(identity)) if owner == identity.id => Ok(()),
        (Some(_), Some(_)) => Err(AppError::Forbidden),
        (Some(_), None) => Err(AppError::Unauthorized),
        (None, _) => match (card.device_id.as_deref(), device_id) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(AppError::Forbidden),
        },
    }
}

fn load_card(txn: &ReadTransaction, id: u64) -> Result<BusinessCard, AppError> {
    let table = txn.open_table(TABLE_CARDS)?;
    let card = decode(table.get(id)?)?.ok_or(AppError::NotFound("Business card"))?;
    Ok(card)
}

fn scan_cards(
    txn: &ReadTransaction,
    keep: impl Fn(&BusinessCard) -> bool,
) -> Result<Vec<BusinessCard>, AppError> {
    let table = txn.open_table(TABLE_CARDS)?;
    let mut cards = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let card: BusinessCard = serde_json::from_str(value.value())?;
        if keep(&card) {
            cards.push(card);
        }
    }
    Ok(cards)
}

pub(crate) fn card_exists(txn: &WriteTransaction, id: u64) -> Result<bool, AppError> {
    let table = txn.open_table(TABLE_CARDS)?;
    let exists = table.get(id)?.is_some();
    Ok(exists)
}

pub(crate) fn insert_card(txn: &WriteTransaction, new: NewCard) -> Result<BusinessCard, AppError> {
    let id = next_id(txn, CARD_SEQUENCE)?;
    let now = Utc::now();
    let card = BusinessCard {
        id,
        user_id: new.user_id,
        device_id: new.device_id.filter(|d| !d.is_empty()),
        is_template: new.is_template,
        fields: new.fields,
        created_at: now,
        updated_at: now,
    };

    let mut table = txn.open_table(TABLE_CARDS)?;
    table.insert(id, serde_json::to_string(&card)?.as_str())?;

    if let Some(owner) = card.user_id {
        let mut owners = txn.open_table(TABLE_OWNER_CARDS)?;
        owners.insert(index_key(owner, id).as_str(), id)?;
    }
    if let Some(device_id) = &card.device_id {
        let mut devices = txn.open_table(TABLE_DEVICE_CARDS)?;
        devices.insert(device_id.as_str(), id)?;
    }

    Ok(card)
}

/// Removes a card, its index entries and its links inside `txn`
pub(crate) fn delete_card(txn: &WriteTransaction, id: u64) -> Result<usize, AppError> {
    let mut table = txn.open_table(TABLE_CARDS)?;
    let card: BusinessCard = decode(table.remove(id)?)?.ok_or(AppError::NotFound("Business card"))?;
    drop(table);

    if let Some(owner) = card.user_id {
        let mut owners = txn.open_table(TABLE_OWNER_CARDS)?;
        owners.remove(index_key(owner, id).as_str())?;
    }
    if let Some(device_id) = &card.device_id {
        let mut devices = txn.open_table(TABLE_DEVICE_CARDS)?;
        // A newer card may have taken over the device entry
        let points_here = devices.get(device_id.as_str())?.map(|c| c.value()) == Some(id);
        if points_here {
            devices.remove(device_id.as_str())?;
        }
    }

    links::remove_card_links(txn, id)
}
