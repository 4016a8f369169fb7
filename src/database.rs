//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database, the table
//! layout, and the [`Store`] handle every component runs its transactions
//! through.
//!
//! Records are stored as JSON strings. Secondary access paths are explicit
//! index tables whose composite keys sort chronologically within a parent.

use std::sync::Arc;

use redb::{
    AccessGuard, Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition,
    WriteTransaction,
};
use serde::de::DeserializeOwned;
use tokio::task;

use crate::cards::CardStore;
use crate::claim::ClaimWorkflow;
use crate::config::Config;
use crate::error::AppError;
use crate::links::LinkRegistry;
use crate::token::{RandomTokens, TokenGenerator};
use crate::users::UserStore;

/// Key: user id. Value: JSON `User`
pub const TABLE_USERS: TableDefinition<u64, &str> = TableDefinition::new("users_v1");

/// Key: username. Value: user id
pub const TABLE_USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames_v1");

/// Key: lowercased email. Value: user id
pub const TABLE_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("emails_v1");

/// Key: session token. Value: JSON `Session`
pub const TABLE_SESSIONS: TableDefinition<&str, &str> = TableDefinition::new("sessions_v1");

/// Key: "{user_id}:{token}". Value: session token
pub const TABLE_USER_SESSIONS: TableDefinition<&str, &str> =
    TableDefinition::new("user_sessions_v1");

/// Key: card id. Value: JSON `BusinessCard`
pub const TABLE_CARDS: TableDefinition<u64, &str> = TableDefinition::new("business_cards_v1");

/// Key: "{user_id}:{card_id}". Value: card id
pub const TABLE_OWNER_CARDS: TableDefinition<&str, u64> = TableDefinition::new("owner_cards_v1");

/// Key: device id. Value: id of the device's card
pub const TABLE_DEVICE_CARDS: TableDefinition<&str, u64> = TableDefinition::new("device_cards_v1");

/// Key: slug. Value: JSON `PublicLink`
///
/// Keying links by slug makes slug uniqueness a property of the table.
pub const TABLE_LINKS: TableDefinition<&str, &str> = TableDefinition::new("public_links_v1");

/// Key: link id. Value: slug
pub const TABLE_LINK_IDS: TableDefinition<u64, &str> = TableDefinition::new("public_link_ids_v1");

/// Key: "{card_id}:{link_id}". Value: slug
///
/// Drives listing a card's links and the card-to-link cascade on delete.
pub const TABLE_CARD_LINKS: TableDefinition<&str, &str> = TableDefinition::new("card_links_v1");

/// Key: sequence name. Value: last id handed out
pub const TABLE_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences_v1");

/// Initializes the embedded database and creates required tables
///
/// # Example
///
/// ```no_run
/// # use cardfolio::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_USERS)?;
        write_txn.open_table(TABLE_USERNAMES)?;
        write_txn.open_table(TABLE_EMAILS)?;
        write_txn.open_table(TABLE_SESSIONS)?;
        write_txn.open_table(TABLE_USER_SESSIONS)?;
        write_txn.open_table(TABLE_CARDS)?;
        write_txn.open_table(TABLE_OWNER_CARDS)?;
        write_txn.open_table(TABLE_DEVICE_CARDS)?;
        write_txn.open_table(TABLE_LINKS)?;
        write_txn.open_table(TABLE_LINK_IDS)?;
        write_txn.open_table(TABLE_CARD_LINKS)?;
        write_txn.open_table(TABLE_SEQUENCES)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Shared handle to the database
///
/// Each call to [`Store::read`] or [`Store::write`] is one transaction run on
/// the blocking pool. redb allows a single writer at a time, so a write
/// closure observes and mutates the tables without interleaving.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub async fn read<T, F>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&ReadTransaction) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let txn = db.begin_read()?;
            op(&txn)
        })
        .await?
    }

    /// Runs `op` in a write transaction, committing only if it succeeds
    pub async fn write<T, F>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&WriteTransaction) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let txn = db.begin_write()?;
            let out = op(&txn)?;
            txn.commit()?;
            Ok(out)
        })
        .await?
    }
}

/// Decodes an optional JSON record fetched from a table
pub(crate) fn decode<T: DeserializeOwned>(
    guard: Option<AccessGuard<'_, &'static str>>,
) -> Result<Option<T>, AppError> {
    guard
        .map(|value| serde_json::from_str(value.value()))
        .transpose()
        .map_err(AppError::from)
}

/// Hands out the next id of a named sequence
///
/// Must not be called while the caller holds `TABLE_SEQUENCES` open.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, AppError> {
    let mut table = txn.open_table(TABLE_SEQUENCES)?;
    let next = table.get(sequence)?.map(|last| last.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

/// Composite index key; zero padding keeps numeric order lexicographic
pub(crate) fn index_key(parent: u64, child: u64) -> String {
    format!("{:020}:{:020}", parent, child)
}

/// Range bounds covering every index key under `parent`
///
/// '{' sorts after ':' so the end bound sits just past the last child.
pub(crate) fn index_range(parent: u64) -> (String, String) {
    (format!("{:020}:", parent), format!("{:020}:{{", parent))
}

/// Application state shared across all request handlers
///
/// Built once by the entry point; components receive the same [`Store`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: UserStore,
    pub cards: CardStore,
    pub links: LinkRegistry,
    pub claims: ClaimWorkflow,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self::with_tokens(db, config, Arc::new(RandomTokens))
    }

    pub fn with_tokens(db: Database, config: Config, tokens: Arc<dyn TokenGenerator>) -> Self {
        let store = Store::new(db);
        let users = UserStore::new(store.clone(), config.session_ttl_hours);
        let cards = CardStore::new(store.clone());
        let links = LinkRegistry::new(store, Arc::clone(&tokens));
        let claims = ClaimWorkflow::new(cards.clone(), links.clone(), tokens);

        Self {
            config: Arc::new(config),
            users,
            cards,
            links,
            claims,
        }
    }
}
