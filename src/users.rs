//! Accounts and sessions
//!
//! Usernames and emails are unique through their index tables. Sessions are
//! random tokens stored server-side with an expiry.

use chrono::{Duration, Utc};
use redb::{ReadableTable, WriteTransaction};
use tokio::task;

use crate::cards;
use crate::database::{
    decode, index_range, next_id, Store, TABLE_EMAILS, TABLE_OWNER_CARDS, TABLE_SESSIONS,
    TABLE_USERNAMES, TABLE_USERS, TABLE_USER_SESSIONS,
};
use crate::error::AppError;
use crate::model::{Role, Session, User, UserIdentity};
use crate::password;
use crate::token::random_token;

const USER_SEQUENCE: &str = "users";
const SESSION_TOKEN_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct UserStore {
    store: Store,
    session_ttl: Duration,
}

impl UserStore {
    pub fn new(store: Store, session_ttl_hours: i64) -> Self {
        Self {
            store,
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        self.create(username, email, password, Role::User).await
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let username = username.trim().to_string();
        let email = email.trim().to_lowercase();
        validate_username(&username)?;
        if !email.contains('@') {
            return Err(AppError::invalid("Invalid email address"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::invalid(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password = password.to_string();
        let password_hash = task::spawn_blocking(move || password::hash(&password)).await??;

        let user = self
            .store
            .write(move |txn| {
                let mut usernames = txn.open_table(TABLE_USERNAMES)?;
                if usernames.get(username.as_str())?.is_some() {
                    return Err(AppError::Conflict("Username"));
                }
                let mut emails = txn.open_table(TABLE_EMAILS)?;
                if emails.get(email.as_str())?.is_some() {
                    return Err(AppError::Conflict("Email"));
                }

                let user = User {
                    id: next_id(txn, USER_SEQUENCE)?,
                    username,
                    email,
                    password_hash,
                    role,
                    created_at: Utc::now(),
                };
                usernames.insert(user.username.as_str(), user.id)?;
                emails.insert(user.email.as_str(), user.id)?;
                let mut users = txn.open_table(TABLE_USERS)?;
                users.insert(user.id, serde_json::to_string(&user)?.as_str())?;
                Ok(user)
            })
            .await?;

        tracing::info!(
            user_id = user.id,
            username = %user.username,
            role = ?user.role,
            "user created"
        );
        Ok(user)
    }

    /// Creates the bootstrap admin unless the username is already taken
    ///
    /// Returns whether an account was created.
    pub async fn ensure_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, AppError> {
        match self.create(username, email, password, Role::Admin).await {
            Ok(_) => Ok(true),
            Err(AppError::Conflict("Username")) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Verifies credentials; unknown users and bad passwords look the same
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError> {
        let name = username.trim().to_string();
        let user = self
            .store
            .read(move |txn| {
                let usernames = txn.open_table(TABLE_USERNAMES)?;
                let id = usernames.get(name.as_str())?.map(|id| id.value());
                let user: Option<User> = match id {
                    Some(id) => decode(txn.open_table(TABLE_USERS)?.get(id)?)?,
                    None => None,
                };
                Ok(user)
            })
            .await?
            .ok_or(AppError::Unauthorized)?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = task::spawn_blocking(move || password::verify(&password, &hash)).await??;
        if !valid {
            tracing::debug!(username = %user.username, "rejected login");
            return Err(AppError::Unauthorized);
        }
        Ok(user)
    }

    pub async fn get(&self, id: u64) -> Result<User, AppError> {
        self.store
            .read(move |txn| {
                let table = txn.open_table(TABLE_USERS)?;
                let user = decode(table.get(id)?)?.ok_or(AppError::NotFound("User"))?;
                Ok(user)
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        self.store
            .read(|txn| {
                let table = txn.open_table(TABLE_USERS)?;
                let mut users = Vec::new();
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    let user: User = serde_json::from_str(value.value())?;
                    users.push(user);
                }
                Ok(users)
            })
            .await
    }

    pub async fn set_role(&self, id: u64, role: Role) -> Result<User, AppError> {
        let user = self
            .store
            .write(move |txn| {
                let mut table = txn.open_table(TABLE_USERS)?;
                let mut user: User = decode(table.get(id)?)?.ok_or(AppError::NotFound("User"))?;
                user.role = role;
                table.insert(id, serde_json::to_string(&user)?.as_str())?;
                Ok(user)
            })
            .await?;

        tracing::info!(user_id = id, role = ?role, "user role changed");
        Ok(user)
    }

    /// Deletes an account together with its cards, their links and its sessions
    pub async fn delete(&self, id: u64) -> Result<(), AppError> {
        let cards_removed = self
            .store
            .write(move |txn| {
                let user: User = {
                    let mut users = txn.open_table(TABLE_USERS)?;
                    let removed = decode(users.remove(id)?)?.ok_or(AppError::NotFound("User"))?;
                    removed
                };
                txn.open_table(TABLE_USERNAMES)?
                    .remove(user.username.as_str())?;
                txn.open_table(TABLE_EMAILS)?.remove(user.email.as_str())?;

                let card_ids = owned_card_ids(txn, id)?;
                for card_id in &card_ids {
                    cards::delete_card(txn, *card_id)?;
                }
                remove_sessions(txn, id, |_| true)?;
                Ok(card_ids.len())
            })
            .await?;

        tracing::info!(user_id = id, cards_removed, "user deleted");
        Ok(())
    }

    /// Opens a session for `user_id` and returns its token
    ///
    /// Sessions of the same user that have already expired are dropped.
    pub async fn create_session(&self, user_id: u64) -> Result<String, AppError> {
        let token = random_token(SESSION_TOKEN_LEN);
        let now = Utc::now();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        let key = token.clone();
        let swept = self
            .store
            .write(move |txn| {
                let swept = remove_sessions(txn, user_id, |s| s.expires_at <= now)?;

                let mut table = txn.open_table(TABLE_SESSIONS)?;
                table.insert(key.as_str(), serde_json::to_string(&session)?.as_str())?;
                let mut index = txn.open_table(TABLE_USER_SESSIONS)?;
                index.insert(session_key(user_id, &key).as_str(), key.as_str())?;
                Ok(swept)
            })
            .await?;

        if swept > 0 {
            tracing::debug!(user_id, swept, "expired sessions removed");
        }
        Ok(token)
    }

    /// Identity behind a session token; `None` when unknown or expired
    ///
    /// An expired session is deleted on sight.
    pub async fn session_identity(&self, token: &str) -> Result<Option<UserIdentity>, AppError> {
        let key = token.to_string();
        let lookup = self
            .store
            .read(move |txn| {
                let sessions = txn.open_table(TABLE_SESSIONS)?;
                let session: Option<Session> = decode(sessions.get(key.as_str())?)?;
                let Some(session) = session else {
                    return Ok(SessionLookup::Missing);
                };
                if session.expires_at <= Utc::now() {
                    return Ok(SessionLookup::Expired);
                }

                let users = txn.open_table(TABLE_USERS)?;
                let user: Option<User> = decode(users.get(session.user_id)?)?;
                Ok(match user {
                    Some(user) => SessionLookup::Active(UserIdentity::from(&user)),
                    None => SessionLookup::Missing,
                })
            })
            .await?;

        match lookup {
            SessionLookup::Active(identity) => Ok(Some(identity)),
            SessionLookup::Missing => Ok(None),
            SessionLookup::Expired => {
                if let Err(err) = self.end_session(token).await {
                    tracing::warn!(error = %err, "failed to remove expired session");
                }
                Ok(None)
            }
        }
    }

    pub async fn end_session(&self, token: &str) -> Result<(), AppError> {
        let token = token.to_string();
        self.store
            .write(move |txn| delete_session(txn, &token))
            .await
    }
}

enum SessionLookup {
    Active(UserIdentity),
    Expired,
    Missing,
}

fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(3..=32).contains(&len) || !allowed {
        return Err(AppError::invalid(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'",
        ));
    }
    Ok(())
}

fn owned_card_ids(txn: &WriteTransaction, user_id: u64) -> Result<Vec<u64>, AppError> {
    let index = txn.open_table(TABLE_OWNER_CARDS)?;
    let (start, end) = index_range(user_id);
    let mut ids = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())? {
        let (_, card_id) = entry?;
        ids.push(card_id.value());
    }
    Ok(ids)
}

fn session_key(user_id: u64, token: &str) -> String {
    format!("{:020}:{}", user_id, token)
}

fn delete_session(txn: &WriteTransaction, token: &str) -> Result<(), AppError> {
    let mut table = txn.open_table(TABLE_SESSIONS)?;
    let session: Option<Session> = decode(table.remove(token)?)?;
    drop(table);

    if let Some(session) = session {
        let mut index = txn.open_table(TABLE_USER_SESSIONS)?;
        index.remove(session_key(session.user_id, token).as_str())?;
    }
    Ok(())
}

/// Deletes the sessions of `user_id` matching `doomed`; returns how many
fn remove_sessions(
    txn: &WriteTransaction,
    user_id: u64,
    doomed: impl Fn(&Session) -> bool,
) -> Result<usize, AppError> {
    let (start, end) = index_range(user_id);
    let mut tokens = Vec::new();
    {
        let index = txn.open_table(TABLE_USER_SESSIONS)?;
        for entry in index.range(start.as_str()..end.as_str())? {
            let (_, token) = entry?;
            tokens.push(token.value().to_string());
        }
    }

    let mut table = txn.open_table(TABLE_SESSIONS)?;
    let mut index = txn.open_table(TABLE_USER_SESSIONS)?;
    let mut removed = 0;
    for token in tokens {
        let session: Option<Session> = decode(table.get(token.as_str())?)?;
        if session.as_ref().map_or(true, &doomed) {
            table.remove(token.as_str())?;
            index.remove(session_key(user_id, &token).as_str())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use redb::{Database, ReadableTableMetadata};
    use tempfile::NamedTempFile;

    use super::*;
    use crate::database::init_db;

    fn setup(ttl_hours: i64) -> (UserStore, Store, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let db: Database = init_db(temp_db.path().to_str().unwrap()).unwrap();
        let store = Store::new(db);
        (UserStore::new(store.clone(), ttl_hours), store, temp_db)
    }

    async fn session_rows(store: &Store) -> (u64, u64) {
        store
            .read(|txn| {
                let sessions = txn.open_table(TABLE_SESSIONS)?.len()?;
                let index = txn.open_table(TABLE_USER_SESSIONS)?.len()?;
                Ok((sessions, index))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn expired_session_is_deleted_on_lookup() {
        let (users, store, _temp_db) = setup(-1);
        let token = users.create_session(1).await.unwrap();
        assert_eq!(session_rows(&store).await, (1, 1));

        assert!(users.session_identity(&token).await.unwrap().is_none());
        assert_eq!(session_rows(&store).await, (0, 0));
    }

    #[tokio::test]
    async fn new_session_sweeps_expired_ones() {
        let (expired, store, _temp_db) = setup(-1);
        expired.create_session(1).await.unwrap();
        expired.create_session(2).await.unwrap();

        let users = UserStore::new(store.clone(), 1);
        users.create_session(1).await.unwrap();

        // User 2's stale session is only swept on its own next login
        assert_eq!(session_rows(&store).await, (2, 2));
        users.create_session(2).await.unwrap();
        assert_eq!(session_rows(&store).await, (2, 2));
    }

    #[tokio::test]
    async fn ending_sessions_clears_the_user_index() {
        let (users, store, _temp_db) = setup(1);
        let first = users.create_session(3).await.unwrap();
        users.create_session(3).await.unwrap();
        users.create_session(4).await.unwrap();

        users.end_session(&first).await.unwrap();
        assert_eq!(session_rows(&store).await, (2, 2));

        store
            .write(|txn| remove_sessions(txn, 3, |_| true).map(|_| ()))
            .await
            .unwrap();
        assert_eq!(session_rows(&store).await, (1, 1));
        assert!(users.session_identity(&first).await.unwrap().is_none());
    }
}
