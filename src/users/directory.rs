use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::account::{validate_username, UserAccount, UsernameError};
use crate::database::pool::DatabasePool;

/// Wallet-keyed user accounts
pub struct UserDirectory {
    db: Option<Arc<DatabasePool>>,
    users: DashMap<String, UserAccount>,
    /// wallet -> user id
    wallets: DashMap<String, String>,
    /// lowercased username -> user id
    usernames: DashMap<String, String>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            db: None,
            users: DashMap::new(),
            wallets: DashMap::new(),
            usernames: DashMap::new(),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Existing account for `wallet`, or a fresh one. The flag is true when
    /// the account was created by this call.
    pub async fn get_or_create(&self, wallet: &str) -> Result<(UserAccount, bool), String> {
        let wallet = wallet.to_lowercase();

        if let Some(ref db) = self.db {
            let candidate = UserAccount::new(wallet.clone());
            let created = db.users().insert_if_absent(&candidate).await?;
            let user = db
                .users()
                .get_by_wallet(&wallet)
                .await?
                .ok_or_else(|| format!("User for wallet {} vanished after insert", wallet))?;
            if created {
                info!(user_id = %user.id, "New user created");
            }
            return Ok((user, created));
        }

        match self.wallets.entry(wallet.clone()) {
            Entry::Occupied(entry) => {
                let user_id = entry.get().clone();
                drop(entry);
                self.users
                    .get(&user_id)
                    .map(|user| (user.value().clone(), false))
                    .ok_or_else(|| format!("Wallet index points at missing user {}", user_id))
            }
            Entry::Vacant(entry) => {
                let user = UserAccount::new(wallet);
                self.users.insert(user.id.clone(), user.clone());
                entry.insert(user.id.clone());
                info!(user_id = %user.id, "New user created");
                Ok((user, true))
            }
        }
    }

    pub async fn get_by_wallet(&self, wallet: &str) -> Result<Option<UserAccount>, String> {
        let wallet = wallet.to_lowercase();

        match self.db {
            Some(ref db) => db.users().get_by_wallet(&wallet).await,
            None => {
                let user_id = match self.wallets.get(&wallet) {
                    Some(id) => id.value().clone(),
                    None => return Ok(None),
                };
                Ok(self.users.get(&user_id).map(|user| user.value().clone()))
            }
        }
    }

    pub async fn get_by_id(&self, user_id: &str) -> Result<Option<UserAccount>, String> {
        match self.db {
            Some(ref db) => db.users().get_by_id(user_id).await,
            None => Ok(self.users.get(user_id).map(|user| user.value().clone())),
        }
    }

    /// Claim a unique username (case-insensitive) for `user_id`
    pub async fn set_username(&self, user_id: &str, username: &str) -> Result<UserAccount, UsernameError> {
        validate_username(username)?;

        if let Some(ref db) = self.db {
            let users = db.users();
            if users
                .username_taken(username, user_id)
                .await
                .map_err(UsernameError::Store)?
            {
                return Err(UsernameError::Taken);
            }
            return users
                .set_username(user_id, username)
                .await?
                .ok_or(UsernameError::UnknownUser);
        }

        if !self.users.contains_key(user_id) {
            return Err(UsernameError::UnknownUser);
        }

        let claimed = username.to_lowercase();
        match self.usernames.entry(claimed.clone()) {
            Entry::Occupied(entry) if entry.get() != user_id => return Err(UsernameError::Taken),
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(user_id.to_string());
            }
        }

        let mut user = self.users.get_mut(user_id).ok_or(UsernameError::UnknownUser)?;
        if let Some(previous) = user.username.replace(username.to_string()) {
            let previous = previous.to_lowercase();
            if previous != claimed {
                self.usernames.remove(&previous);
            }
        }
        user.last_active_at = Utc::now();

        debug!(user_id = %user_id, "Username set");
        Ok(user.clone())
    }

    /// Add awarded points, bump the contribution count and stamp activity
    pub async fn record_contribution(&self, user_id: &str, points: u32) -> Result<UserAccount, String> {
        let now = Utc::now();

        match self.db {
            Some(ref db) => db
                .users()
                .record_contribution(user_id, points, now)
                .await?
                .ok_or_else(|| format!("User not found: {}", user_id)),
            None => {
                let mut user = self
                    .users
                    .get_mut(user_id)
                    .ok_or_else(|| format!("User not found: {}", user_id))?;
                user.add_contribution(points, now);
                Ok(user.clone())
            }
        }
    }

    pub async fn touch(&self, user_id: &str) -> Result<(), String> {
        let now = Utc::now();

        match self.db {
            Some(ref db) => db.users().touch(user_id, now).await,
            None => {
                if let Some(mut user) = self.users.get_mut(user_id) {
                    user.last_active_at = now;
                }
                Ok(())
            }
        }
    }

    /// Top `limit` users by points, oldest account first on ties
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<UserAccount>, String> {
        if let Some(ref db) = self.db {
            return db.users().leaderboard(limit).await;
        }

        let mut users: Vec<UserAccount> = self.users.iter().map(|user| user.value().clone()).collect();
        users.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        users.truncate(limit);
        Ok(users)
    }

    pub async fn count(&self) -> Result<u64, String> {
        match self.db {
            Some(ref db) => db.users().count().await,
            None => Ok(self.users.len() as u64),
        }
    }

    pub async fn total_points(&self) -> Result<u64, String> {
        match self.db {
            Some(ref db) => db.users().total_points().await,
            None => Ok(self.users.iter().map(|user| user.total_points).sum()),
        }
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::League;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let directory = UserDirectory::new();
        let (first, created) = directory.get_or_create("0xABCDEF").await.unwrap();
        assert!(created);

        let (second, created) = directory.get_or_create("0xabcdef").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.wallet_address, "0xabcdef");
    }

    #[tokio::test]
    async fn test_username_uniqueness() {
        let directory = UserDirectory::new();
        let (alice, _) = directory.get_or_create("0x01").await.unwrap();
        let (bob, _) = directory.get_or_create("0x02").await.unwrap();

        directory.set_username(&alice.id, "Alice_1").await.unwrap();
        assert_eq!(
            directory.set_username(&bob.id, "alice_1").await,
            Err(UsernameError::Taken)
        );

        // Renaming releases the old name
        directory.set_username(&alice.id, "alice_2").await.unwrap();
        let bob = directory.set_username(&bob.id, "alice_1").await.unwrap();
        assert_eq!(bob.username.as_deref(), Some("alice_1"));

        assert_eq!(
            directory.set_username("user_missing", "nobody").await,
            Err(UsernameError::UnknownUser)
        );
    }

    #[tokio::test]
    async fn test_record_contribution_and_leaderboard() {
        let directory = UserDirectory::new();
        let (low, _) = directory.get_or_create("0x01").await.unwrap();
        let (high, _) = directory.get_or_create("0x02").await.unwrap();

        directory.record_contribution(&low.id, 10).await.unwrap();
        for _ in 0..7 {
            directory.record_contribution(&high.id, 30).await.unwrap();
        }

        let high = directory.get_by_id(&high.id).await.unwrap().unwrap();
        assert_eq!(high.total_points, 210);
        assert_eq!(high.league, League::Silver);
        assert_eq!(high.contributions_count, 7);

        let board = directory.leaderboard(10).await.unwrap();
        assert_eq!(board[0].id, high.id);
        assert_eq!(board[1].id, low.id);
        assert_eq!(directory.leaderboard(1).await.unwrap().len(), 1);
        assert!(directory.record_contribution("user_missing", 10).await.is_err());
    }
}
