use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::database::WriteError;
use crate::rewards::{calculate_league, League};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: String,
    pub wallet_address: String,
    pub username: Option<String>,
    pub total_points: u64,
    /// Always `calculate_league(total_points)`
    pub league: League,
    pub contributions_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub last_contribution_at: Option<DateTime<Utc>>,
}

impl UserAccount {
    pub fn new(wallet_address: String) -> Self {
        let now = Utc::now();
        Self {
            id: format!("user_{}", Uuid::new_v4().simple()),
            wallet_address,
            username: None,
            total_points: 0,
            league: League::Bronze,
            contributions_count: 0,
            created_at: now,
            last_active_at: now,
            last_contribution_at: None,
        }
    }

    pub(crate) fn add_contribution(&mut self, points: u32, now: DateTime<Utc>) {
        self.total_points += u64::from(points);
        self.league = calculate_league(self.total_points);
        self.contributions_count += 1;
        self.last_contribution_at = Some(now);
        self.last_active_at = now;
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum UsernameError {
    #[error("Username must be at least 3 characters")]
    TooShort,
    #[error("Username must be at most 32 characters")]
    TooLong,
    #[error("Username can only contain letters, numbers, and underscores")]
    InvalidCharacters,
    #[error("Username already taken")]
    Taken,
    #[error("User not found")]
    UnknownUser,
    #[error("Failed to set username: {0}")]
    Store(String),
}

/// A unique-index conflict means another account claimed the name first
impl From<WriteError> for UsernameError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Conflict(_) => UsernameError::Taken,
            WriteError::Failed(detail) => UsernameError::Store(detail),
        }
    }
}

pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(UsernameError::TooShort);
    }
    if len > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong);
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(UsernameError::InvalidCharacters);
    }
    Ok(())
}
