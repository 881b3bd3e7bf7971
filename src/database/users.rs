//! User Repository

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::database::WriteError;
use crate::rewards::calculate_league;
use crate::users::UserAccount;

const COLUMNS: &str = "id, wallet_address, username, total_points, contributions_count, \
                       created_at, last_active_at, last_contribution_at";

pub struct UserRepository {
    pool: PgPool,
}

fn user_from_row(row: &PgRow) -> UserAccount {
    let total_points: i64 = row.get("total_points");
    let contributions_count: i64 = row.get("contributions_count");
    let total_points = total_points.max(0) as u64;

    UserAccount {
        id: row.get("id"),
        wallet_address: row.get("wallet_address"),
        username: row.get("username"),
        total_points,
        league: calculate_league(total_points),
        contributions_count: contributions_count.max(0) as u64,
        created_at: row.get("created_at"),
        last_active_at: row.get("last_active_at"),
        last_contribution_at: row.get("last_contribution_at"),
    }
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns true when the row was inserted, false when the wallet already existed
    pub async fn insert_if_absent(&self, user: &UserAccount) -> Result<bool, String> {
        let result = sqlx::query(r#"
            INSERT INTO users (id, wallet_address, created_at, last_active_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (wallet_address) DO UPDATE SET last_active_at = EXCLUDED.last_active_at
            RETURNING (xmax = 0) AS inserted
        "#)
        .bind(&user.id)
        .bind(&user.wallet_address)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert user: {}", e))?;

        Ok(result.get("inserted"))
    }

    pub async fn get_by_wallet(&self, wallet: &str) -> Result<Option<UserAccount>, String> {
        let sql = format!("SELECT {} FROM users WHERE wallet_address = $1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(wallet)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get user by wallet: {}", e))?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn get_by_id(&self, user_id: &str) -> Result<Option<UserAccount>, String> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get user: {}", e))?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Whether another user already holds `username` (case-insensitive)
    pub async fn username_taken(&self, username: &str, except_user_id: &str) -> Result<bool, String> {
        let row = sqlx::query(r#"
            SELECT EXISTS(
                SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) AND id <> $2
            ) AS taken
        "#)
        .bind(username)
        .bind(except_user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| format!("Failed to check username: {}", e))?;

        Ok(row.get("taken"))
    }

    /// Fails with [`WriteError::Conflict`] when another user holds the name
    pub async fn set_username(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<Option<UserAccount>, WriteError> {
        let sql = format!(
            "UPDATE users SET username = $2, last_active_at = NOW() WHERE id = $1 RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WriteError::from_sqlx("Failed to set username", e))?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn record_contribution(
        &self,
        user_id: &str,
        points: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<UserAccount>, String> {
        let sql = format!(
            r#"UPDATE users SET
                   total_points = total_points + $2,
                   contributions_count = contributions_count + 1,
                   last_contribution_at = $3,
                   last_active_at = $3
               WHERE id = $1
               RETURNING {}"#,
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::from(points))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to update user stats: {}", e))?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn touch(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), String> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to touch user: {}", e))?;

        Ok(())
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<UserAccount>, String> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY total_points DESC, created_at ASC LIMIT $1",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to get leaderboard: {}", e))?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn count(&self) -> Result<u64, String> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count users: {}", e))?;

        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    /// Sum of every user's points
    pub async fn total_points(&self) -> Result<u64, String> {
        let row = sqlx::query("SELECT COALESCE(SUM(total_points), 0)::BIGINT AS total FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to sum user points: {}", e))?;

        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }
}
