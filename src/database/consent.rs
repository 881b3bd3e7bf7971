//! Consent Repository - append-only ledger rows
//!
//! The full entry is kept as JSONB; the columns beside it exist for lookups.
//! `seq` fixes the log order.

use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::consent::ConsentEntry;

pub struct ConsentRepository {
    pool: PgPool,
}

fn entry_from_row(row: &PgRow) -> Result<ConsentEntry, String> {
    let entry: serde_json::Value = row.get("entry");
    serde_json::from_value(entry).map_err(|e| format!("Failed to decode consent entry: {}", e))
}

impl ConsentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &ConsentEntry) -> Result<(), String> {
        let body = serde_json::to_value(entry)
            .map_err(|e| format!("Failed to encode consent entry: {}", e))?;

        sqlx::query(r#"
            INSERT INTO consent_entries (id, entry_timestamp, hashed_user_id, proof_id, entry)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(&entry.id)
        .bind(entry.timestamp)
        .bind(&entry.hashed_user_id)
        .bind(&entry.proof_id)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert consent entry: {}", e))?;

        Ok(())
    }

    pub async fn by_hashed_user(&self, hashed_user_id: &str) -> Result<Vec<ConsentEntry>, String> {
        let rows = sqlx::query("SELECT entry FROM consent_entries WHERE hashed_user_id = $1 ORDER BY seq")
            .bind(hashed_user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to get consent entries: {}", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn by_proof_id(&self, proof_id: &str) -> Result<Option<ConsentEntry>, String> {
        let row = sqlx::query("SELECT entry FROM consent_entries WHERE proof_id = $1 ORDER BY seq LIMIT 1")
            .bind(proof_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to get consent entry by proof: {}", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Whole ledger in append order
    pub async fn list(&self) -> Result<Vec<ConsentEntry>, String> {
        let rows = sqlx::query("SELECT entry FROM consent_entries ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to list consent entries: {}", e))?;

        rows.iter().map(entry_from_row).collect()
    }
}
