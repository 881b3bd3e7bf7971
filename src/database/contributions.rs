//! Contribution Repository
//!
//! Rows live in one table per data type (see `DataType::table_name`). Table
//! names come from that fixed set only, never from input.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::database::WriteError;
use crate::models::{Contribution, DataType, ProcessingMethod, SellableRecord};

const COLUMNS: &str = "id, user_id, wallet_address, data, sellable_data, processing_method, \
                       proof_id, record_count, points_awarded, created_at, updated_at";

pub struct ContributionRepository {
    pool: PgPool,
}

fn contribution_from_row(row: &PgRow, data_type: DataType) -> Result<Contribution, String> {
    let sellable: Option<serde_json::Value> = row.get("sellable_data");
    let sellable_data = sellable
        .map(serde_json::from_value::<SellableRecord>)
        .transpose()
        .map_err(|e| format!("Failed to decode sellable data: {}", e))?;
    let processing_method: String = row.get("processing_method");
    let record_count: i64 = row.get("record_count");
    let points_awarded: i32 = row.get("points_awarded");

    Ok(Contribution {
        id: row.get("id"),
        user_id: row.get("user_id"),
        wallet_address: row.get("wallet_address"),
        data_type,
        data: row.get("data"),
        sellable_data,
        processing_method: ProcessingMethod::parse(&processing_method),
        proof_id: row.get("proof_id"),
        record_count: record_count.max(0) as u64,
        points_awarded: points_awarded.max(0) as u32,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl ContributionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fails with [`WriteError::Conflict`] when the proof id is already stored
    pub async fn insert(&self, contribution: &Contribution) -> Result<(), WriteError> {
        let sellable = contribution
            .sellable_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| WriteError::Failed(format!("Failed to encode sellable data: {}", e)))?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            contribution.data_type.table_name(),
            COLUMNS
        );

        sqlx::query(&sql)
            .bind(&contribution.id)
            .bind(&contribution.user_id)
            .bind(&contribution.wallet_address)
            .bind(&contribution.data)
            .bind(sellable)
            .bind(contribution.processing_method.as_str())
            .bind(&contribution.proof_id)
            .bind(contribution.record_count as i64)
            .bind(contribution.points_awarded as i32)
            .bind(contribution.created_at)
            .bind(contribution.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| WriteError::from_sqlx("Failed to insert contribution", e))?;

        Ok(())
    }

    /// All of a user's contributions across data types, newest first
    pub async fn by_user(&self, user_id: &str) -> Result<Vec<Contribution>, String> {
        let mut contributions = Vec::new();

        for data_type in DataType::ALL {
            let sql = format!(
                "SELECT {} FROM {} WHERE user_id = $1",
                COLUMNS,
                data_type.table_name()
            );
            let rows = sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| format!("Failed to get contributions: {}", e))?;

            for row in &rows {
                contributions.push(contribution_from_row(row, data_type)?);
            }
        }

        contributions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contributions)
    }

    pub async fn update_sellable(
        &self,
        contribution_id: &str,
        data_type: DataType,
        record: &SellableRecord,
    ) -> Result<(), String> {
        let body = serde_json::to_value(record)
            .map_err(|e| format!("Failed to encode sellable data: {}", e))?;
        let sql = format!(
            "UPDATE {} SET sellable_data = $2, updated_at = $3 WHERE id = $1",
            data_type.table_name()
        );
        let now: DateTime<Utc> = Utc::now();

        let result = sqlx::query(&sql)
            .bind(contribution_id)
            .bind(body)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to update sellable data: {}", e))?;

        if result.rows_affected() == 0 {
            return Err(format!("Contribution not found: {}", contribution_id));
        }
        Ok(())
    }

    /// Newest sellable records, optionally of one data type
    pub async fn sellable_records(
        &self,
        data_type: Option<DataType>,
        limit: usize,
    ) -> Result<Vec<SellableRecord>, String> {
        let types: Vec<DataType> = match data_type {
            Some(dt) => vec![dt],
            None => DataType::ALL.to_vec(),
        };

        let mut records: Vec<(DateTime<Utc>, SellableRecord)> = Vec::new();
        for data_type in types {
            let sql = format!(
                "SELECT sellable_data, created_at FROM {} WHERE sellable_data IS NOT NULL \
                 ORDER BY created_at DESC LIMIT $1",
                data_type.table_name()
            );
            let rows = sqlx::query(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| format!("Failed to get sellable records: {}", e))?;

            for row in &rows {
                let body: serde_json::Value = row.get("sellable_data");
                let record = serde_json::from_value(body)
                    .map_err(|e| format!("Failed to decode sellable data: {}", e))?;
                records.push((row.get("created_at"), record));
            }
        }

        records.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(records.into_iter().take(limit).map(|(_, record)| record).collect())
    }

    pub async fn count(&self, data_type: DataType) -> Result<u64, String> {
        let sql = format!("SELECT COUNT(*) AS total FROM {}", data_type.table_name());
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count contributions: {}", e))?;

        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    pub async fn count_since(&self, data_type: DataType, since: DateTime<Utc>) -> Result<u64, String> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE created_at > $1",
            data_type.table_name()
        );
        let row = sqlx::query(&sql)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count recent contributions: {}", e))?;

        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    /// Newest-first page of one data type's contributions
    pub async fn newest(
        &self,
        data_type: DataType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Contribution>, String> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC OFFSET $1 LIMIT $2",
            COLUMNS,
            data_type.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(offset as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to page contributions: {}", e))?;

        rows.iter()
            .map(|row| contribution_from_row(row, data_type))
            .collect()
    }
}
