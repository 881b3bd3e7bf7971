//! Cohort Repository - atomic membership counters

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;

use crate::cohort::CohortRecord;

pub struct CohortRepository {
    pool: PgPool,
}

fn record_from_row(row: &PgRow) -> CohortRecord {
    let count: i64 = row.get("count");
    CohortRecord {
        count: count.max(0) as u64,
        created_at: row.get("created_at"),
        last_updated_at: row.get("last_updated_at"),
        compliant: row.get("compliant"),
        first_compliant_at: row.get("first_compliant_at"),
    }
}

impl CohortRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count one member in a single statement. Returns the updated record and
    /// whether this increment made the cohort compliant.
    pub async fn increment(
        &self,
        cohort_id: &str,
        k_threshold: u64,
        now: DateTime<Utc>,
    ) -> Result<(CohortRecord, bool), String> {
        let row = sqlx::query(r#"
            INSERT INTO cohorts (cohort_id, count, created_at, last_updated_at, compliant, first_compliant_at)
            VALUES ($1, 1, $3, $3, 1 >= $2, CASE WHEN 1 >= $2 THEN $3 ELSE NULL END)
            ON CONFLICT (cohort_id) DO UPDATE SET
                count = cohorts.count + 1,
                last_updated_at = EXCLUDED.last_updated_at,
                compliant = cohorts.count + 1 >= $2,
                first_compliant_at = CASE
                    WHEN cohorts.first_compliant_at IS NULL AND cohorts.count + 1 >= $2
                        THEN EXCLUDED.last_updated_at
                    ELSE cohorts.first_compliant_at
                END
            RETURNING count, created_at, last_updated_at, compliant, first_compliant_at,
                      (first_compliant_at IS NOT DISTINCT FROM last_updated_at AND compliant) AS became_compliant
        "#)
        .bind(cohort_id)
        .bind(k_threshold as i64)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| format!("Failed to increment cohort: {}", e))?;

        let became_compliant: bool = row.get("became_compliant");
        Ok((record_from_row(&row), became_compliant))
    }

    pub async fn get(&self, cohort_id: &str) -> Result<Option<CohortRecord>, String> {
        let row = sqlx::query(r#"
            SELECT count, created_at, last_updated_at, compliant, first_compliant_at
            FROM cohorts
            WHERE cohort_id = $1
        "#)
        .bind(cohort_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to get cohort: {}", e))?;

        Ok(row.as_ref().map(record_from_row))
    }

    pub async fn list(&self) -> Result<BTreeMap<String, CohortRecord>, String> {
        let rows = sqlx::query(r#"
            SELECT cohort_id, count, created_at, last_updated_at, compliant, first_compliant_at
            FROM cohorts
        "#)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to list cohorts: {}", e))?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("cohort_id"), record_from_row(row)))
            .collect())
    }
}
