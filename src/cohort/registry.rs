use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::pool::DatabasePool;

/// Membership counter for one cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRecord {
    pub count: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Always `count >= k_threshold`
    pub compliant: bool,
    /// Stamped once, on the increment that reached k; never changed afterwards
    pub first_compliant_at: Option<DateTime<Utc>>,
}

impl CohortRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            created_at: now,
            last_updated_at: now,
            compliant: false,
            first_compliant_at: None,
        }
    }

    /// Add one member. Returns true when this increment made the cohort compliant.
    pub(crate) fn add_member(&mut self, k_threshold: u64, now: DateTime<Utc>) -> bool {
        let was_compliant = self.compliant;

        self.count += 1;
        self.last_updated_at = now;
        self.compliant = self.count >= k_threshold;

        if !was_compliant && self.compliant && self.first_compliant_at.is_none() {
            self.first_compliant_at = Some(now);
            return true;
        }

        false
    }
}

/// Registry-wide summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub total_cohorts: usize,
    pub total_profiles: u64,
    pub compliant_cohorts: usize,
    pub non_compliant_cohorts: usize,
    pub largest_cohort: Option<String>,
    pub largest_cohort_size: u64,
    pub smallest_cohort: Option<String>,
    pub smallest_cohort_size: u64,
    /// Rounded to one decimal; 0 when there are no cohorts
    pub average_cohort_size: f64,
}

impl CohortStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = (&'a String, &'a CohortRecord)>) -> Self {
        let mut stats = CohortStats {
            total_cohorts: 0,
            total_profiles: 0,
            compliant_cohorts: 0,
            non_compliant_cohorts: 0,
            largest_cohort: None,
            largest_cohort_size: 0,
            smallest_cohort: None,
            smallest_cohort_size: 0,
            average_cohort_size: 0.0,
        };

        for (cohort_id, record) in records {
            stats.total_cohorts += 1;
            stats.total_profiles += record.count;

            if record.compliant {
                stats.compliant_cohorts += 1;
            } else {
                stats.non_compliant_cohorts += 1;
            }

            if stats.largest_cohort.is_none() || record.count > stats.largest_cohort_size {
                stats.largest_cohort = Some(cohort_id.clone());
                stats.largest_cohort_size = record.count;
            }

            if stats.smallest_cohort.is_none() || record.count < stats.smallest_cohort_size {
                stats.smallest_cohort = Some(cohort_id.clone());
                stats.smallest_cohort_size = record.count;
            }
        }

        if stats.total_cohorts > 0 {
            let mean = stats.total_profiles as f64 / stats.total_cohorts as f64;
            stats.average_cohort_size = (mean * 10.0).round() / 10.0;
        }

        stats
    }
}

/// Per-cohort membership counters
///
/// Without a database the in-memory map is authoritative and each increment
/// runs under the map's shard lock for that key. With a database every
/// increment is a single atomic upsert and the map only mirrors results.
pub struct CohortRegistry {
    db: Option<Arc<DatabasePool>>,
    k_threshold: u64,
    cohorts: DashMap<String, CohortRecord>,
}

impl CohortRegistry {
    pub fn new(k_threshold: u64) -> Self {
        Self {
            db: None,
            k_threshold,
            cohorts: DashMap::new(),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn k_threshold(&self) -> u64 {
        self.k_threshold
    }

    /// Count one more member of `cohort_id`, creating the cohort if needed
    pub async fn increment(&self, cohort_id: &str) -> CohortRecord {
        let now = Utc::now();

        let (record, became_compliant) = match self.db {
            Some(ref db) => match db.cohorts().increment(cohort_id, self.k_threshold, now).await {
                Ok((record, became_compliant)) => {
                    self.cohorts.insert(cohort_id.to_string(), record.clone());
                    (record, became_compliant)
                }
                Err(e) => {
                    error!(cohort_id = %cohort_id, error = %e, "Cohort increment failed");
                    return CohortRecord::new(now);
                }
            },
            None => {
                let mut entry = self
                    .cohorts
                    .entry(cohort_id.to_string())
                    .or_insert_with(|| CohortRecord::new(now));
                let became_compliant = entry.add_member(self.k_threshold, now);
                (entry.clone(), became_compliant)
            }
        };

        if became_compliant {
            info!(
                cohort_id = %cohort_id,
                members = record.count,
                "Cohort is now k-anonymity compliant"
            );
        } else {
            debug!(cohort_id = %cohort_id, members = record.count, "Cohort incremented");
        }

        record
    }

    /// Member count, 0 for unknown cohorts
    pub async fn get_count(&self, cohort_id: &str) -> u64 {
        self.get_cohort(cohort_id)
            .await
            .map(|record| record.count)
            .unwrap_or(0)
    }

    pub async fn get_cohort(&self, cohort_id: &str) -> Option<CohortRecord> {
        match self.db {
            Some(ref db) => match db.cohorts().get(cohort_id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(cohort_id = %cohort_id, error = %e, "Cohort lookup failed");
                    None
                }
            },
            None => self.cohorts.get(cohort_id).map(|entry| entry.value().clone()),
        }
    }

    /// Every cohort, ordered by id
    pub async fn get_all(&self) -> BTreeMap<String, CohortRecord> {
        match self.db {
            Some(ref db) => match db.cohorts().list().await {
                Ok(cohorts) => cohorts,
                Err(e) => {
                    warn!(error = %e, "Cohort listing failed");
                    BTreeMap::new()
                }
            },
            None => self
                .cohorts
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    /// Cohorts with at least `threshold` members
    pub async fn get_compliant(&self, threshold: u64) -> BTreeMap<String, CohortRecord> {
        self.get_all()
            .await
            .into_iter()
            .filter(|(_, record)| record.count >= threshold)
            .collect()
    }

    pub async fn check_k_anonymity(&self, cohort_id: &str, threshold: u64) -> bool {
        self.get_count(cohort_id).await >= threshold
    }

    pub async fn get_stats(&self) -> CohortStats {
        let cohorts = self.get_all().await;
        CohortStats::from_records(&cohorts)
    }
}

impl Default for CohortRegistry {
    fn default() -> Self {
        Self::new(super::DEFAULT_K_THRESHOLD)
    }
}
