use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::pool::DatabasePool;
use crate::database::WriteError;
use crate::models::{Contribution, DataType, SellableRecord};

/// Accepted contributions, one row table per data type
pub struct ContributionStore {
    db: Option<Arc<DatabasePool>>,
    contributions: Arc<RwLock<Vec<Contribution>>>,
}

impl ContributionStore {
    pub fn new() -> Self {
        Self {
            db: None,
            contributions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Fails with [`WriteError::Conflict`] when a contribution of the same
    /// data type already carries this proof id
    pub async fn insert(&self, contribution: &Contribution) -> Result<(), WriteError> {
        match self.db {
            Some(ref db) => db.contributions().insert(contribution).await,
            None => {
                let mut contributions = self.contributions.write().await;
                if let Some(ref proof_id) = contribution.proof_id {
                    let taken = contributions.iter().any(|c| {
                        c.data_type == contribution.data_type && c.proof_id.as_ref() == Some(proof_id)
                    });
                    if taken {
                        return Err(WriteError::Conflict(format!("proof {} already stored", proof_id)));
                    }
                }
                contributions.push(contribution.clone());
                Ok(())
            }
        }
    }

    /// Every contribution of `user_id`, newest first
    pub async fn by_user(&self, user_id: &str) -> Result<Vec<Contribution>, String> {
        match self.db {
            Some(ref db) => db.contributions().by_user(user_id).await,
            None => {
                let contributions = self.contributions.read().await;
                let mut found: Vec<Contribution> = contributions
                    .iter()
                    .filter(|c| c.user_id == user_id)
                    .cloned()
                    .collect();
                found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(found)
            }
        }
    }

    /// Replace the sellable record of a stored contribution
    pub async fn update_sellable(
        &self,
        contribution_id: &str,
        data_type: DataType,
        record: &SellableRecord,
    ) -> Result<(), String> {
        match self.db {
            Some(ref db) => {
                db.contributions()
                    .update_sellable(contribution_id, data_type, record)
                    .await
            }
            None => {
                let mut contributions = self.contributions.write().await;
                let contribution = contributions
                    .iter_mut()
                    .find(|c| c.id == contribution_id)
                    .ok_or_else(|| format!("Contribution not found: {}", contribution_id))?;
                contribution.sellable_data = Some(record.clone());
                contribution.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Sellable records, newest first, optionally of one data type
    pub async fn sellable_records(
        &self,
        data_type: Option<DataType>,
        limit: usize,
    ) -> Result<Vec<SellableRecord>, String> {
        match self.db {
            Some(ref db) => db.contributions().sellable_records(data_type, limit).await,
            None => {
                let contributions = self.contributions.read().await;
                Ok(contributions
                    .iter()
                    .rev()
                    .filter(|c| data_type.map_or(true, |dt| c.data_type == dt))
                    .filter_map(|c| c.sellable_data.clone())
                    .take(limit)
                    .collect())
            }
        }
    }

    /// Newest-first page of contributions plus the total they were paged from
    pub async fn page(
        &self,
        data_type: Option<DataType>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Contribution>, u64), String> {
        let types: Vec<DataType> = match data_type {
            Some(dt) => vec![dt],
            None => DataType::ALL.to_vec(),
        };

        match self.db {
            Some(ref db) => {
                let mut total = 0;
                let mut merged = Vec::new();
                for data_type in types {
                    total += db.contributions().count(data_type).await?;
                    merged.extend(db.contributions().newest(data_type, 0, offset + limit).await?);
                }
                merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok((merged.into_iter().skip(offset).take(limit).collect(), total))
            }
            None => {
                let contributions = self.contributions.read().await;
                let mut matching: Vec<&Contribution> = contributions
                    .iter()
                    .filter(|c| types.contains(&c.data_type))
                    .collect();
                matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let total = matching.len() as u64;
                let page = matching
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect();
                Ok((page, total))
            }
        }
    }

    /// Contributions created after `since`, across data types
    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, String> {
        match self.db {
            Some(ref db) => {
                let mut total = 0;
                for data_type in DataType::ALL {
                    total += db.contributions().count_since(data_type, since).await?;
                }
                Ok(total)
            }
            None => Ok(self
                .contributions
                .read()
                .await
                .iter()
                .filter(|c| c.created_at > since)
                .count() as u64),
        }
    }

    /// Contribution count per data type; every type is present
    pub async fn count_by_type(&self) -> Result<BTreeMap<DataType, u64>, String> {
        let mut counts: BTreeMap<DataType, u64> =
            DataType::ALL.into_iter().map(|dt| (dt, 0)).collect();

        match self.db {
            Some(ref db) => {
                for data_type in DataType::ALL {
                    counts.insert(data_type, db.contributions().count(data_type).await?);
                }
            }
            None => {
                for contribution in self.contributions.read().await.iter() {
                    *counts.entry(contribution.data_type).or_default() += 1;
                }
            }
        }

        Ok(counts)
    }
}

impl Default for ContributionStore {
    fn default() -> Self {
        Self::new()
    }
}
