use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::entry::{ConsentEntry, ConsentRequest, ConsentStats, IdentityHasher};
use crate::database::pool::DatabasePool;

/// Append-only log of data ingestions
///
/// Entries are never mutated or removed. Order of the log is insertion
/// order; with a database that is the table's sequence column.
pub struct ConsentLedger {
    db: Option<Arc<DatabasePool>>,
    hasher: IdentityHasher,
    entries: Arc<RwLock<Vec<ConsentEntry>>>,
}

impl ConsentLedger {
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            db: None,
            hasher: IdentityHasher::new(salt),
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn hash_identity(&self, raw: &str) -> String {
        self.hasher.hash(raw)
    }

    fn generate_entry_id(now: DateTime<Utc>) -> String {
        let suffix: [u8; 8] = rand::random();
        format!("consent_{}_{}", now.timestamp_millis(), hex::encode(suffix))
    }

    /// Hash the identities in `request`, append the entry and return it
    pub async fn log_consent(&self, request: ConsentRequest) -> Result<ConsentEntry> {
        let now = Utc::now();
        let entry = ConsentEntry::from_request(Self::generate_entry_id(now), now, request, &self.hasher);

        match self.db {
            Some(ref db) => {
                db.consent()
                    .insert(&entry)
                    .await
                    .map_err(|e| anyhow!(e))
                    .context("Failed to persist consent entry")?;
            }
            None => {
                let mut entries = self.entries.write().await;
                entries.push(entry.clone());
            }
        }

        info!(
            consent_id = %entry.id,
            data_type = %entry.data_type,
            verified = entry.verification.verified,
            "Consent logged"
        );

        Ok(entry)
    }

    /// Entries for a raw user id, in append order
    pub async fn get_entries_by_user(&self, user_id: &str) -> Vec<ConsentEntry> {
        let hashed = self.hash_identity(user_id);

        match self.db {
            Some(ref db) => db.consent().by_hashed_user(&hashed).await.unwrap_or_else(|e| {
                warn!(error = %e, "Consent lookup by user failed");
                Vec::new()
            }),
            None => {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .filter(|entry| entry.hashed_user_id == hashed)
                    .cloned()
                    .collect()
            }
        }
    }

    pub async fn get_by_proof_id(&self, proof_id: &str) -> Option<ConsentEntry> {
        match self.db {
            Some(ref db) => db.consent().by_proof_id(proof_id).await.unwrap_or_else(|e| {
                warn!(proof_id = %proof_id, error = %e, "Consent lookup by proof failed");
                None
            }),
            None => {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .find(|entry| entry.proof_id.as_deref() == Some(proof_id))
                    .cloned()
            }
        }
    }

    pub async fn is_proof_already_used(&self, proof_id: &str) -> bool {
        self.get_by_proof_id(proof_id).await.is_some()
    }

    pub async fn get_stats(&self) -> ConsentStats {
        let entries = self.all_entries().await;
        ConsentStats::from_entries(&entries)
    }

    /// Entries with `start <= timestamp <= end`, in append order. With no
    /// bounds the whole log is returned; a missing start means the epoch and
    /// a missing end means now.
    pub async fn export_for_audit(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<ConsentEntry> {
        let entries = self.all_entries().await;

        if start.is_none() && end.is_none() {
            return entries;
        }

        let start = start.unwrap_or(DateTime::UNIX_EPOCH);
        let end = end.unwrap_or_else(Utc::now);

        entries
            .into_iter()
            .filter(|entry| entry.timestamp >= start && entry.timestamp <= end)
            .collect()
    }

    async fn all_entries(&self) -> Vec<ConsentEntry> {
        match self.db {
            Some(ref db) => db.consent().list().await.unwrap_or_else(|e| {
                error!(error = %e, "Failed to read consent ledger");
                Vec::new()
            }),
            None => self.entries.read().await.clone(),
        }
    }
}
