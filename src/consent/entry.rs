use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use crate::models::DataType;

pub const DEFAULT_DATASET_SOURCE: &str = "reclaim_protocol";
pub const CONSENT_TYPE_EXPLICIT: &str = "explicit_contribution";
pub const CONSENT_SCOPE: [&str; 2] = ["anonymized_behavioral_data", "aggregated_insights"];

/// Salted SHA-256 over raw identities. The same raw value always hashes to
/// the same digest under one salt.
#[derive(Clone)]
pub struct IdentityHasher {
    salt: String,
}

impl IdentityHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    pub fn hash(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for IdentityHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHasher").finish_non_exhaustive()
    }
}

/// What the caller knows about an ingestion; identities are still raw here
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub user_id: String,
    pub wallet_address: Option<String>,
    pub proof_id: Option<String>,
    pub data_type: DataType,
    pub dataset_source: Option<String>,
    pub geo_region: Option<String>,
    pub cohort_id: Option<String>,
    pub contribution_id: Option<String>,
    pub record_count: u64,
    pub data_window_start: Option<DateTime<Utc>>,
    pub data_window_end: Option<DateTime<Utc>>,
}

impl ConsentRequest {
    pub fn new(user_id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            user_id: user_id.into(),
            wallet_address: None,
            proof_id: None,
            data_type,
            dataset_source: None,
            geo_region: None,
            cohort_id: None,
            contribution_id: None,
            record_count: 0,
            data_window_start: None,
            data_window_end: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSummary {
    pub record_count: u64,
    pub data_window_start: Option<DateTime<Utc>>,
    pub data_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    ZkProof,
    SelfReported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verification {
    pub method: VerificationMethod,
    pub verified: bool,
}

impl Verification {
    pub fn for_proof(proof_id: Option<&str>) -> Self {
        match proof_id {
            Some(_) => Self {
                method: VerificationMethod::ZkProof,
                verified: true,
            },
            None => Self {
                method: VerificationMethod::SelfReported,
                verified: false,
            },
        }
    }
}

/// One immutable ledger line. Holds only hashed identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsentEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub hashed_user_id: String,
    pub hashed_wallet: Option<String>,
    pub proof_id: Option<String>,
    pub dataset_source: String,
    pub data_type: DataType,
    pub geo_region: String,
    pub cohort_id: Option<String>,
    pub contribution_id: Option<String>,
    pub data_summary: DataSummary,
    pub consent_type: String,
    pub consent_scope: Vec<String>,
    pub revocable: bool,
    pub verification: Verification,
}

impl ConsentEntry {
    pub(crate) fn from_request(
        id: String,
        timestamp: DateTime<Utc>,
        request: ConsentRequest,
        hasher: &IdentityHasher,
    ) -> Self {
        let verification = Verification::for_proof(request.proof_id.as_deref());

        Self {
            id,
            timestamp,
            hashed_user_id: hasher.hash(&request.user_id),
            hashed_wallet: request.wallet_address.as_deref().map(|w| hasher.hash(w)),
            proof_id: request.proof_id,
            dataset_source: request
                .dataset_source
                .unwrap_or_else(|| DEFAULT_DATASET_SOURCE.to_string()),
            data_type: request.data_type,
            geo_region: request
                .geo_region
                .filter(|region| !region.is_empty())
                .unwrap_or_else(|| crate::cohort::COHORT_PLACEHOLDER.to_string()),
            cohort_id: request.cohort_id,
            contribution_id: request.contribution_id,
            data_summary: DataSummary {
                record_count: request.record_count,
                data_window_start: request.data_window_start,
                data_window_end: request.data_window_end,
            },
            consent_type: CONSENT_TYPE_EXPLICIT.to_string(),
            consent_scope: CONSENT_SCOPE.iter().map(|s| s.to_string()).collect(),
            revocable: true,
            verification,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

/// Ledger-wide summary for the enterprise audit view
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsentStats {
    pub total_entries: usize,
    pub unique_users: usize,
    pub by_data_type: BTreeMap<String, u64>,
    pub by_geo_region: BTreeMap<String, u64>,
    pub by_consent_type: BTreeMap<String, u64>,
    pub verified_count: usize,
    pub date_range: DateRange,
}

impl ConsentStats {
    pub fn from_entries(entries: &[ConsentEntry]) -> Self {
        let mut stats = ConsentStats {
            total_entries: entries.len(),
            ..Default::default()
        };
        let mut users = HashSet::new();

        for entry in entries {
            users.insert(entry.hashed_user_id.as_str());
            *stats.by_data_type.entry(entry.data_type.to_string()).or_default() += 1;
            *stats.by_geo_region.entry(entry.geo_region.clone()).or_default() += 1;
            *stats.by_consent_type.entry(entry.consent_type.clone()).or_default() += 1;

            if entry.verification.verified {
                stats.verified_count += 1;
            }

            let range = &mut stats.date_range;
            if range.earliest.map_or(true, |earliest| entry.timestamp < earliest) {
                range.earliest = Some(entry.timestamp);
            }
            if range.latest.map_or(true, |latest| entry.timestamp > latest) {
                range.latest = Some(entry.timestamp);
            }
        }

        stats.unique_users = users.len();
        stats
    }
}
