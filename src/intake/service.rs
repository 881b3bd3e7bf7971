use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::IntakeError;
use super::store::ContributionStore;
use crate::cohort::CohortRegistry;
use crate::config::{IntakeConfig, MAX_DEDUP_WINDOW_HOURS};
use crate::consent::{ConsentLedger, ConsentRequest};
use crate::database::WriteError;
use crate::models::{Contribution, DataType};
use crate::pipeline::PipelineRegistry;
use crate::rewards::{classify_volume, League, RewardBreakdown, RewardPolicy};
use crate::users::{UserAccount, UserDirectory};

/// A contribution as the user submitted it
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub user_id: String,
    /// Must name one of the known data types
    pub data_type: String,
    pub payload: Value,
    pub proof_id: Option<String>,
}

/// What an accepted submission produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeReceipt {
    pub contribution_id: String,
    pub data_type: DataType,
    pub points_awarded: u32,
    pub breakdown: RewardBreakdown,
    pub is_large_data: bool,
    pub has_sellable_data: bool,
    pub cohort_id: Option<String>,
    pub cohort_size: u64,
    pub k_anonymity_compliant: Option<bool>,
    pub consent_entry_id: Option<String>,
    pub total_points: u64,
    pub league: League,
    pub created_at: DateTime<Utc>,
}

/// Orchestrates one submission from dedup through consent
///
/// ```text
/// validate ─► dup by proof ─► dup by content ─► pipeline ─► size ─► store
///                                                                    │
///                    user stats ◄── consent log ◄── cohort increment ◄┘
/// ```
///
/// Submissions of one user are serialized, and a proof id is claimed for the
/// duration of its submission, so concurrent copies of one proof cannot both
/// pass the duplicate checks whichever users send them.
pub struct ContributionIntake {
    users: Arc<UserDirectory>,
    store: Arc<ContributionStore>,
    cohorts: Arc<CohortRegistry>,
    consent: Arc<ConsentLedger>,
    pipelines: Arc<PipelineRegistry>,
    policy: RewardPolicy,
    dedup_window: Duration,
    dedup_tolerance: u64,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Proof ids with a submission in flight
    proof_claims: DashMap<String, ()>,
}

/// Releases a claimed proof id on every exit path
struct ProofClaim<'a> {
    claims: &'a DashMap<String, ()>,
    proof_id: String,
}

impl Drop for ProofClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.proof_id);
    }
}

impl ContributionIntake {
    pub fn new(
        users: Arc<UserDirectory>,
        store: Arc<ContributionStore>,
        cohorts: Arc<CohortRegistry>,
        consent: Arc<ConsentLedger>,
        pipelines: Arc<PipelineRegistry>,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            users,
            store,
            cohorts,
            consent,
            pipelines,
            policy: config.reward_policy,
            dedup_window: Duration::hours(config.dedup_window_hours.clamp(1, MAX_DEDUP_WINDOW_HOURS)),
            dedup_tolerance: config.dedup_record_tolerance,
            user_locks: DashMap::new(),
            proof_claims: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the user's lock once nobody else holds or waits on it
    fn release_lock(&self, user_id: &str) {
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn claim_proof(&self, proof_id: &str) -> Option<ProofClaim<'_>> {
        match self.proof_claims.entry(proof_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(ProofClaim {
                    claims: &self.proof_claims,
                    proof_id: proof_id.to_string(),
                })
            }
        }
    }

    /// Number of users with a lock entry
    pub fn tracked_user_locks(&self) -> usize {
        self.user_locks.len()
    }

    pub async fn submit(&self, request: SubmissionRequest) -> Result<IntakeReceipt, IntakeError> {
        let SubmissionRequest {
            user_id,
            data_type,
            payload,
            proof_id,
        } = request;

        let data_type: DataType = data_type
            .parse()
            .map_err(|_| IntakeError::Validation(format!("Unknown data type: {}", data_type)))?;
        if !payload.is_object() {
            return Err(IntakeError::Validation(
                "anonymizedData must be a JSON object".to_string(),
            ));
        }
        let proof_id = proof_id.filter(|id| !id.trim().is_empty());

        let user = self
            .users
            .get_by_id(&user_id)
            .await
            .map_err(|e| self.internal("load user", &user_id, e))?
            .ok_or(IntakeError::UserNotFound)?;

        let lock = self.lock_for(&user_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.submit_locked(user, data_type, payload, proof_id).await
        };
        drop(lock);
        self.release_lock(&user_id);

        outcome
    }

    async fn submit_locked(
        &self,
        user: UserAccount,
        data_type: DataType,
        payload: Value,
        proof_id: Option<String>,
    ) -> Result<IntakeReceipt, IntakeError> {
        let user_id = user.id.clone();

        let priors = self
            .store
            .by_user(&user_id)
            .await
            .map_err(|e| self.internal("load prior contributions", &user_id, e))?;

        // Duplicate by proof; the claim is held until this submission ends
        let _claim = match proof_id {
            Some(ref proof_id) => {
                if let Some(existing) = priors.iter().find(|c| c.proof_id.as_ref() == Some(proof_id)) {
                    info!(user_id = %user_id, proof_id = %proof_id, "Duplicate proof blocked");
                    return Err(IntakeError::Duplicate {
                        existing_contribution_id: Some(existing.id.clone()),
                    });
                }
                let Some(claim) = self.claim_proof(proof_id) else {
                    info!(user_id = %user_id, proof_id = %proof_id, "Proof already in flight");
                    return Err(IntakeError::Duplicate {
                        existing_contribution_id: None,
                    });
                };
                if self.consent.is_proof_already_used(proof_id).await {
                    info!(user_id = %user_id, proof_id = %proof_id, "Proof already in consent ledger");
                    return Err(IntakeError::Duplicate {
                        existing_contribution_id: None,
                    });
                }
                Some(claim)
            }
            None => None,
        };

        // Duplicate by content
        let now = Utc::now();
        let raw_volume = data_type.raw_volume(&payload);
        let window_start = now - self.dedup_window;
        let blocking = priors
            .iter()
            .filter(|c| c.data_type == data_type && c.created_at > window_start)
            .filter(|c| c.record_count.abs_diff(raw_volume) < self.dedup_tolerance)
            .max_by_key(|c| c.created_at);
        if let Some(prior) = blocking {
            let retry_after = prior.created_at + self.dedup_window;
            info!(
                user_id = %user_id,
                data_type = %data_type,
                retry_after = %retry_after,
                "Similar submission inside dedup window"
            );
            return Err(IntakeError::RateLimited { retry_after });
        }

        // Transform; failure leaves the contribution raw
        let mut sellable = self.pipelines.run(data_type, &payload).await;

        // Size classification and reward
        let volume = sellable
            .as_ref()
            .map(|record| record.coverage.record_count)
            .unwrap_or(raw_volume);
        let quality = sellable.as_ref().map(|record| record.quality_score()).unwrap_or(0.0);
        let is_large_data = classify_volume(data_type, volume);
        let reward = self.policy.award(data_type, quality, volume);

        debug!(
            user_id = %user_id,
            data_type = %data_type,
            volume,
            quality,
            is_large_data,
            points = reward.total_points,
            "Reward computed"
        );

        let contribution = Contribution::new(
            user_id.clone(),
            Some(user.wallet_address.clone()),
            data_type,
            payload,
            sellable.clone(),
            proof_id.clone(),
            volume,
            reward.total_points,
        );
        match self.store.insert(&contribution).await {
            Ok(()) => {}
            Err(WriteError::Conflict(detail)) => {
                info!(user_id = %user_id, detail = %detail, "Proof already stored");
                return Err(IntakeError::Duplicate {
                    existing_contribution_id: None,
                });
            }
            Err(WriteError::Failed(detail)) => {
                return Err(self.internal("store contribution", &user_id, detail));
            }
        }

        // Cohort counting and compliance annotation
        let mut cohort_size = 0;
        let mut k_anonymity_compliant = None;
        let cohort_id = sellable.as_ref().map(|record| record.cohort_id().to_string());

        if let (Some(cohort_id), Some(record)) = (cohort_id.as_deref(), sellable.as_mut()) {
            let cohort = self.cohorts.increment(cohort_id).await;
            cohort_size = cohort.count;
            k_anonymity_compliant = Some(cohort.compliant);

            record.annotate_compliance(cohort.count, cohort.compliant);
            if let Err(e) = self
                .store
                .update_sellable(&contribution.id, data_type, record)
                .await
            {
                warn!(
                    contribution_id = %contribution.id,
                    error = %e,
                    "Failed to store compliance annotation"
                );
            }
        }

        // Consent
        let consent_request = ConsentRequest {
            user_id: user_id.clone(),
            wallet_address: Some(user.wallet_address.clone()),
            proof_id: proof_id.clone(),
            data_type,
            dataset_source: None,
            geo_region: sellable
                .as_ref()
                .and_then(|record| record.city_cluster())
                .map(str::to_string),
            cohort_id: cohort_id.clone(),
            contribution_id: Some(contribution.id.clone()),
            record_count: volume,
            data_window_start: sellable.as_ref().and_then(|r| r.coverage.data_window_start),
            data_window_end: sellable.as_ref().and_then(|r| r.coverage.data_window_end),
        };
        let consent_entry_id = match self.consent.log_consent(consent_request).await {
            Ok(entry) => Some(entry.id),
            Err(e) => {
                error!(
                    contribution_id = %contribution.id,
                    error = %e,
                    "Consent logging failed, contribution kept"
                );
                None
            }
        };

        // User stats
        let user = self
            .users
            .record_contribution(&user_id, reward.total_points)
            .await
            .map_err(|e| self.internal("update user stats", &user_id, e))?;

        info!(
            user_id = %user_id,
            contribution_id = %contribution.id,
            data_type = %data_type,
            points = reward.total_points,
            sellable = sellable.is_some(),
            "Contribution accepted"
        );

        Ok(IntakeReceipt {
            contribution_id: contribution.id,
            data_type,
            points_awarded: reward.total_points,
            breakdown: reward.breakdown,
            is_large_data,
            has_sellable_data: sellable.is_some(),
            cohort_id,
            cohort_size,
            k_anonymity_compliant,
            consent_entry_id,
            total_points: user.total_points,
            league: user.league,
            created_at: contribution.created_at,
        })
    }

    fn internal(&self, step: &str, user_id: &str, detail: String) -> IntakeError {
        error!(user_id = %user_id, step = step, error = %detail, "Submission failed");
        IntakeError::Internal(detail)
    }
}
