//! Enterprise API
//!
//! Endpoints (x-api-key):
//!   GET /enterprise/cohorts -> Cohort sizes and compliance
//!   GET /enterprise/consent-ledger?start_date&end_date -> Audit export
//!   GET /enterprise/dataset?data_type&limit&include_pending -> Sellable records
//!   GET /enterprise/data?data_type&limit&offset -> Paginated anonymized contributions
//!   GET /enterprise/insights -> Aggregate counts and recent activity

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;
use crate::cohort::CohortRegistry;
use crate::consent::ConsentLedger;
use crate::intake::ContributionStore;
use crate::models::{DataType, ProcessingMethod, SELLABLE_SCHEMA_VERSION};
use crate::users::UserDirectory;

pub const DEFAULT_DATASET_LIMIT: usize = 1000;
pub const MAX_DATASET_LIMIT: usize = 10_000;
pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct EnterpriseApiState {
    pub cohorts: Arc<CohortRegistry>,
    pub consent: Arc<ConsentLedger>,
    pub store: Arc<ContributionStore>,
    pub users: Arc<UserDirectory>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    pub data_type: Option<String>,
    pub limit: Option<usize>,
    /// Also return records whose cohort has not reached k yet
    #[serde(default)]
    pub include_pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct DataPageQuery {
    pub data_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Contribution as enterprises see it: no user id or wallet
#[derive(Debug, Serialize)]
pub struct AnonymizedContribution {
    pub id: String,
    pub data_type: DataType,
    pub data: Value,
    pub cohort_id: Option<String>,
    pub record_count: u64,
    pub processing_method: ProcessingMethod,
    pub created_at: DateTime<Utc>,
}

fn parse_data_type(raw: Option<&str>) -> Result<Option<DataType>, ApiError> {
    raw.map(|raw| {
        raw.parse::<DataType>()
            .map_err(|_| ApiError::bad_request(format!("Unknown data type: {}", raw)))
    })
    .transpose()
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (start or end of that day)
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date: {}", raw)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        Some(NaiveTime::MIN)
    };

    time.map(|t| date.and_time(t).and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid date: {}", raw)))
}

pub async fn get_cohorts(State(state): State<EnterpriseApiState>) -> Json<Value> {
    let k_threshold = state.cohorts.k_threshold();
    let stats = state.cohorts.get_stats().await;
    let cohorts = state.cohorts.get_all().await;
    let compliant_cohorts = state.cohorts.get_compliant(k_threshold).await;

    Json(json!({
        "success": true,
        "stats": stats,
        "cohorts": cohorts,
        "compliant_cohorts": compliant_cohorts,
        "k_threshold": k_threshold,
    }))
}

pub async fn get_consent_ledger(
    State(state): State<EnterpriseApiState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Value>, ApiError> {
    let start = query
        .start_date
        .as_deref()
        .map(|raw| parse_bound(raw, false))
        .transpose()?;
    let end = query
        .end_date
        .as_deref()
        .map(|raw| parse_bound(raw, true))
        .transpose()?;

    let stats = state.consent.get_stats().await;
    let entries = state.consent.export_for_audit(start, end).await;
    debug!(entries = entries.len(), "Consent ledger exported");

    Ok(Json(json!({
        "success": true,
        "stats": stats,
        "entries": entries,
        "exported_at": Utc::now(),
    })))
}

pub async fn get_dataset(
    State(state): State<EnterpriseApiState>,
    Query(query): Query<DatasetQuery>,
) -> Result<Json<Value>, ApiError> {
    let data_type = parse_data_type(query.data_type.as_deref())?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DATASET_LIMIT)
        .min(MAX_DATASET_LIMIT);

    let k_threshold = state.cohorts.k_threshold();
    let cohorts = state.cohorts.get_all().await;

    // Stored annotations are as of insertion; refresh them from the registry
    let mut records = state
        .store
        .sellable_records(data_type, MAX_DATASET_LIMIT)
        .await
        .map_err(|e| ApiError::internal("Dataset export", e, "Failed to generate dataset"))?;
    for record in records.iter_mut() {
        let (size, compliant) = cohorts
            .get(record.cohort_id())
            .map(|cohort| (cohort.count, cohort.compliant))
            .unwrap_or((0, false));
        record.annotate_compliance(size, compliant);
    }

    let records: Vec<_> = records
        .into_iter()
        .filter(|record| {
            query.include_pending
                || cohorts
                    .get(record.cohort_id())
                    .is_some_and(|cohort| cohort.compliant)
        })
        .take(limit)
        .collect();

    let mut platforms: Vec<&str> = records
        .iter()
        .map(|record| record.audience_segment.platform.as_str())
        .collect();
    platforms.sort_unstable();
    platforms.dedup();

    Ok(Json(json!({
        "success": true,
        "dataset_info": {
            "total_records": records.len(),
            "platforms": platforms,
            "k_threshold": k_threshold,
            "generated_at": Utc::now(),
            "format": SELLABLE_SCHEMA_VERSION,
        },
        "records": records,
    })))
}

pub async fn get_data_page(
    State(state): State<EnterpriseApiState>,
    Query(query): Query<DataPageQuery>,
) -> Result<Json<Value>, ApiError> {
    let data_type = parse_data_type(query.data_type.as_deref())?;
    let offset = query.offset.unwrap_or(0);
    let limit = query
        .limit
        .filter(|&l| l > 0)
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);

    let (page, total) = state
        .store
        .page(data_type, offset, limit)
        .await
        .map_err(|e| ApiError::internal("Enterprise data", e, "Failed to fetch data"))?;

    let data: Vec<AnonymizedContribution> = page
        .into_iter()
        .map(|c| AnonymizedContribution {
            cohort_id: c.cohort_id().map(str::to_string),
            id: c.id,
            data_type: c.data_type,
            data: c.data,
            record_count: c.record_count,
            processing_method: c.processing_method,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": data,
        "total": total,
        "offset": offset,
        "limit": limit,
    })))
}

pub async fn get_insights(State(state): State<EnterpriseApiState>) -> Result<Json<Value>, ApiError> {
    let by_type = state
        .store
        .count_by_type()
        .await
        .map_err(|e| ApiError::internal("Insights", e, "Failed to fetch insights"))?;
    let total_users = state
        .users
        .count()
        .await
        .map_err(|e| ApiError::internal("Insights", e, "Failed to fetch insights"))?;
    let total_points = state
        .users
        .total_points()
        .await
        .map_err(|e| ApiError::internal("Insights", e, "Failed to fetch insights"))?;

    let now = Utc::now();
    let last_24_hours = state
        .store
        .count_since(now - Duration::hours(24))
        .await
        .map_err(|e| ApiError::internal("Insights", e, "Failed to fetch insights"))?;
    let last_7_days = state
        .store
        .count_since(now - Duration::days(7))
        .await
        .map_err(|e| ApiError::internal("Insights", e, "Failed to fetch insights"))?;

    let total_contributions: u64 = by_type.values().sum();
    let data_type_breakdown: BTreeMap<&str, u64> =
        by_type.into_iter().map(|(dt, n)| (dt.as_str(), n)).collect();
    let cohort_stats = state.cohorts.get_stats().await;
    let consent_stats = state.consent.get_stats().await;

    Ok(Json(json!({
        "success": true,
        "insights": {
            "total_contributions": total_contributions,
            "total_users": total_users,
            "average_points_per_user": average_points(total_points, total_users),
            "data_type_breakdown": data_type_breakdown,
            "total_cohorts": cohort_stats.total_cohorts,
            "compliant_cohorts": cohort_stats.compliant_cohorts,
            "consent_entries": consent_stats.total_entries,
            "verified_consents": consent_stats.verified_count,
            "recent_activity": {
                "last_24_hours": last_24_hours,
                "last_7_days": last_7_days,
            },
        },
    })))
}

/// Rounded mean, zero without users
fn average_points(total_points: u64, total_users: u64) -> u64 {
    if total_users == 0 {
        return 0;
    }
    (total_points as f64 / total_users as f64).round() as u64
}

pub fn create_router(state: EnterpriseApiState) -> Router {
    Router::new()
        .route("/enterprise/cohorts", get(get_cohorts))
        .route("/enterprise/consent-ledger", get(get_consent_ledger))
        .route("/enterprise/dataset", get(get_dataset))
        .route("/enterprise/data", get(get_data_page))
        .route("/enterprise/insights", get(get_insights))
        .with_state(state)
}
