//! Sellable record: the business-facing shape a pipeline produces from a
//! contribution's raw attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::contribution::DataType;

pub const SELLABLE_SCHEMA_VERSION: &str = "myrad_v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SellableRecord {
    pub schema_version: String,
    pub record_id: String,
    pub data_type: DataType,
    pub audience_segment: AudienceSegment,
    pub geo_data: Option<GeoData>,
    pub coverage: DataCoverage,
    pub metadata: RecordMetadata,

    /// Provider-specific body
    pub data: Value,
}

/// Coarse category attributes; `segment_id` is the cohort id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudienceSegment {
    pub segment_id: String,
    pub platform: String,
    pub spend_tier: String,
    pub frequency_tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoData {
    pub city_cluster: String,
}

/// Record count and time window a contribution covers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataCoverage {
    pub record_count: u64,
    pub data_window_start: Option<DateTime<Utc>>,
    pub data_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    pub data_quality: DataQuality,
    pub privacy_compliance: PrivacyCompliance,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataQuality {
    /// 0.0 - 1.0
    pub score: f64,
    /// Fraction of expected fields that were present
    pub completeness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrivacyCompliance {
    pub pii_removed: bool,
    /// Unknown until the cohort has been counted
    pub k_anonymity_compliant: Option<bool>,
    pub cohort_size: u64,
    pub aggregation_status: AggregationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStatus {
    PendingMoreContributors,
    Sellable,
}

impl SellableRecord {
    pub fn new(
        data_type: DataType,
        audience_segment: AudienceSegment,
        geo_data: Option<GeoData>,
        coverage: DataCoverage,
        data_quality: DataQuality,
        data: Value,
    ) -> Self {
        Self {
            schema_version: SELLABLE_SCHEMA_VERSION.to_string(),
            record_id: Uuid::new_v4().to_string(),
            data_type,
            audience_segment,
            geo_data,
            coverage,
            metadata: RecordMetadata {
                data_quality,
                privacy_compliance: PrivacyCompliance {
                    pii_removed: true,
                    k_anonymity_compliant: None,
                    cohort_size: 0,
                    aggregation_status: AggregationStatus::PendingMoreContributors,
                },
                generated_at: Utc::now(),
            },
            data,
        }
    }

    pub fn cohort_id(&self) -> &str {
        &self.audience_segment.segment_id
    }

    pub fn quality_score(&self) -> f64 {
        self.metadata.data_quality.score
    }

    pub fn city_cluster(&self) -> Option<&str> {
        self.geo_data.as_ref().map(|geo| geo.city_cluster.as_str())
    }

    /// Attach the cohort's current size and compliance after it was counted
    pub fn annotate_compliance(&mut self, cohort_size: u64, compliant: bool) {
        let privacy = &mut self.metadata.privacy_compliance;
        privacy.cohort_size = cohort_size;
        privacy.k_anonymity_compliant = Some(compliant);
        privacy.aggregation_status = if compliant {
            AggregationStatus::Sellable
        } else {
            AggregationStatus::PendingMoreContributors
        };
    }
}
