use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::sellable::SellableRecord;
use crate::pipeline::parse_count;

/// Platforms a user can contribute data from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    ZomatoOrderHistory,
    GithubProfile,
    NetflixWatchHistory,
}

impl DataType {
    pub const ALL: [DataType; 3] = [
        DataType::ZomatoOrderHistory,
        DataType::GithubProfile,
        DataType::NetflixWatchHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::ZomatoOrderHistory => "zomato_order_history",
            DataType::GithubProfile => "github_profile",
            DataType::NetflixWatchHistory => "netflix_watch_history",
        }
    }

    /// Provider key used by the proof service and in cohort ids
    pub fn provider(&self) -> &'static str {
        match self {
            DataType::ZomatoOrderHistory => "zomato",
            DataType::GithubProfile => "github",
            DataType::NetflixWatchHistory => "netflix",
        }
    }

    /// Row table holding contributions of this type
    pub fn table_name(&self) -> &'static str {
        match self {
            DataType::ZomatoOrderHistory => "zomato_contributions",
            DataType::GithubProfile => "github_contributions",
            DataType::NetflixWatchHistory => "netflix_contributions",
        }
    }

    pub fn from_provider(provider: &str) -> Option<Self> {
        let provider = provider.trim().to_lowercase();
        DataType::ALL.into_iter().find(|dt| dt.provider() == provider)
    }

    /// Volume measure read straight from the raw payload: orders for Zomato,
    /// yearly contributions for GitHub, titles watched for Netflix
    pub fn raw_volume(&self, payload: &Value) -> u64 {
        match self {
            DataType::ZomatoOrderHistory => payload
                .get("orders")
                .and_then(Value::as_array)
                .map(|orders| orders.len() as u64)
                .unwrap_or(0),
            DataType::GithubProfile => payload
                .get("contributionsLastYear")
                .and_then(parse_count)
                .unwrap_or(0),
            DataType::NetflixWatchHistory => payload
                .get("watchHistory")
                .and_then(Value::as_array)
                .map(|titles| titles.len() as u64)
                .unwrap_or(0),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| format!("Unknown data type: {}", s))
    }
}

/// How the stored payload was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    EnterprisePipeline,
    Raw,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::EnterprisePipeline => "enterprise_pipeline",
            ProcessingMethod::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "enterprise_pipeline" {
            ProcessingMethod::EnterprisePipeline
        } else {
            ProcessingMethod::Raw
        }
    }
}

/// An accepted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub user_id: String,
    pub wallet_address: Option<String>,
    pub data_type: DataType,

    /// Anonymized payload as submitted
    pub data: Value,

    /// Present only when the pipeline succeeded
    pub sellable_data: Option<SellableRecord>,
    pub processing_method: ProcessingMethod,

    /// External proof identifier, used for duplicate detection
    pub proof_id: Option<String>,

    /// Data-type volume measure, used for content duplicate detection
    pub record_count: u64,
    pub points_awarded: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contribution {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        wallet_address: Option<String>,
        data_type: DataType,
        data: Value,
        sellable_data: Option<SellableRecord>,
        proof_id: Option<String>,
        record_count: u64,
        points_awarded: u32,
    ) -> Self {
        let now = Utc::now();
        let processing_method = if sellable_data.is_some() {
            ProcessingMethod::EnterprisePipeline
        } else {
            ProcessingMethod::Raw
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            wallet_address,
            data_type,
            data,
            sellable_data,
            processing_method,
            proof_id,
            record_count,
            points_awarded,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cohort_id(&self) -> Option<&str> {
        self.sellable_data
            .as_ref()
            .map(|record| record.audience_segment.segment_id.as_str())
    }
}
