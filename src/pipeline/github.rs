use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::{parse_count, round2, Pipeline};
use crate::cohort::{derive_cohort_id, normalize_component};
use crate::models::{
    AudienceSegment, DataCoverage, DataQuality, DataType, GeoData, SellableRecord,
};

/// Developer profile; the tier slot of the cohort holds developer reach
/// rather than spend
pub struct GithubPipeline;

const PROFILE_FIELDS: [&str; 4] = ["contributionsLastYear", "followers", "publicRepos", "location"];

fn developer_tier(followers: u64, public_repos: u64) -> &'static str {
    match followers + public_repos {
        0..=9 => "emerging",
        10..=99 => "established",
        _ => "influential",
    }
}

fn activity_tier(yearly_contributions: u64) -> &'static str {
    match yearly_contributions {
        1000.. => "daily",
        200..=999 => "weekly",
        50..=199 => "monthly",
        _ => "occasional",
    }
}

/// "Pune, Maharashtra, India" -> "Pune"
fn city_from_location(location: &str) -> Option<&str> {
    location
        .split(',')
        .next()
        .map(str::trim)
        .filter(|city| !city.is_empty())
}

#[async_trait::async_trait]
impl Pipeline for GithubPipeline {
    fn data_type(&self) -> DataType {
        DataType::GithubProfile
    }

    async fn transform(&self, payload: &Value) -> Result<SellableRecord> {
        let present = PROFILE_FIELDS
            .iter()
            .filter(|field| payload.get(**field).is_some_and(|v| !v.is_null()))
            .count();
        if present == 0 {
            bail!("payload has no profile fields");
        }

        let contributions = payload
            .get("contributionsLastYear")
            .and_then(parse_count)
            .unwrap_or(0);
        let followers = payload.get("followers").and_then(parse_count).unwrap_or(0);
        let public_repos = payload.get("publicRepos").and_then(parse_count).unwrap_or(0);
        let city = payload
            .get("location")
            .and_then(Value::as_str)
            .and_then(city_from_location);

        let tier = developer_tier(followers, public_repos);
        let activity = activity_tier(contributions);
        let completeness = present as f64 / PROFILE_FIELDS.len() as f64;
        let score = round2(0.5 * completeness + 0.5 * (contributions as f64 / 200.0).min(1.0));

        let now = Utc::now();
        let data = json!({
            "activity_metrics": {
                "yearly_contributions": contributions,
                "followers": followers,
                "public_repos": public_repos,
            },
            "developer_tier": tier,
            "activity_level": activity,
        });

        Ok(SellableRecord::new(
            DataType::GithubProfile,
            AudienceSegment {
                segment_id: derive_cohort_id(
                    Some(DataType::GithubProfile.provider()),
                    city,
                    Some(tier),
                    Some(activity),
                ),
                platform: DataType::GithubProfile.provider().to_string(),
                spend_tier: tier.to_string(),
                frequency_tier: activity.to_string(),
            },
            city.map(|city| GeoData {
                city_cluster: normalize_component(Some(city)),
            }),
            DataCoverage {
                record_count: contributions,
                data_window_start: Some(now - Duration::days(365)),
                data_window_end: Some(now),
            },
            DataQuality {
                score,
                completeness: round2(completeness),
            },
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_profile() {
        let payload = json!({
            "contributionsLastYear": "1,204",
            "followers": 85,
            "publicRepos": 40,
            "location": "Pune, India",
        });
        let record = GithubPipeline.transform(&payload).await.unwrap();

        assert_eq!(record.cohort_id(), "github:pune:influential:daily");
        assert_eq!(record.coverage.record_count, 1204);
        assert_eq!(record.quality_score(), 1.0);
        assert_eq!(record.city_cluster(), Some("pune"));
    }

    #[tokio::test]
    async fn test_partial_profile() {
        let payload = json!({ "contributionsLastYear": 12 });
        let record = GithubPipeline.transform(&payload).await.unwrap();

        assert_eq!(record.cohort_id(), "github:unknown:emerging:occasional");
        assert!(record.quality_score() < 0.7);
    }

    #[tokio::test]
    async fn test_empty_profile_fails() {
        assert!(GithubPipeline.transform(&json!({ "login": "x" })).await.is_err());
    }
}
