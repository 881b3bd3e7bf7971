use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use super::{months_covered, parse_date, round2, window, Pipeline};
use crate::cohort::derive_cohort_id;
use crate::models::{AudienceSegment, DataCoverage, DataQuality, DataType, SellableRecord};

/// Titles watched on one day before the day counts as a binge
const BINGE_TITLES_PER_DAY: usize = 3;

/// Streaming watch history
pub struct NetflixPipeline;

fn engagement_tier(titles_per_month: f64) -> &'static str {
    if titles_per_month >= 30.0 {
        "heavy"
    } else if titles_per_month >= 10.0 {
        "moderate"
    } else {
        "light"
    }
}

fn viewing_pattern(binge_score: f64) -> &'static str {
    if binge_score >= 0.5 {
        "binge"
    } else if binge_score >= 0.2 {
        "regular"
    } else {
        "casual"
    }
}

#[async_trait::async_trait]
impl Pipeline for NetflixPipeline {
    fn data_type(&self) -> DataType {
        DataType::NetflixWatchHistory
    }

    async fn transform(&self, payload: &Value) -> Result<SellableRecord> {
        let Some(history) = payload.get("watchHistory").and_then(Value::as_array) else {
            bail!("payload has no watchHistory array");
        };
        if history.is_empty() {
            bail!("no titles to process");
        }

        let total_titles = history.len() as u64;
        let unique_titles: HashSet<&str> = history
            .iter()
            .filter_map(|item| item.get("title").and_then(Value::as_str))
            .collect();
        let dates: Vec<_> = history
            .iter()
            .filter_map(|item| item.get("date").and_then(parse_date))
            .collect();

        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        for date in &dates {
            *per_day.entry(date.date_naive()).or_default() += 1;
        }
        let binge_days = per_day
            .values()
            .filter(|count| **count >= BINGE_TITLES_PER_DAY)
            .count();
        let binge_score = if per_day.is_empty() {
            0.0
        } else {
            binge_days as f64 / per_day.len() as f64
        };

        let (start, end) = window(&dates);
        let titles_per_month = total_titles as f64 / months_covered(start, end);

        let complete = history
            .iter()
            .filter(|item| {
                item.get("title").and_then(Value::as_str).is_some()
                    && item.get("date").and_then(parse_date).is_some()
            })
            .count();
        let completeness = complete as f64 / total_titles as f64;
        let score = round2(0.6 * completeness + 0.4 * (total_titles as f64 / 20.0).min(1.0));

        let engagement = engagement_tier(titles_per_month);
        let pattern = viewing_pattern(binge_score);

        let data = json!({
            "viewing_summary": {
                "total_titles_watched": total_titles,
                "unique_titles": unique_titles.len(),
                "titles_per_month": round2(titles_per_month),
                "binge_score": round2(binge_score),
            }
        });

        Ok(SellableRecord::new(
            DataType::NetflixWatchHistory,
            AudienceSegment {
                segment_id: derive_cohort_id(
                    Some(DataType::NetflixWatchHistory.provider()),
                    None,
                    Some(engagement),
                    Some(pattern),
                ),
                platform: DataType::NetflixWatchHistory.provider().to_string(),
                spend_tier: engagement.to_string(),
                frequency_tier: pattern.to_string(),
            },
            None,
            DataCoverage {
                record_count: total_titles,
                data_window_start: start,
                data_window_end: end,
            },
            DataQuality {
                score,
                completeness: round2(completeness),
            },
            data,
        ))
    }
}
