use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::DataType;

pub const BASE_POINTS: u32 = 10;
pub const QUALITY_BONUS: u32 = 20;
pub const VOLUME_BONUS: u32 = 10;

pub const HIGH_QUALITY_SCORE: f64 = 0.7;
pub const MIN_ORDERS_FOR_BONUS: u64 = 5;

/// Points split by source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base: u32,
    pub quality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub total_points: u32,
    pub breakdown: RewardBreakdown,
}

impl RewardOutcome {
    fn new(base: u32, quality: u32) -> Self {
        Self {
            total_points: base + quality,
            breakdown: RewardBreakdown { base, quality },
        }
    }
}

/// Base points for any accepted contribution, plus the quality bonus when
/// the record is both high quality and substantial.
pub fn calculate_rewards(data_quality_score: f64, order_count: u64) -> RewardOutcome {
    let is_high_quality = data_quality_score >= HIGH_QUALITY_SCORE;
    let is_substantial = order_count >= MIN_ORDERS_FOR_BONUS;

    let bonus = if is_high_quality && is_substantial {
        QUALITY_BONUS
    } else {
        0
    };

    RewardOutcome::new(BASE_POINTS, bonus)
}

/// Whether a contribution counts as large for its data type
pub fn classify_volume(data_type: DataType, volume: u64) -> bool {
    match data_type {
        DataType::ZomatoOrderHistory => volume > 10,
        DataType::GithubProfile => volume > 50,
        DataType::NetflixWatchHistory => volume > 20,
    }
}

/// Which rule decides the points for an accepted contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicy {
    /// `calculate_rewards` over the sellable record's quality score
    #[default]
    QualityScore,
    /// Fixed bonus whenever `classify_volume` says the contribution is large
    VolumeThreshold,
}

impl RewardPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardPolicy::QualityScore => "quality_score",
            RewardPolicy::VolumeThreshold => "volume_threshold",
        }
    }

    pub fn award(&self, data_type: DataType, quality_score: f64, volume: u64) -> RewardOutcome {
        match self {
            RewardPolicy::QualityScore => calculate_rewards(quality_score, volume),
            RewardPolicy::VolumeThreshold => {
                let bonus = if classify_volume(data_type, volume) {
                    VOLUME_BONUS
                } else {
                    0
                };
                RewardOutcome::new(BASE_POINTS, bonus)
            }
        }
    }
}

impl fmt::Display for RewardPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quality_score" | "quality" => Ok(RewardPolicy::QualityScore),
            "volume_threshold" | "volume" => Ok(RewardPolicy::VolumeThreshold),
            other => Err(format!("Unknown reward policy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_rewards_table() {
        assert_eq!(calculate_rewards(0.8, 6).total_points, 30);
        assert_eq!(calculate_rewards(0.8, 4).total_points, 10);
        assert_eq!(calculate_rewards(0.69, 100).total_points, 10);
        assert_eq!(calculate_rewards(0.7, 5).total_points, 30);
        assert_eq!(calculate_rewards(0.0, 0).total_points, 10);
    }

    #[test]
    fn test_breakdown_sums_to_total() {
        let outcome = calculate_rewards(0.9, 20);
        assert_eq!(outcome.breakdown.base, BASE_POINTS);
        assert_eq!(outcome.breakdown.quality, QUALITY_BONUS);
        assert_eq!(
            outcome.total_points,
            outcome.breakdown.base + outcome.breakdown.quality
        );
    }

    #[test]
    fn test_classify_volume_thresholds_are_exclusive() {
        assert!(!classify_volume(DataType::ZomatoOrderHistory, 10));
        assert!(classify_volume(DataType::ZomatoOrderHistory, 11));
        assert!(!classify_volume(DataType::GithubProfile, 50));
        assert!(classify_volume(DataType::GithubProfile, 51));
        assert!(!classify_volume(DataType::NetflixWatchHistory, 20));
        assert!(classify_volume(DataType::NetflixWatchHistory, 21));
    }

    #[test]
    fn test_policies_award_differently() {
        let quality = RewardPolicy::QualityScore.award(DataType::ZomatoOrderHistory, 0.9, 8);
        assert_eq!(quality.total_points, 30);

        let volume = RewardPolicy::VolumeThreshold.award(DataType::ZomatoOrderHistory, 0.9, 8);
        assert_eq!(volume.total_points, 10);

        let large = RewardPolicy::VolumeThreshold.award(DataType::ZomatoOrderHistory, 0.1, 11);
        assert_eq!(large.total_points, 20);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("quality_score".parse(), Ok(RewardPolicy::QualityScore));
        assert_eq!("Volume".parse(), Ok(RewardPolicy::VolumeThreshold));
        assert!("streaks".parse::<RewardPolicy>().is_err());
    }
}
