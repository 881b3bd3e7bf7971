//! Reward Calculator
//!
//! Points per accepted contribution and the league a running total maps to.
//!
//! ```text
//! base 10 ── always
//! +20     ── quality score >= 0.7 and at least 5 orders
//! ```

mod calculator;
mod league;

pub use calculator::{
    calculate_rewards, classify_volume, RewardBreakdown, RewardOutcome, RewardPolicy, BASE_POINTS,
    QUALITY_BONUS, VOLUME_BONUS,
};
pub use league::{calculate_league, League, LEAGUE_TABLE};
