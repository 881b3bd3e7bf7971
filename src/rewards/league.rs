use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum League {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

/// Inclusive lower bounds, checked top-down
pub const LEAGUE_TABLE: [(u64, League); 5] = [
    (5000, League::Diamond),
    (2000, League::Platinum),
    (1000, League::Gold),
    (200, League::Silver),
    (0, League::Bronze),
];

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            League::Bronze => "Bronze",
            League::Silver => "Silver",
            League::Gold => "Gold",
            League::Platinum => "Platinum",
            League::Diamond => "Diamond",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        LEAGUE_TABLE
            .iter()
            .map(|(_, league)| *league)
            .find(|league| league.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn calculate_league(total_points: u64) -> League {
    LEAGUE_TABLE
        .iter()
        .find(|(min_points, _)| total_points >= *min_points)
        .map(|(_, league)| *league)
        .unwrap_or_default()
}
