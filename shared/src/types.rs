//! Common types used across the workspace

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Government system a certificate (and a query) is bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TargetSystem {
    #[serde(rename = "national")]
    National,
    #[serde(rename = "municipal")]
    Municipal,
}

impl TargetSystem {
    pub const ALL: [TargetSystem; 2] = [TargetSystem::National, TargetSystem::Municipal];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSystem::National => "national",
            TargetSystem::Municipal => "municipal",
        }
    }
}

impl std::fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetSystem {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "national" | "nacional" => Ok(TargetSystem::National),
            "municipal" => Ok(TargetSystem::Municipal),
            other => Err(format!("unknown target system: {}", other)),
        }
    }
}

/// Inclusive calendar-date window used by both portals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window ending on `today` and starting exactly `days` earlier.
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        // Windows reaching past the calendar start are clamped to it.
        let start = Duration::try_days(days.max(0))
            .and_then(|window| today.checked_sub_signed(window))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// Fill whichever bound is missing from the trailing window ending today.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        days: i64,
    ) -> Self {
        let fallback = Self::trailing(today, days);
        Self {
            start: start.unwrap_or(fallback.start),
            end: end.unwrap_or(fallback.end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
