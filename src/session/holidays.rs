// =============================================================================
// Exchange holiday table
// =============================================================================
//
// The holiday list is data, not code: it loads from a JSON file at startup
// when one is configured and falls back to the built-in NSE/BSE list. The
// scheduler consults it on every tick, so swapping the table at runtime takes
// effect on the next minute boundary.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use tracing::info;

/// Built-in trading holidays (full-day closures, both exchanges).
const DEFAULT_HOLIDAYS: &[&str] = &[
    // 2025
    "2025-02-26",
    "2025-03-14",
    "2025-03-31",
    "2025-04-10",
    "2025-04-14",
    "2025-04-18",
    "2025-05-01",
    "2025-08-15",
    "2025-08-27",
    "2025-10-02",
    "2025-10-21",
    "2025-10-22",
    "2025-11-05",
    "2025-12-25",
    // 2026
    "2026-01-26",
    "2026-03-03",
    "2026-03-21",
    "2026-04-01",
    "2026-04-03",
    "2026-04-14",
    "2026-05-01",
    "2026-08-15",
    "2026-10-02",
    "2026-11-09",
    "2026-12-25",
];

/// Set of dates on which the market does not open.
#[derive(Debug, Clone)]
pub struct HolidayTable {
    dates: HashSet<NaiveDate>,
}

impl Default for HolidayTable {
    fn default() -> Self {
        let dates = DEFAULT_HOLIDAYS
            .iter()
            .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .collect();
        Self { dates }
    }
}

impl HolidayTable {
    /// Load a holiday table from a JSON array of `YYYY-MM-DD` strings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read holiday file {}", path.display()))?;
        let raw: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse holiday file {}", path.display()))?;

        let mut dates = HashSet::with_capacity(raw.len());
        for entry in &raw {
            let date = NaiveDate::parse_from_str(entry, "%Y-%m-%d")
                .with_context(|| format!("invalid holiday date: {entry}"))?;
            dates.insert(date);
        }

        info!(path = %path.display(), count = dates.len(), "holiday table loaded");
        Ok(Self { dates })
    }

    /// Load from `path` when given, otherwise use the built-in table.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// A trading day is a weekday that is not in the holiday set.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn default_table_contains_known_holidays() {
        let table = HolidayTable::default();
        assert!(table.is_holiday(date("2025-08-15"))); // Independence Day
        assert!(table.is_holiday(date("2026-01-26"))); // Republic Day
        assert!(!table.is_holiday(date("2025-08-14")));
    }

    #[test]
    fn weekends_are_not_trading_days() {
        let table = HolidayTable::default();
        assert!(!table.is_trading_day(date("2025-08-02"))); // Saturday
        assert!(!table.is_trading_day(date("2025-08-03"))); // Sunday
        assert!(table.is_trading_day(date("2025-08-04"))); // Monday
    }

    #[test]
    fn holiday_weekday_is_not_a_trading_day() {
        let table = HolidayTable::default();
        // 2025-08-15 falls on a Friday.
        assert!(!table.is_trading_day(date("2025-08-15")));
    }
}
