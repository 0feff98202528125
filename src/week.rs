/*!
 * Week keys for reporting periods
 *
 * A week is identified by the month and day of its folder name
 * ("Week of 04.21"). Keys are validated up front so a bad key fails the
 * run before any file is touched.
 */

use std::fmt;
use std::str::FromStr;
use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{MedAdhError, Result};

/// Leap year used to validate month/day pairs without a year
const VALIDATION_YEAR: i32 = 2000;

lazy_static::lazy_static! {
    static ref WEEK_FOLDER_RE: Regex =
        Regex::new(r"Week of (\d{1,2})\.(\d{1,2})(?:\D|$)").expect("week folder pattern is valid");
}

/// A reporting week identified by month and day (`MM.DD`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    month: u32,
    day: u32,
}

impl WeekKey {
    /// Parse a week key in `MM.DD` form; `M.D` is accepted as well
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let (month_part, day_part) = trimmed
            .split_once('.')
            .ok_or_else(|| MedAdhError::invalid_date_key(value, "expected MM.DD with a '.' separator"))?;

        let month = parse_component(value, month_part, "month")?;
        let day = parse_component(value, day_part, "day")?;

        if NaiveDate::from_ymd_opt(VALIDATION_YEAR, month, day).is_none() {
            return Err(MedAdhError::invalid_date_key(
                value,
                format!("{:02}.{:02} is not a calendar date", month, day),
            ));
        }

        Ok(Self { month, day })
    }

    /// Build a key from a calendar date
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    /// Extract a week key from a folder name such as `"Week of 4.21"`
    pub fn from_folder_name(name: &str) -> Option<Self> {
        let caps = WEEK_FOLDER_RE.captures(name)?;
        let key = format!("{}.{}", &caps[1], &caps[2]);
        Self::parse(&key).ok()
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Zero-padded form, e.g. `04.21`
    pub fn padded(&self) -> String {
        format!("{:02}.{:02}", self.month, self.day)
    }

    /// Un-padded form, e.g. `4.21`
    pub fn unpadded(&self) -> String {
        format!("{}.{}", self.month, self.day)
    }

    /// Folder token for the padded form
    pub fn folder_token(&self) -> String {
        format!("Week of {}", self.padded())
    }

    /// Folder token for the un-padded form
    pub fn unpadded_folder_token(&self) -> String {
        format!("Week of {}", self.unpadded())
    }

    /// Calendar date of this key in the given year
    pub fn date_in(&self, year: i32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day).ok_or_else(|| {
            MedAdhError::invalid_date_key(&self.padded(), format!("does not exist in {}", year))
        })
    }

    /// The week seven days earlier, crossing month and year boundaries
    pub fn previous(&self, year: i32) -> Result<WeekKey> {
        let date = self.date_in(year)?;
        let earlier = date
            .checked_sub_days(Days::new(7))
            .ok_or_else(|| MedAdhError::invalid_date_key(&self.padded(), "previous week is out of range"))?;
        Ok(Self::from_date(earlier))
    }
}

fn parse_component(original: &str, part: &str, what: &str) -> Result<u32> {
    if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(MedAdhError::invalid_date_key(
            original,
            format!("{} must be one or two digits", what),
        ));
    }
    part.parse::<u32>()
        .map_err(|e| MedAdhError::invalid_date_key(original, format!("{}: {}", what, e)))
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.padded())
    }
}

impl FromStr for WeekKey {
    type Err = MedAdhError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_padded_and_unpadded() {
        let padded = WeekKey::parse("04.21").unwrap();
        let unpadded = WeekKey::parse("4.21").unwrap();
        assert_eq!(padded, unpadded);
        assert_eq!(padded.padded(), "04.21");
        assert_eq!(padded.unpadded(), "4.21");
        assert_eq!(padded.to_string(), "04.21");
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        for bad in ["", "0421", "13.01", "02.30", "4-21", "04.2a", "004.21", "04."] {
            let err = WeekKey::parse(bad).unwrap_err();
            assert!(matches!(err, MedAdhError::InvalidDateKey { .. }), "{} should be invalid", bad);
        }
    }

    #[test]
    fn test_leap_day_parses_but_needs_leap_year() {
        let key = WeekKey::parse("02.29").unwrap();
        assert!(key.date_in(2024).is_ok());
        assert!(key.date_in(2025).is_err());
    }

    #[test]
    fn test_previous_week_crosses_boundaries() {
        assert_eq!(WeekKey::parse("04.28").unwrap().previous(2025).unwrap().padded(), "04.21");
        assert_eq!(WeekKey::parse("03.03").unwrap().previous(2024).unwrap().padded(), "02.25");
        assert_eq!(WeekKey::parse("01.05").unwrap().previous(2025).unwrap().padded(), "12.29");
    }

    #[test]
    fn test_from_folder_name() {
        assert_eq!(
            WeekKey::from_folder_name("Week of 4.21"),
            Some(WeekKey::parse("04.21").unwrap())
        );
        assert_eq!(
            WeekKey::from_folder_name("2025 Week of 11.18 (final)"),
            Some(WeekKey::parse("11.18").unwrap())
        );
        assert_eq!(WeekKey::from_folder_name("Week of 13.45"), None);
        assert_eq!(WeekKey::from_folder_name("Archive"), None);
    }
}
