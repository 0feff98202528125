/*!
 * Data type definitions for worklist records
 *
 * Cells arrive loosely typed from spreadsheets; a `Record` is only built
 * after the sheet's headers have been resolved to canonical field names.
 */

use std::fmt;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Output format for every date field
pub const DATE_OUTPUT_FORMAT: &str = "%m/%d/%Y";

/// Text date layouts accepted when normalizing date fields
const DATE_INPUT_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// True for empty cells and whitespace-only text
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Trimmed textual form, `None` for empty cells
    ///
    /// Integral numbers drop their fractional part so identifiers read as
    /// `12345.0` and `"12345"` compare equal.
    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.to_string().trim().to_string())
    }

    /// Re-interpret the cell as a date; anything unparseable becomes `Empty`
    pub fn to_date(&self) -> CellValue {
        let parsed = match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Number(n) => excel_serial_to_date(*n),
            CellValue::Text(s) => parse_date_permissive(s),
            CellValue::Empty | CellValue::Bool(_) => None,
        };
        parsed.map(CellValue::Date).unwrap_or(CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(d) => write!(f, "{}", d.format(DATE_OUTPUT_FORMAT)),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Convert an Excel serial day number (1900 date system) to a date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // 2958465 is 9999-12-31
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(chrono::Days::new(serial.floor() as u64))
}

/// Parse a date from free text, trying the common worklist layouts
pub fn parse_date_permissive(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }
    None
}

/// Where a record was read from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    pub sheet: String,
    /// 1-based spreadsheet row, header included
    pub row: usize,
}

/// One worklist row in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique member identifier
    pub member_id: Option<String>,
    /// Market code, trimmed
    pub market_code: Option<String>,
    /// Escalation category (e.g. "Practice Escalation")
    pub escalation_path: Option<String>,
    pub practice_name: Option<String>,
    pub provider: Option<String>,
    /// Canonical field name -> value, in canonical order
    values: Vec<(String, CellValue)>,
    pub source: SourceRef,
}

impl Record {
    /// Build a record from already-canonical values
    pub fn new(values: Vec<(String, CellValue)>, roles: &FieldRoles, source: SourceRef) -> Self {
        let lookup = |field: &str| {
            values.iter()
                .find(|(name, _)| name == field)
                .and_then(|(_, v)| v.as_text())
        };
        Self {
            member_id: lookup(&roles.member_id),
            market_code: lookup(&roles.market_code),
            escalation_path: lookup(&roles.escalation_path),
            practice_name: lookup(&roles.practice_name),
            provider: lookup(&roles.provider),
            values,
            source,
        }
    }

    /// Value of a canonical field, if the source sheet had it
    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.values.iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Trimmed text of a canonical field
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).and_then(CellValue::as_text)
    }

    /// All canonical fields carried by this record
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    /// Values laid out for the given column order; absent fields are empty
    pub fn row_for(&self, columns: &[String]) -> Vec<CellValue> {
        columns.iter()
            .map(|c| self.get(c).cloned().unwrap_or_default())
            .collect()
    }
}

/// Which canonical fields carry the typed roles of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRoles {
    #[serde(default = "default_member_id")]
    pub member_id: String,
    #[serde(default = "default_market_code")]
    pub market_code: String,
    #[serde(default = "default_escalation_path")]
    pub escalation_path: String,
    #[serde(default = "default_practice_name")]
    pub practice_name: String,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_member_id() -> String {
    "PayerMemberId".to_string()
}

fn default_market_code() -> String {
    "MarketCode".to_string()
}

fn default_escalation_path() -> String {
    "Escalation Path".to_string()
}

fn default_practice_name() -> String {
    "PracticeName".to_string()
}

fn default_provider() -> String {
    "PCP".to_string()
}

impl Default for FieldRoles {
    fn default() -> Self {
        Self {
            member_id: default_member_id(),
            market_code: default_market_code(),
            escalation_path: default_escalation_path(),
            practice_name: default_practice_name(),
            provider: default_provider(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_numbers_render_without_fraction() {
        assert_eq!(CellValue::Number(12345.0).as_text().as_deref(), Some("12345"));
        assert_eq!(CellValue::Number(0.85).as_text().as_deref(), Some("0.85"));
        assert_eq!(CellValue::Text("  AZ ".into()).as_text().as_deref(), Some("AZ"));
        assert_eq!(CellValue::Text("   ".into()).as_text(), None);
    }

    #[test]
    fn test_to_date_is_permissive() {
        let expected = NaiveDate::from_ymd_opt(2025, 4, 21).unwrap();
        assert_eq!(CellValue::Text("2025-04-21".into()).to_date(), CellValue::Date(expected));
        assert_eq!(CellValue::Text("4/21/2025".into()).to_date(), CellValue::Date(expected));
        assert_eq!(CellValue::Text("2025-04-21 13:45:00".into()).to_date(), CellValue::Date(expected));
        assert_eq!(CellValue::Number(45768.0).to_date(), CellValue::Date(expected));
        assert_eq!(CellValue::Text("pending".into()).to_date(), CellValue::Empty);
        assert_eq!(CellValue::Bool(true).to_date(), CellValue::Empty);
    }

    #[test]
    fn test_dates_render_as_month_day_year() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(CellValue::Date(date).to_string(), "01/05/2024");
    }

    #[test]
    fn test_record_roles_come_from_canonical_fields() {
        let roles = FieldRoles::default();
        let record = Record::new(
            vec![
                ("PayerMemberId".into(), CellValue::Number(42.0)),
                ("MarketCode".into(), CellValue::Text(" TX ".into())),
                ("Escalation Path".into(), CellValue::Text("Practice Escalation".into())),
            ],
            &roles,
            SourceRef::default(),
        );
        assert_eq!(record.member_id.as_deref(), Some("42"));
        assert_eq!(record.market_code.as_deref(), Some("TX"));
        assert_eq!(record.practice_name, None);
        assert_eq!(
            record.row_for(&["MarketCode".into(), "PCP".into()]),
            vec![CellValue::Text(" TX ".into()), CellValue::Empty]
        );
    }
}
