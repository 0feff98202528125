/*!
 * Canonical worklist schema and column resolution
 *
 * Worklist sheets are typed by hand, so the same logical field shows up as
 * "Escalation Path", "escalation path " or "ESCALATION PATH" depending on the
 * file. Resolution maps those headers onto the canonical names once per
 * sheet; nothing downstream looks at raw headers again.
 */

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::data_types::{CellValue, FieldRoles, Record, SourceRef};
use crate::error::{ErrorContext, MedAdhError, Result};

/// Known worklist fields
pub struct WorklistSchema;

impl WorklistSchema {
    /// Every field carried into a primary report, in output order
    pub fn full_columns() -> Vec<&'static str> {
        vec![
            // Patient and practice
            "LastImpactableDate",
            "PatientName",
            "DateOfBirth",
            "PracticeName",
            "PCP",

            // Outreach
            "Rx Status",
            "Call Disposition",
            "QS Notes",
            "Current Barrier",
            "Action",

            // Escalation
            "Escalation Path",
            "Escalation Timeframe",
            "Escalation Deadline",
            "Escalation Resolution",

            // Payer and member
            "PayerCode",
            "MarketCode",
            "PayerMemberId",
            "PatientPhoneNumber",
            "PatientAddress",
            "DataAsOfDate",
            "EMR ID",
            "United Flag",

            // Measure and gap
            "MedAdherenceMeasureCode",
            "NDCDesc",
            "Impact Category",
            "Gap Priority",
            "PDCNbr",
            "ADRNbr",
            "DaysMissedNbr",
            "Total Fills",

            // Fills
            "Initial Fill Date",
            "LastFillDate",
            "NextFillDate",
            "DrugDispensedQuantityNbr",
            "DrugDispensedDaysSupplyNbr",
            "Last Activity Date",
            "Task Status",
            "OneFillCode",

            // Prescriber and pharmacy
            "PrescriberNPI",
            "PrescribingName",
            "Prescriber Phone Number",
            "PharmacyStoreName",
            "PharmacyCommunicationNumberText",
        ]
    }

    /// Identifier and classification fields used for week-over-week work
    pub fn comparison_columns() -> Vec<&'static str> {
        vec![
            "PayerMemberId",
            "MarketCode",
            "PracticeName",
            "PCP",
            "Escalation Path",
            "Escalation Resolution",
            "Gap Completed",
            "PatientName",
        ]
    }

    /// Fields normalized to `MM/DD/YYYY`
    pub fn date_columns() -> Vec<&'static str> {
        vec![
            "LastImpactableDate",
            "DateOfBirth",
            "LastFillDate",
            "NextFillDate",
            "Initial Fill Date",
            "Last Activity Date",
            "DataAsOfDate",
            "Escalation Timeframe",
            "Escalation Deadline",
        ]
    }

    /// Fields a sheet must expose to be processed at all
    pub fn required_columns() -> Vec<&'static str> {
        vec!["Escalation Path", "MarketCode", "PayerMemberId"]
    }

    /// Escalation categories that make it into reports
    pub fn escalation_categories() -> Vec<&'static str> {
        vec!["Market/PHO Escalation", "Practice Escalation"]
    }

    /// Header row used for empty week-over-week listings
    pub fn fallback_listing_columns() -> Vec<&'static str> {
        vec!["PayerMemberId", "PatientName", "MarketCode", "PracticeName"]
    }
}

/// One resolved logical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    /// Canonical field name
    pub field: String,
    /// Header as it appears in the sheet (trimmed)
    pub header: String,
    /// Zero-based column index in the sheet
    pub index: usize,
}

/// Per-sheet mapping from canonical fields to physical columns
///
/// Entries follow the order of the desired field list, not the sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    entries: Vec<MappedColumn>,
}

impl ColumnMapping {
    pub fn entries(&self) -> &[MappedColumn] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|e| e.field == field)
    }

    /// Physical header for a canonical field
    pub fn header_for(&self, field: &str) -> Option<&str> {
        self.entries.iter()
            .find(|e| e.field == field)
            .map(|e| e.header.as_str())
    }

    /// Canonical fields present, in canonical order
    pub fn fields(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.field.clone()).collect()
    }

    /// Fields from `required` with no mapping
    pub fn missing<'r>(&self, required: &'r [String]) -> Vec<&'r str> {
        required.iter()
            .filter(|r| !self.contains(r))
            .map(|r| r.as_str())
            .collect()
    }

    /// Fail with `MissingRequiredColumns` unless every required field is mapped
    pub fn require(self, required: &[String], context: ErrorContext) -> Result<Self> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(self)
        } else {
            Err(MedAdhError::missing_columns(
                missing.into_iter().map(str::to_string).collect(),
                context,
            ))
        }
    }

    /// Turn one raw row into a canonical record
    ///
    /// Date fields are re-parsed; cells past the end of a short row are empty.
    pub fn project(
        &self,
        row: &[CellValue],
        date_fields: &[String],
        roles: &FieldRoles,
        source: SourceRef,
    ) -> Record {
        let values = self.entries.iter()
            .map(|entry| {
                let raw = row.get(entry.index).cloned().unwrap_or_default();
                let value = if date_fields.iter().any(|d| d == &entry.field) {
                    raw.to_date()
                } else {
                    raw
                };
                (entry.field.clone(), value)
            })
            .collect();
        Record::new(values, roles, source)
    }
}

/// Map desired logical fields onto the headers of one sheet
///
/// Matching is case-insensitive on trimmed headers. When two headers collide
/// after trimming, the leftmost wins. Unmatched fields are simply absent.
pub fn resolve_columns<D, H>(desired: &[D], headers: &[H]) -> ColumnMapping
where
    D: AsRef<str>,
    H: AsRef<str>,
{
    let mut by_key: HashMap<String, (usize, &str)> = HashMap::with_capacity(headers.len());
    for (index, header) in headers.iter().enumerate() {
        let trimmed = header.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        by_key.entry(trimmed.to_lowercase()).or_insert((index, trimmed));
    }

    let entries = desired.iter()
        .filter_map(|field| {
            let field = field.as_ref();
            by_key.get(&field.trim().to_lowercase()).map(|(index, header)| MappedColumn {
                field: field.to_string(),
                header: header.to_string(),
                index: *index,
            })
        })
        .collect();

    ColumnMapping { entries }
}

/// Column resolver bound to one desired field set and its required subset
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    desired: Vec<String>,
    required: Vec<String>,
}

impl ColumnResolver {
    pub fn new(desired: Vec<String>, required: Vec<String>) -> Self {
        Self { desired, required }
    }

    pub fn desired(&self) -> &[String] {
        &self.desired
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Resolve and check one sheet's headers
    pub fn resolve<H: AsRef<str>>(&self, headers: &[H], context: ErrorContext) -> Result<ColumnMapping> {
        resolve_columns(&self.desired, headers).require(&self.required, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lowercase_header_resolves_to_canonical_name() {
        let mapping = resolve_columns(&["Escalation Path"], &["escalation path"]);
        assert_eq!(mapping.header_for("Escalation Path"), Some("escalation path"));
    }

    #[test]
    fn test_resolution_ignores_header_order() {
        let desired = strings(&["PayerMemberId", "MarketCode", "Escalation Path"]);
        let a = resolve_columns(&desired, &["MARKETCODE", " payermemberid", "Escalation Path", "Notes"]);
        let b = resolve_columns(&desired, &["Notes", "Escalation Path", "MARKETCODE", " payermemberid"]);
        assert_eq!(a.fields(), b.fields());
        for field in &desired {
            assert_eq!(a.header_for(field), b.header_for(field));
        }
        assert_eq!(a.fields(), desired);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let mapping = resolve_columns(&["PCP"], &["pcp", "PCP "]);
        assert_eq!(mapping.entries()[0].index, 0);
    }

    #[test]
    fn test_missing_required_fields_are_reported_together() {
        let resolver = ColumnResolver::new(
            strings(&["PayerMemberId", "MarketCode", "Escalation Path", "PCP"]),
            strings(&["Escalation Path", "MarketCode", "PayerMemberId"]),
        );
        let err = resolver
            .resolve(&["PCP", "PayerMemberId"], ErrorContext::sheet("a.xlsx", "Sheet1"))
            .unwrap_err();
        match err {
            MedAdhError::MissingRequiredColumns { missing, context } => {
                assert_eq!(missing, vec!["Escalation Path", "MarketCode"]);
                assert_eq!(context.sheet_name.as_deref(), Some("Sheet1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_project_normalizes_dates_and_pads_short_rows() {
        let mapping = resolve_columns(
            &["PayerMemberId", "DateOfBirth", "PCP"],
            &["PayerMemberId", "DateOfBirth", "PCP"],
        );
        let record = mapping.project(
            &[CellValue::Number(7.0), CellValue::Text("1950-02-03".into())],
            &strings(&["DateOfBirth"]),
            &FieldRoles::default(),
            SourceRef::default(),
        );
        assert_eq!(record.text("DateOfBirth").as_deref(), Some("02/03/1950"));
        assert_eq!(record.get("PCP"), Some(&CellValue::Empty));
        assert_eq!(record.member_id.as_deref(), Some("7"));
    }
}
