/*!
 * Week-over-week reconciliation
 *
 * Compares one market's current and previous slices by member identifier.
 * A missing slice or a slice without the identifier column counts as an
 * empty id set, so a market with no baseline still reconciles.
 */

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::Serialize;

use crate::data_types::{CellValue, Record};
use crate::dataset::{MarketSlice, PartitionedDataset};

/// Set differences between two periods for one market
#[derive(Debug, Clone)]
pub struct ComparisonResult<'a> {
    pub market: String,
    pub id_field: String,
    pub current_ids: BTreeSet<String>,
    pub previous_ids: BTreeSet<String>,
    /// In current, not in previous
    pub new_ids: BTreeSet<String>,
    /// In previous, not in current
    pub resolved_ids: BTreeSet<String>,
    /// First current row per new id, in input order
    pub new_records: Vec<&'a Record>,
    /// First previous row per resolved id, in input order
    pub resolved_records: Vec<&'a Record>,
    pub current_columns: Vec<String>,
    pub previous_columns: Vec<String>,
    pub current_practices: usize,
    pub previous_practices: usize,
    pub diagnostics: Vec<String>,
}

/// Scalar counts of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub current_total: usize,
    pub previous_total: usize,
    pub new_count: usize,
    pub resolved_count: usize,
    pub net_change: i64,
    pub current_practices: usize,
    pub previous_practices: usize,
}

impl<'a> ComparisonResult<'a> {
    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            current_total: self.current_ids.len(),
            previous_total: self.previous_ids.len(),
            new_count: self.new_ids.len(),
            resolved_count: self.resolved_ids.len(),
            net_change: self.net_change(),
            current_practices: self.current_practices,
            previous_practices: self.previous_practices,
        }
    }

    /// |current ids| - |previous ids|
    pub fn net_change(&self) -> i64 {
        self.current_ids.len() as i64 - self.previous_ids.len() as i64
    }

    pub fn has_baseline(&self) -> bool {
        !self.previous_ids.is_empty()
    }

    /// Metric/Value rows for the "WoW Summary" sheet
    pub fn summary_rows(&self, generated_at: NaiveDateTime) -> Vec<(String, CellValue)> {
        let s = self.summary();
        vec![
            ("Current Week Escalations".to_string(), CellValue::Number(s.current_total as f64)),
            ("Previous Week Escalations".to_string(), CellValue::Number(s.previous_total as f64)),
            ("New Escalations This Week".to_string(), CellValue::Number(s.new_count as f64)),
            ("Removed Since Last Week".to_string(), CellValue::Number(s.resolved_count as f64)),
            ("Net Change".to_string(), CellValue::Number(s.net_change as f64)),
            ("Current Week Practice Count".to_string(), CellValue::Number(s.current_practices as f64)),
            ("Previous Week Practice Count".to_string(), CellValue::Number(s.previous_practices as f64)),
            (
                "Report Generated".to_string(),
                CellValue::Text(generated_at.format(crate::REPORT_TIMESTAMP_FORMAT).to_string()),
            ),
        ]
    }
}

/// Identifiers of a slice, or `None` when the slice cannot provide them
fn id_set(slice: Option<&MarketSlice>, id_field: &str) -> Option<BTreeSet<String>> {
    let slice = slice?;
    if !slice.has_column(id_field) {
        return None;
    }
    Some(slice.records.iter().filter_map(|r| r.text(id_field)).collect())
}

fn practice_count(slice: Option<&MarketSlice>, practice_field: &str) -> usize {
    slice
        .map(|s| {
            s.records.iter()
                .filter_map(|r| r.text(practice_field))
                .collect::<HashSet<_>>()
                .len()
        })
        .unwrap_or(0)
}

/// First record per identifier among those in `wanted`
fn first_per_id<'a>(slice: Option<&'a MarketSlice>, id_field: &str, wanted: &BTreeSet<String>) -> Vec<&'a Record> {
    let mut seen = HashSet::new();
    slice
        .map(|s| {
            s.records.iter()
                .filter(|r| match r.text(id_field) {
                    Some(id) => wanted.contains(&id) && seen.insert(id),
                    None => false,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reconcile one market's current slice against its previous slice
pub fn reconcile<'a>(
    market: &str,
    current: Option<&'a MarketSlice>,
    previous: Option<&'a MarketSlice>,
    id_field: &str,
    practice_field: &str,
) -> ComparisonResult<'a> {
    let mut diagnostics = Vec::new();

    let current_ids = id_set(current, id_field).unwrap_or_else(|| {
        let note = format!("Comparison id '{}' not in current data for {}", id_field, market);
        warn!("{}", note);
        diagnostics.push(note);
        BTreeSet::new()
    });
    let previous_ids = id_set(previous, id_field).unwrap_or_else(|| {
        let note = format!("Comparison id '{}' not in previous data for {}; no baseline available", id_field, market);
        warn!("{}", note);
        diagnostics.push(note);
        BTreeSet::new()
    });

    let new_ids: BTreeSet<String> = current_ids.difference(&previous_ids).cloned().collect();
    let resolved_ids: BTreeSet<String> = previous_ids.difference(&current_ids).cloned().collect();

    let new_records = first_per_id(current, id_field, &new_ids);
    let resolved_records = first_per_id(previous, id_field, &resolved_ids);

    debug!(
        "{}: {} current, {} previous, {} new, {} resolved",
        market,
        current_ids.len(),
        previous_ids.len(),
        new_ids.len(),
        resolved_ids.len()
    );

    ComparisonResult {
        market: market.to_string(),
        id_field: id_field.to_string(),
        current_practices: practice_count(current, practice_field),
        previous_practices: practice_count(previous, practice_field),
        current_columns: current.map(|s| s.columns.clone()).unwrap_or_default(),
        previous_columns: previous.map(|s| s.columns.clone()).unwrap_or_default(),
        current_ids,
        previous_ids,
        new_ids,
        resolved_ids,
        new_records,
        resolved_records,
        diagnostics,
    }
}

/// Reconcile every market present in either dataset
pub fn reconcile_all<'a>(
    current: &'a PartitionedDataset,
    previous: &'a PartitionedDataset,
    id_field: &str,
    practice_field: &str,
) -> BTreeMap<String, ComparisonResult<'a>> {
    let markets: BTreeSet<String> = current.market_codes()
        .into_iter()
        .chain(previous.market_codes())
        .collect();

    markets.into_iter()
        .map(|market| {
            let result = reconcile(
                &market,
                current.market(&market),
                previous.market(&market),
                id_field,
                practice_field,
            );
            (market, result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{FieldRoles, SourceRef};
    use chrono::NaiveDate;

    fn slice(ids: &[&str]) -> MarketSlice {
        let roles = FieldRoles::default();
        MarketSlice {
            columns: vec!["PayerMemberId".into(), "PracticeName".into()],
            records: ids.iter()
                .map(|id| Record::new(
                    vec![
                        ("PayerMemberId".into(), CellValue::Text(id.to_string())),
                        ("PracticeName".into(), CellValue::Text(format!("Practice {}", id))),
                    ],
                    &roles,
                    SourceRef::default(),
                ))
                .collect(),
        }
    }

    #[test]
    fn test_new_records_are_deduplicated_first_kept() {
        let current = slice(&["1", "3", "3", "2"]);
        let previous = slice(&["1", "2"]);
        let result = reconcile("AZ", Some(&current), Some(&previous), "PayerMemberId", "PracticeName");
        assert_eq!(result.new_records.len(), 1);
        assert!(std::ptr::eq(result.new_records[0], &current.records[1]));
        assert_eq!(result.summary().current_practices, 3);
    }

    #[test]
    fn test_missing_id_column_degrades_to_no_baseline() {
        let current = slice(&["1", "2"]);
        let mut previous = slice(&["1"]);
        previous.columns.retain(|c| c != "PayerMemberId");

        let result = reconcile("TX", Some(&current), Some(&previous), "PayerMemberId", "PracticeName");
        assert!(!result.has_baseline());
        assert_eq!(result.new_ids.len(), 2);
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_summary_rows_labels() {
        let current = slice(&["1"]);
        let result = reconcile("AZ", Some(&current), None, "PayerMemberId", "PracticeName");
        let at = NaiveDate::from_ymd_opt(2025, 4, 21).unwrap().and_hms_opt(9, 5, 0).unwrap();
        let rows = result.summary_rows(at);
        assert_eq!(rows[4], ("Net Change".to_string(), CellValue::Number(1.0)));
        assert_eq!(rows[7].1, CellValue::Text("2025-04-21 09:05".into()));
    }
}
