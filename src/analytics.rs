/*!
 * Escalation analytics for one market
 *
 * Builds the practice and provider cross-tabulations (group x escalation
 * category) and the summary metrics table. When a slice lacks a column the
 * cross-tabs need, only the summary is produced.
 */

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use log::warn;
use serde::Serialize;

use crate::data_types::{CellValue, FieldRoles, Record};
use crate::dataset::MarketSlice;

/// Label for provider rows with no provider name
pub const UNKNOWN_PROVIDER: &str = "Unknown Provider";

/// Label of the totals row and column
pub const TOTAL_LABEL: &str = "Total";

/// One group of a cross-tabulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossTabRow {
    pub group: String,
    /// Counts aligned with `CrossTab::categories`
    pub counts: Vec<usize>,
    pub total: usize,
}

/// Group x category counts with totals
///
/// `rows` holds the groups only, highest total first; the totals row is
/// kept separately in `totals` / `grand_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossTab {
    /// Canonical field the rows are grouped by
    pub dimension: String,
    pub categories: Vec<String>,
    pub rows: Vec<CrossTabRow>,
    pub totals: Vec<usize>,
    pub grand_total: usize,
}

impl CrossTab {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count for one group and category
    pub fn count(&self, group: &str, category: &str) -> Option<usize> {
        let col = self.categories.iter().position(|c| c == category)?;
        self.rows.iter()
            .find(|r| r.group == group)
            .map(|r| r.counts[col])
    }
}

/// Ordered Metric/Value table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    pub rows: Vec<(String, CellValue)>,
}

impl SummaryTable {
    pub fn value(&self, metric: &str) -> Option<&CellValue> {
        self.rows.iter()
            .find(|(m, _)| m == metric)
            .map(|(_, v)| v)
    }
}

/// Everything the reporting engine builds from one market slice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotSet {
    pub practice: Option<CrossTab>,
    pub provider: Option<CrossTab>,
    pub summary: SummaryTable,
}

/// Analytics over one market slice
pub struct EscalationAnalytics<'a> {
    slice: &'a MarketSlice,
    roles: &'a FieldRoles,
    categories: &'a [String],
}

impl<'a> EscalationAnalytics<'a> {
    /// `categories` fixes the order of category columns
    pub fn new(slice: &'a MarketSlice, roles: &'a FieldRoles, categories: &'a [String]) -> Self {
        Self { slice, roles, categories }
    }

    fn records(&self) -> &'a [Record] {
        &self.slice.records
    }

    /// Whether the slice has every column the cross-tabs need
    pub fn missing_pivot_columns(&self) -> Vec<&'a str> {
        [
            self.roles.practice_name.as_str(),
            self.roles.provider.as_str(),
            self.roles.escalation_path.as_str(),
            self.roles.member_id.as_str(),
        ]
        .into_iter()
        .filter(|field| !self.slice.has_column(field))
        .collect()
    }

    /// Counts by practice; rows without a practice are left out
    pub fn practice_crosstab(&self) -> CrossTab {
        self.crosstab(&self.roles.practice_name, |r| r.practice_name.clone())
    }

    /// Counts by provider; rows without a provider count as "Unknown Provider"
    pub fn provider_crosstab(&self) -> CrossTab {
        self.crosstab(&self.roles.provider, |r| {
            Some(r.provider.clone().unwrap_or_else(|| UNKNOWN_PROVIDER.to_string()))
        })
    }

    /// Cross-tabulate by the group key `key_of` produces
    ///
    /// Cells count rows with a member id. Only allow-listed categories that
    /// actually occur become columns.
    pub fn crosstab<F>(&self, dimension: &str, key_of: F) -> CrossTab
    where
        F: Fn(&Record) -> Option<String>,
    {
        let present: HashSet<&str> = self.records().iter()
            .filter_map(|r| r.escalation_path.as_deref())
            .collect();
        let categories: Vec<String> = self.categories.iter()
            .filter(|c| present.contains(c.as_str()))
            .cloned()
            .collect();

        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for record in self.records() {
            let Some(group) = key_of(record) else { continue };
            let counts = groups.entry(group).or_insert_with(|| vec![0; categories.len()]);
            if record.member_id.is_none() {
                continue;
            }
            if let Some(col) = record.escalation_path.as_deref()
                .and_then(|path| categories.iter().position(|c| c == path))
            {
                counts[col] += 1;
            }
        }

        let mut rows: Vec<CrossTabRow> = groups.into_iter()
            .map(|(group, counts)| CrossTabRow {
                total: counts.iter().sum(),
                group,
                counts,
            })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.group.cmp(&b.group)));

        let totals: Vec<usize> = (0..categories.len())
            .map(|col| rows.iter().map(|r| r.counts[col]).sum())
            .collect();
        let grand_total = totals.iter().sum();

        CrossTab {
            dimension: dimension.to_string(),
            categories,
            rows,
            totals,
            grand_total,
        }
    }

    /// Total, per-category, distinct practice and provider counts
    pub fn summary(&self, generated_at: NaiveDateTime) -> SummaryTable {
        let records = self.records();
        let mut rows = vec![(
            "Total Escalations".to_string(),
            CellValue::Number(records.len() as f64),
        )];

        for category in self.categories {
            let count = records.iter()
                .filter(|r| r.escalation_path.as_deref() == Some(category.as_str()))
                .count();
            rows.push((format!("{}s", category), CellValue::Number(count as f64)));
        }

        let distinct = |key: fn(&Record) -> Option<&String>| {
            records.iter().filter_map(key).collect::<HashSet<_>>().len()
        };
        rows.push((
            "Unique Practices".to_string(),
            CellValue::Number(distinct(|r| r.practice_name.as_ref()) as f64),
        ));
        rows.push((
            "Unique Providers".to_string(),
            CellValue::Number(distinct(|r| r.provider.as_ref()) as f64),
        ));
        rows.push((
            "Report Generated".to_string(),
            CellValue::Text(generated_at.format(crate::REPORT_TIMESTAMP_FORMAT).to_string()),
        ));

        SummaryTable { rows }
    }

    /// Both cross-tabs and the summary, or the summary alone when columns are missing
    pub fn pivots(&self, generated_at: NaiveDateTime) -> PivotSet {
        let summary = self.summary(generated_at);
        let missing = self.missing_pivot_columns();
        if !missing.is_empty() {
            warn!("Cross-tabs skipped, missing columns: {}", missing.join(", "));
            return PivotSet { practice: None, provider: None, summary };
        }

        PivotSet {
            practice: Some(self.practice_crosstab()),
            provider: Some(self.provider_crosstab()),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::SourceRef;
    use chrono::NaiveDate;

    const PRACTICE: &str = "Practice Escalation";
    const MARKET: &str = "Market/PHO Escalation";

    fn record(id: Option<&str>, practice: Option<&str>, provider: Option<&str>, category: &str) -> Record {
        let text = |v: Option<&str>| v.map(|s| CellValue::Text(s.into())).unwrap_or_default();
        Record::new(
            vec![
                ("PayerMemberId".into(), text(id)),
                ("MarketCode".into(), CellValue::Text("AZ".into())),
                ("PracticeName".into(), text(practice)),
                ("PCP".into(), text(provider)),
                ("Escalation Path".into(), CellValue::Text(category.into())),
            ],
            &FieldRoles::default(),
            SourceRef::default(),
        )
    }

    fn slice() -> MarketSlice {
        MarketSlice {
            columns: vec![
                "PayerMemberId".into(),
                "MarketCode".into(),
                "PracticeName".into(),
                "PCP".into(),
                "Escalation Path".into(),
            ],
            records: vec![
                record(Some("1"), Some("North"), Some("Dr. A"), PRACTICE),
                record(Some("2"), Some("North"), Some("Dr. A"), MARKET),
                record(Some("3"), Some("South"), None, PRACTICE),
                record(Some("4"), Some("East"), Some("Dr. B"), PRACTICE),
                record(Some("5"), None, Some("Dr. B"), PRACTICE),
                record(None, Some("South"), Some("Dr. C"), PRACTICE),
            ],
        }
    }

    fn categories() -> Vec<String> {
        vec![MARKET.to_string(), PRACTICE.to_string()]
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 21).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn test_practice_crosstab_sorted_with_consistent_totals() {
        let slice = slice();
        let roles = FieldRoles::default();
        let cats = categories();
        let tab = EscalationAnalytics::new(&slice, &roles, &cats).practice_crosstab();

        let groups: Vec<_> = tab.rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["North", "East", "South"]);
        assert_eq!(tab.count("North", MARKET), Some(1));
        // null member id is not counted
        assert_eq!(tab.count("South", PRACTICE), Some(1));

        for row in &tab.rows {
            assert_eq!(row.total, row.counts.iter().sum::<usize>());
        }
        assert_eq!(tab.totals, vec![1, 3]);
        assert_eq!(tab.grand_total, 4);
    }

    #[test]
    fn test_provider_crosstab_labels_unknown() {
        let slice = slice();
        let roles = FieldRoles::default();
        let cats = categories();
        let tab = EscalationAnalytics::new(&slice, &roles, &cats).provider_crosstab();
        assert_eq!(tab.count(UNKNOWN_PROVIDER, PRACTICE), Some(1));
        assert_eq!(tab.grand_total, 5);
    }

    #[test]
    fn test_summary_metrics() {
        let slice = slice();
        let roles = FieldRoles::default();
        let cats = categories();
        let summary = EscalationAnalytics::new(&slice, &roles, &cats).summary(at());
        assert_eq!(summary.value("Total Escalations"), Some(&CellValue::Number(6.0)));
        assert_eq!(summary.value("Practice Escalations"), Some(&CellValue::Number(5.0)));
        assert_eq!(summary.value("Market/PHO Escalations"), Some(&CellValue::Number(1.0)));
        assert_eq!(summary.value("Unique Practices"), Some(&CellValue::Number(3.0)));
        assert_eq!(summary.value("Unique Providers"), Some(&CellValue::Number(3.0)));
        assert_eq!(summary.value("Report Generated"), Some(&CellValue::Text("2025-04-21 08:00".into())));
    }

    #[test]
    fn test_missing_columns_degrade_to_summary() {
        let mut slice = slice();
        slice.columns.retain(|c| c != "PCP");
        let roles = FieldRoles::default();
        let cats = categories();
        let pivots = EscalationAnalytics::new(&slice, &roles, &cats).pivots(at());
        assert!(pivots.practice.is_none());
        assert!(pivots.provider.is_none());
        assert_eq!(pivots.summary.rows.len(), 6);
    }
}
