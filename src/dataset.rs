/*!
 * Record filtering and market partitioning
 *
 * A `PartitionedDataset` holds the escalation records of one period grouped
 * by market code. Sheets are absorbed one at a time; the same market seen in
 * several sheets or files accumulates rows.
 */

use std::collections::{BTreeMap, HashSet};
use serde::Serialize;

use crate::data_types::Record;

/// Allow-list filter on the escalation category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    allowed: Vec<String>,
}

impl RecordFilter {
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        Self {
            allowed: allowed.iter().map(|s| s.as_ref().trim().to_string()).collect(),
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Whether the record's escalation category is allow-listed
    pub fn matches(&self, record: &Record) -> bool {
        record.escalation_path.as_deref()
            .map(|path| self.allowed.iter().any(|a| a == path))
            .unwrap_or(false)
    }
}

/// Records of one market
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSlice {
    /// Canonical fields seen in any contributing sheet, in canonical order
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl MarketSlice {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.columns.iter().any(|c| c == field)
    }

    /// Records in a given escalation category
    pub fn category_count(&self, category: &str) -> usize {
        self.records.iter()
            .filter(|r| r.escalation_path.as_deref() == Some(category))
            .count()
    }
}

/// Counters from absorbing one or more sheets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub rows_scanned: usize,
    /// Rows whose category passed the filter
    pub rows_matched: usize,
    /// Matched rows dropped for a blank market code
    pub rows_without_market: usize,
    pub retained_per_market: BTreeMap<String, usize>,
}

impl PartitionStats {
    pub fn rows_retained(&self) -> usize {
        self.retained_per_market.values().sum()
    }

    pub fn merge(&mut self, other: &PartitionStats) {
        self.rows_scanned += other.rows_scanned;
        self.rows_matched += other.rows_matched;
        self.rows_without_market += other.rows_without_market;
        for (market, count) in &other.retained_per_market {
            *self.retained_per_market.entry(market.clone()).or_insert(0) += count;
        }
    }
}

/// Market code -> records for one period
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedDataset {
    field_order: Vec<String>,
    markets: BTreeMap<String, MarketSlice>,
}

impl PartitionedDataset {
    /// Empty dataset whose slices order columns by `field_order`
    pub fn new(field_order: Vec<String>) -> Self {
        Self {
            field_order,
            markets: BTreeMap::new(),
        }
    }

    /// Filter and partition the records of one sheet
    ///
    /// `fields` are the canonical fields the sheet exposed. Records outside
    /// the allow-list or without a market code are dropped.
    pub fn absorb<I>(&mut self, records: I, fields: &[String], filter: &RecordFilter) -> PartitionStats
    where
        I: IntoIterator<Item = Record>,
    {
        let mut stats = PartitionStats::default();
        let mut touched: HashSet<String> = HashSet::new();

        for record in records {
            stats.rows_scanned += 1;
            if !filter.matches(&record) {
                continue;
            }
            stats.rows_matched += 1;

            let market = match record.market_code.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() => code.to_string(),
                _ => {
                    stats.rows_without_market += 1;
                    continue;
                }
            };

            *stats.retained_per_market.entry(market.clone()).or_insert(0) += 1;
            touched.insert(market.clone());
            self.markets.entry(market).or_default().records.push(record);
        }

        for market in touched {
            if let Some(slice) = self.markets.get_mut(&market) {
                slice.columns = merge_columns(&self.field_order, &slice.columns, fields);
            }
        }

        stats
    }

    pub fn market(&self, code: &str) -> Option<&MarketSlice> {
        self.markets.get(code)
    }

    /// Market codes in sorted order
    pub fn market_codes(&self) -> Vec<String> {
        self.markets.keys().cloned().collect()
    }

    pub fn markets(&self) -> impl Iterator<Item = (&String, &MarketSlice)> {
        self.markets.iter()
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    pub fn total_records(&self) -> usize {
        self.markets.values().map(MarketSlice::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn field_order(&self) -> &[String] {
        &self.field_order
    }

    pub fn statistics(&self) -> DatasetStatistics {
        DatasetStatistics::from_dataset(self)
    }
}

/// Union of two column lists, ordered by the canonical order
fn merge_columns(order: &[String], existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = order.iter()
        .filter(|field| existing.contains(field) || incoming.contains(field))
        .cloned()
        .collect();
    // fields outside the canonical order go last, first-seen order
    for field in existing.iter().chain(incoming) {
        if !merged.contains(field) {
            merged.push(field.clone());
        }
    }
    merged
}

/// Per-period dataset statistics
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatistics {
    pub total_records: usize,
    pub market_count: usize,
    pub records_per_market: BTreeMap<String, usize>,
    pub unique_members: usize,
}

impl DatasetStatistics {
    pub fn from_dataset(dataset: &PartitionedDataset) -> Self {
        let mut members = HashSet::new();
        let mut records_per_market = BTreeMap::new();

        for (code, slice) in dataset.markets() {
            records_per_market.insert(code.clone(), slice.len());
            for record in &slice.records {
                if let Some(id) = &record.member_id {
                    members.insert((code.as_str(), id.as_str()));
                }
            }
        }

        Self {
            total_records: dataset.total_records(),
            market_count: dataset.market_count(),
            records_per_market,
            unique_members: members.len(),
        }
    }

    /// Print a formatted summary of the statistics
    pub fn print_summary(&self) {
        println!("=== Worklist Dataset Statistics ===");
        println!("Total Escalations: {}", self.total_records);
        println!("Markets: {}", self.market_count);
        println!("Unique Members: {}", self.unique_members);
        for (market, count) in &self.records_per_market {
            let share = if self.total_records > 0 {
                (*count as f64 / self.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", market, count, share);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{CellValue, FieldRoles, SourceRef};

    fn record(id: &str, market: &str, category: &str) -> Record {
        Record::new(
            vec![
                ("PayerMemberId".into(), CellValue::Text(id.into())),
                ("MarketCode".into(), CellValue::Text(market.into())),
                ("Escalation Path".into(), CellValue::Text(category.into())),
            ],
            &FieldRoles::default(),
            SourceRef::default(),
        )
    }

    fn fields() -> Vec<String> {
        vec!["PayerMemberId".into(), "MarketCode".into(), "Escalation Path".into()]
    }

    fn filter() -> RecordFilter {
        RecordFilter::new(&["Market/PHO Escalation", "Practice Escalation"])
    }

    #[test]
    fn test_partition_is_exhaustive_and_exclusive() {
        let mut dataset = PartitionedDataset::new(fields());
        let stats = dataset.absorb(
            vec![
                record("1", "AZ", "Practice Escalation"),
                record("2", " AZ ", "Market/PHO Escalation"),
                record("3", "TX", "Practice Escalation"),
                record("4", "TX", "No Escalation"),
                record("5", "", "Practice Escalation"),
            ],
            &fields(),
            &filter(),
        );

        assert_eq!(stats.rows_scanned, 5);
        assert_eq!(stats.rows_matched, 4);
        assert_eq!(stats.rows_without_market, 1);
        assert_eq!(stats.rows_retained(), dataset.total_records());
        assert_eq!(dataset.market("AZ").map(MarketSlice::len), Some(2));
        assert_eq!(dataset.market("TX").map(MarketSlice::len), Some(1));
        assert_eq!(dataset.market_codes(), vec!["AZ", "TX"]);
    }

    #[test]
    fn test_markets_accumulate_across_sheets() {
        let mut dataset = PartitionedDataset::new(fields());
        dataset.absorb(vec![record("1", "AZ", "Practice Escalation")], &fields(), &filter());
        dataset.absorb(vec![record("2", "AZ", "Practice Escalation")], &fields(), &filter());
        assert_eq!(dataset.market("AZ").map(MarketSlice::len), Some(2));
    }

    #[test]
    fn test_no_matching_rows_contributes_nothing() {
        let mut dataset = PartitionedDataset::new(fields());
        let stats = dataset.absorb(vec![record("1", "AZ", "Closed")], &fields(), &filter());
        assert_eq!(stats.rows_matched, 0);
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_columns_keep_canonical_order() {
        let order: Vec<String> = vec!["A".into(), "B".into(), "C".into()];
        let merged = merge_columns(&order, &["C".to_string()], &["A".to_string(), "X".to_string()]);
        assert_eq!(merged, vec!["A", "C", "X"]);
    }
}
