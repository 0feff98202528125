/*!
 * Reconciliation properties over partitioned datasets
 */

use medadh::prelude::*;

const ID: &str = "PayerMemberId";
const PRACTICE_FIELD: &str = "PracticeName";

fn fields() -> Vec<String> {
    ["PayerMemberId", "MarketCode", "PracticeName", "Escalation Path"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn record(id: &str, market: &str) -> Record {
    Record::new(
        vec![
            ("PayerMemberId".into(), CellValue::Text(id.into())),
            ("MarketCode".into(), CellValue::Text(market.into())),
            ("PracticeName".into(), CellValue::Text(format!("{} Practice", market))),
            ("Escalation Path".into(), CellValue::Text("Practice Escalation".into())),
        ],
        &FieldRoles::default(),
        SourceRef::default(),
    )
}

fn dataset(rows: &[(&str, &str)]) -> PartitionedDataset {
    let mut dataset = PartitionedDataset::new(fields());
    let filter = RecordFilter::new(&["Practice Escalation", "Market/PHO Escalation"]);
    dataset.absorb(rows.iter().map(|(id, market)| record(id, market)), &fields(), &filter);
    dataset
}

fn current() -> PartitionedDataset {
    dataset(&[
        ("1", "AZ"), ("2", "AZ"), ("3", "AZ"),
        ("11", "TX"), ("12", "TX"), ("13", "TX"), ("14", "TX"), ("15", "TX"),
    ])
}

fn previous() -> PartitionedDataset {
    dataset(&[
        ("1", "AZ"), ("2", "AZ"),
        ("11", "TX"), ("12", "TX"), ("16", "TX"),
        ("21", "ATL"),
    ])
}

#[test]
fn test_az_scenario() {
    let current = current();
    let previous = previous();
    let result = reconcile("AZ", current.market("AZ"), previous.market("AZ"), ID, PRACTICE_FIELD);

    assert_eq!(current.market("AZ").unwrap().len(), 3);
    assert_eq!(current.market("TX").unwrap().len(), 5);
    assert_eq!(result.new_ids.iter().collect::<Vec<_>>(), vec!["3"]);
    assert!(result.resolved_ids.is_empty());
    assert_eq!(result.net_change(), 1);
    assert_eq!(result.new_records.len(), 1);
    assert!(result.resolved_records.is_empty());
}

#[test]
fn test_swap_exchanges_new_and_resolved() {
    let a = current();
    let b = previous();
    let forward = reconcile_all(&a, &b, ID, PRACTICE_FIELD);
    let backward = reconcile_all(&b, &a, ID, PRACTICE_FIELD);

    assert_eq!(forward.keys().collect::<Vec<_>>(), backward.keys().collect::<Vec<_>>());
    for (market, f) in &forward {
        let r = &backward[market];
        assert_eq!(f.new_ids, r.resolved_ids, "market {}", market);
        assert_eq!(f.resolved_ids, r.new_ids, "market {}", market);
        assert_eq!(f.net_change(), -r.net_change(), "market {}", market);
    }
}

#[test]
fn test_self_reconciliation_is_empty() {
    let a = current();
    for (market, result) in reconcile_all(&a, &a, ID, PRACTICE_FIELD) {
        assert!(result.new_ids.is_empty(), "market {}", market);
        assert!(result.resolved_ids.is_empty(), "market {}", market);
        assert_eq!(result.net_change(), 0);
    }
}

#[test]
fn test_market_only_in_previous_week() {
    let current = current();
    let previous = previous();
    let all = reconcile_all(&current, &previous, ID, PRACTICE_FIELD);

    let atl = &all["ATL"];
    assert!(atl.current_ids.is_empty());
    assert_eq!(atl.resolved_ids.len(), 1);
    assert_eq!(atl.summary().net_change, -1);
    assert!(!atl.diagnostics.is_empty());
}

#[test]
fn test_partition_is_exhaustive_and_exclusive() {
    let data = current();
    let per_market: usize = data.markets().map(|(_, slice)| slice.len()).sum();
    assert_eq!(per_market, data.total_records());
    assert_eq!(data.total_records(), 8);
}
