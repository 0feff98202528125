use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use medadh::prelude::*;
use medadh::schema::ColumnMapping;

const MARKETS: [&str; 6] = ["AZ", "TX", "CO", "MI", "KY", "ATL"];
const CATEGORIES: [&str; 3] = ["Practice Escalation", "Market/PHO Escalation", "Closed"];

fn headers() -> Vec<String> {
    // deliberately messy: case and padding differ from the canonical names
    WorklistSchema::full_columns()
        .iter()
        .enumerate()
        .map(|(i, name)| if i % 2 == 0 { name.to_uppercase() } else { format!(" {} ", name.to_lowercase()) })
        .collect()
}

fn synthetic_rows(n: usize) -> Vec<Vec<CellValue>> {
    let width = WorklistSchema::full_columns().len();
    (0..n)
        .map(|i| {
            let mut row = vec![CellValue::Empty; width];
            row[0] = CellValue::Text(format!("M{:06}", i));
            row[1] = CellValue::Text(MARKETS[i % MARKETS.len()].to_string());
            row[2] = CellValue::Text(CATEGORIES[i % CATEGORIES.len()].to_string());
            row[3] = CellValue::Text(format!("Practice {}", i % 40));
            row[4] = CellValue::Text(format!("Dr. {}", i % 150));
            row
        })
        .collect()
}

/// Mapping that places member id, market, category, practice and provider in columns 0..5
fn mapping() -> ColumnMapping {
    resolve_columns(
        &["PayerMemberId", "MarketCode", "Escalation Path", "PracticeName", "PCP"],
        &["PayerMemberId", "MarketCode", "Escalation Path", "PracticeName", "PCP"],
    )
}

fn partition(rows: &[Vec<CellValue>]) -> PartitionedDataset {
    let config = ReportConfig::default();
    let mapping = mapping();
    let fields = mapping.fields();
    let filter = RecordFilter::new(&config.escalation_categories);
    let mut dataset = PartitionedDataset::new(config.full_columns.clone());
    let records = rows.iter().enumerate().map(|(i, row)| {
        mapping.project(row, &[], &config.roles, SourceRef { row: i + 2, ..Default::default() })
    });
    dataset.absorb(records, &fields, &filter);
    dataset
}

fn benchmark_column_resolution(c: &mut Criterion) {
    let desired = WorklistSchema::full_columns();
    let headers = headers();
    c.bench_function("resolve_full_columns", |b| {
        b.iter(|| resolve_columns(black_box(desired.as_slice()), black_box(headers.as_slice())))
    });
}

fn benchmark_partitioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioning");
    for size in [1_000usize, 10_000, 50_000] {
        let rows = synthetic_rows(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| partition(black_box(rows)))
        });
    }
    group.finish();
}

fn benchmark_reconciliation(c: &mut Criterion) {
    let rows = synthetic_rows(20_000);
    let current = partition(&rows);
    // previous week is shifted so both new and resolved sets are non-empty
    let previous = partition(&synthetic_rows(22_000)[2_000..]);

    c.bench_function("reconcile_all_20k", |b| {
        b.iter(|| reconcile_all(black_box(&current), black_box(&previous), "PayerMemberId", "PracticeName"))
    });
}

fn benchmark_crosstab(c: &mut Criterion) {
    let config = ReportConfig::default();
    let dataset = partition(&synthetic_rows(20_000));
    let slice = dataset.market("AZ").cloned().unwrap_or_default();
    let analytics = EscalationAnalytics::new(&slice, &config.roles, &config.escalation_categories);

    c.bench_function("practice_crosstab", |b| b.iter(|| black_box(analytics.practice_crosstab())));
    c.bench_function("provider_crosstab", |b| b.iter(|| black_box(analytics.provider_crosstab())));
}

criterion_group!(
    benches,
    benchmark_column_resolution,
    benchmark_partitioning,
    benchmark_reconciliation,
    benchmark_crosstab
);
criterion_main!(benches);
