/*!
 * Per-market report orchestration
 *
 * A run loads the target week with the full field set and, when comparison
 * is enabled, the previous week and the target week again with the
 * comparison field set. Every market is then built and written on its own:
 * a market that fails leaves no file behind and does not stop the others.
 *
 * # Example
 *
 * ```rust,no_run
 * use medadh::prelude::*;
 *
 * # fn main() -> medadh::Result<()> {
 * let config = ConfigBuilder::new()
 *     .base_path("/data/worklists")
 *     .output_path("/data/reports")
 *     .build();
 *
 * let summary = ReportRunner::new(&config).run(WeekKey::parse("04.21")?)?;
 * summary.print_summary();
 * # Ok(())
 * # }
 * ```
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{error, info, warn};
use serde::Serialize;

use crate::analytics::{EscalationAnalytics, PivotSet, SummaryTable};
use crate::chart::{chart_path, render_practice_chart};
use crate::config::ReportConfig;
use crate::dataset::MarketSlice;
use crate::error::{MedAdhError, Result};
use crate::export::{exporter_for, ReportExporter, Table, ToTable, WorkbookSpec};
use crate::period::{FieldSet, LoadDiagnostics, Period, PeriodLoader};
use crate::reconcile::{reconcile, ComparisonResult, ComparisonSummary};
use crate::schema::WorklistSchema;
use crate::week::WeekKey;

pub const PRACTICE_SHEET: &str = "Practice_Escalations";
pub const PROVIDER_SHEET: &str = "Provider_Escalations";
pub const SUMMARY_SHEET: &str = "Summary";
pub const WOW_SUMMARY_SHEET: &str = "WoW Summary";
pub const NEW_SHEET: &str = "New This Week";
pub const PREVIOUS_ONLY_SHEET: &str = "Previous Week Only";
pub const CHART_SHEET: &str = "Practice Chart";

/// `<MM.DD> <Market> Med Adherence Escalations.<ext>`
///
/// Characters that would split the path are replaced in the market code.
pub fn output_file_name(week: WeekKey, market: &str, extension: &str) -> String {
    let market: String = market.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    format!("{} {} Med Adherence Escalations.{}", week.padded(), market.trim(), extension)
}

/// Name of the raw data sheet for a market
pub fn data_sheet_name(market: &str) -> String {
    format!("{} Data", market)
}

/// Everything written for one market, borrowed from the loaded periods
pub struct MarketReport<'a> {
    pub market: &'a str,
    /// Current full-field slice
    pub data: Option<&'a MarketSlice>,
    /// Fields of the raw data sheet when `data` is absent
    pub data_columns: &'a [String],
    pub pivots: PivotSet,
    pub comparison: Option<ComparisonResult<'a>>,
}

impl<'a> MarketReport<'a> {
    /// Raw data, pivots and, when compared, the week-over-week sheets
    pub fn workbook(&self, generated_at: NaiveDateTime) -> WorkbookSpec {
        let mut spec = WorkbookSpec::new();

        let data = match self.data {
            Some(slice) => Table::from_records(&slice.columns, &slice.records),
            None => Table::new(self.data_columns.to_vec()),
        };
        spec.add_table(&data_sheet_name(self.market), data);

        if let Some(practice) = &self.pivots.practice {
            spec.add_table(PRACTICE_SHEET, practice.to_table());
        }
        if let Some(provider) = &self.pivots.provider {
            spec.add_table(PROVIDER_SHEET, provider.to_table());
        }
        spec.add_table(SUMMARY_SHEET, self.pivots.summary.to_table());

        if let Some(comparison) = &self.comparison {
            let wow = SummaryTable { rows: comparison.summary_rows(generated_at) };
            spec.add_table(WOW_SUMMARY_SHEET, wow.to_table());

            let new_columns = if comparison.current_columns.is_empty() {
                WorklistSchema::fallback_listing_columns()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            } else {
                comparison.current_columns.clone()
            };
            let resolved_columns = if comparison.previous_columns.is_empty() {
                new_columns.clone()
            } else {
                comparison.previous_columns.clone()
            };

            spec.add_table(
                NEW_SHEET,
                Table::from_records(&new_columns, comparison.new_records.iter().copied()),
            );
            spec.add_table(
                PREVIOUS_ONLY_SHEET,
                Table::from_records(&resolved_columns, comparison.resolved_records.iter().copied()),
            );
        }

        spec
    }

    pub fn record_count(&self) -> usize {
        self.data.map(MarketSlice::len).unwrap_or(0)
    }
}

/// Result of building one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MarketOutcome {
    Written {
        market: String,
        path: PathBuf,
        sheets: Vec<String>,
        records: usize,
        /// Chart problem that did not stop the workbook
        chart_error: Option<String>,
    },
    Skipped {
        market: String,
        reason: String,
    },
    Failed {
        market: String,
        reason: String,
    },
}

impl MarketOutcome {
    pub fn market(&self) -> &str {
        match self {
            MarketOutcome::Written { market, .. }
            | MarketOutcome::Skipped { market, .. }
            | MarketOutcome::Failed { market, .. } => market,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub week: String,
    pub previous_week: Option<String>,
    pub generated_at: String,
    pub output_path: PathBuf,
    pub current: LoadDiagnostics,
    pub previous: Option<LoadDiagnostics>,
    pub markets: Vec<MarketOutcome>,
}

impl RunSummary {
    pub fn written(&self) -> Vec<&Path> {
        self.markets.iter()
            .filter_map(|m| match m {
                MarketOutcome::Written { path, .. } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<&MarketOutcome> {
        self.markets.iter()
            .filter(|m| matches!(m, MarketOutcome::Failed { .. }))
            .collect()
    }

    pub fn skipped(&self) -> Vec<&MarketOutcome> {
        self.markets.iter()
            .filter(|m| matches!(m, MarketOutcome::Skipped { .. }))
            .collect()
    }

    /// Print a formatted summary of the run
    pub fn print_summary(&self) {
        println!("=== Escalation Report Run ===");
        println!("Week: {}", self.week);
        if let Some(previous) = &self.previous_week {
            println!("Compared with: {}", previous);
        }
        println!("Generated: {}", self.generated_at);
        println!("Output: {}", self.output_path.display());
        println!(
            "Inputs: {} file(s), {} sheet(s), {} row(s) scanned, {} escalation(s) kept",
            self.current.files_scanned,
            self.current.sheets_scanned,
            self.current.stats.rows_scanned,
            self.current.stats.rows_retained()
        );
        if !self.current.files_failed.is_empty() || !self.current.sheets_skipped.is_empty() {
            println!(
                "  {} unreadable file(s), {} skipped sheet(s)",
                self.current.files_failed.len(),
                self.current.sheets_skipped.len()
            );
        }

        println!("Markets:");
        for outcome in &self.markets {
            match outcome {
                MarketOutcome::Written { market, path, records, chart_error, .. } => {
                    let name = path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    println!("  {}: {} record(s) -> {}", market, records, name);
                    if let Some(e) = chart_error {
                        println!("    chart not embedded: {}", e);
                    }
                }
                MarketOutcome::Skipped { market, reason } => println!("  {}: skipped ({})", market, reason),
                MarketOutcome::Failed { market, reason } => println!("  {}: FAILED ({})", market, reason),
            }
        }
        println!(
            "{} written, {} skipped, {} failed",
            self.written().len(),
            self.skipped().len(),
            self.failed().len()
        );
    }
}

/// Periods loaded for one run
struct LoadedPeriods {
    current: Period,
    previous: Option<Period>,
    current_comparison: Option<Period>,
}

/// Runs reports for a week
pub struct ReportRunner<'a> {
    config: &'a ReportConfig,
    exporter: Box<dyn ReportExporter>,
    generated_at: Option<NaiveDateTime>,
}

impl<'a> ReportRunner<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self {
            config,
            exporter: exporter_for(config.format, config.column_widths),
            generated_at: None,
        }
    }

    /// Replace the exporter picked from the configured format
    pub fn with_exporter(mut self, exporter: Box<dyn ReportExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Pin the report timestamp instead of reading the clock
    pub fn with_generated_at(mut self, at: NaiveDateTime) -> Self {
        self.generated_at = Some(at);
        self
    }

    fn load(&self, week: WeekKey, previous_week: Option<WeekKey>) -> LoadedPeriods {
        let loader = PeriodLoader::new(self.config);
        let current = loader.load(week, FieldSet::Full);

        match previous_week {
            Some(previous_week) => LoadedPeriods {
                current,
                previous: Some(loader.load(previous_week, FieldSet::Comparison)),
                current_comparison: Some(loader.load(week, FieldSet::Comparison)),
            },
            None => LoadedPeriods { current, previous: None, current_comparison: None },
        }
    }

    /// Load the week, build every market and write one artifact each
    ///
    /// Only configuration problems (invalid settings, unwritable output
    /// directory, a week key with no previous week) end the run early.
    pub fn run(&self, week: WeekKey) -> Result<RunSummary> {
        self.config.validate()?;
        // resolved before touching the filesystem
        let previous_week = if self.config.comparison {
            Some(week.previous(self.config.reference_year())?)
        } else {
            None
        };

        let output = &self.config.output_path;
        fs::create_dir_all(output).map_err(|e| MedAdhError::Configuration {
            message: format!("Output path '{}' is not writable: {}", output.display(), e),
            suggestion: Some("Set output_path or MEDADH_OUTPUT_PATH to a writable directory".to_string()),
        })?;

        let generated_at = self.generated_at
            .unwrap_or_else(|| chrono::Local::now().naive_local());
        let periods = self.load(week, previous_week);

        let mut markets: BTreeSet<String> = periods.current.dataset.market_codes().into_iter().collect();
        for period in periods.previous.iter().chain(periods.current_comparison.iter()) {
            markets.extend(period.dataset.market_codes());
        }
        if markets.is_empty() {
            warn!("No escalations found for week {}", week);
        }
        let markets: Vec<String> = markets.into_iter().collect();

        #[cfg(feature = "parallel")]
        let outcomes: Vec<MarketOutcome> = {
            use rayon::prelude::*;
            markets.par_iter()
                .map(|market| self.build_market(market, week, &periods, generated_at))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<MarketOutcome> = markets.iter()
            .map(|market| self.build_market(market, week, &periods, generated_at))
            .collect();

        Ok(RunSummary {
            week: week.padded(),
            previous_week: periods.previous.as_ref().map(|p| p.week.padded()),
            generated_at: generated_at.format(crate::REPORT_TIMESTAMP_FORMAT).to_string(),
            output_path: output.clone(),
            current: periods.current.diagnostics,
            previous: periods.previous.map(|p| p.diagnostics),
            markets: outcomes,
        })
    }

    /// Week-over-week counts per market without writing anything
    pub fn compare(&self, week: WeekKey) -> Result<BTreeMap<String, ComparisonSummary>> {
        let previous_week = week.previous(self.config.reference_year())?;
        let loader = PeriodLoader::new(self.config);
        let current = loader.load(week, FieldSet::Comparison);
        let previous = loader.load(previous_week, FieldSet::Comparison);

        let roles = &self.config.roles;
        Ok(crate::reconcile::reconcile_all(&current.dataset, &previous.dataset, &roles.member_id, &roles.practice_name)
            .into_iter()
            .map(|(market, result)| (market, result.summary()))
            .collect())
    }

    fn build_market(
        &self,
        market: &str,
        week: WeekKey,
        periods: &LoadedPeriods,
        generated_at: NaiveDateTime,
    ) -> MarketOutcome {
        let data = periods.current.dataset.market(market);
        let current_comparison = periods.current_comparison.as_ref()
            .and_then(|p| p.dataset.market(market));

        if data.is_none() && current_comparison.is_none() {
            info!("Skipping {}: no data for week {}", market, week);
            return MarketOutcome::Skipped {
                market: market.to_string(),
                reason: format!("no data for week {}", week),
            };
        }

        let empty = MarketSlice::default();
        let analytics = EscalationAnalytics::new(
            data.unwrap_or(&empty),
            &self.config.roles,
            &self.config.escalation_categories,
        );

        let comparison = periods.previous.as_ref().map(|previous| {
            let result = reconcile(
                market,
                current_comparison,
                previous.dataset.market(market),
                &self.config.roles.member_id,
                &self.config.roles.practice_name,
            );
            if !result.has_baseline() {
                info!("{}: no previous-week baseline", market);
            }
            result
        });

        let report = MarketReport {
            market,
            data,
            data_columns: periods.current.dataset.field_order(),
            pivots: analytics.pivots(generated_at),
            comparison,
        };

        let path = self.config.output_path.join(output_file_name(week, market, self.exporter.extension()));
        match self.write_market(&report, &path, generated_at) {
            Ok((sheets, chart_error)) => {
                info!("Saved report for {}: {}", market, path.display());
                MarketOutcome::Written {
                    market: market.to_string(),
                    path,
                    sheets,
                    records: report.record_count(),
                    chart_error,
                }
            }
            Err(e) => {
                error!("Report for {} not written: {}", market, e.user_message());
                MarketOutcome::Failed {
                    market: market.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Write the artifact, with the chart sheet when it can be produced
    fn write_market(
        &self,
        report: &MarketReport<'_>,
        path: &Path,
        generated_at: NaiveDateTime,
    ) -> Result<(Vec<String>, Option<String>)> {
        let spec = report.workbook(generated_at);

        let image = chart_path(path);
        let chart: Result<Option<PathBuf>> = if !self.config.chart {
            Ok(None)
        } else if let Some(practice) = report.pivots.practice.as_ref() {
            render_practice_chart(practice, report.market, &image).map(|_| Some(image.clone()))
        } else {
            Err(MedAdhError::visualization(report.market, "practice table not available"))
        };

        let mut chart_error = None;
        let spec = match chart {
            Ok(Some(image)) => {
                let mut with_chart = spec.clone();
                with_chart.add_image(CHART_SHEET, image);
                match self.exporter.export(&with_chart, path) {
                    Ok(()) => return Ok((names(&with_chart), None)),
                    Err(e) => {
                        let e = MedAdhError::visualization(report.market, format!("chart not embedded: {}", e));
                        warn!("{}", e);
                        chart_error = Some(e.to_string());
                    }
                }
                spec
            }
            Ok(None) => spec,
            Err(e) => {
                warn!("{}", e);
                chart_error = Some(e.to_string());
                spec
            }
        };

        if let Err(e) = self.exporter.export(&spec, path) {
            // no workbook, so no sidecar either
            if image.exists() {
                if let Err(cleanup) = fs::remove_file(&image) {
                    warn!("Could not remove chart '{}': {}", image.display(), cleanup);
                }
            }
            return Err(e);
        }
        Ok((names(&spec), chart_error))
    }
}

fn names(spec: &WorkbookSpec) -> Vec<String> {
    spec.sheet_names().into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{CellValue, FieldRoles, Record, SourceRef};
    use chrono::NaiveDate;

    fn slice(ids: &[&str]) -> MarketSlice {
        let roles = FieldRoles::default();
        MarketSlice {
            columns: vec![
                "PayerMemberId".into(),
                "MarketCode".into(),
                "PracticeName".into(),
                "PCP".into(),
                "Escalation Path".into(),
            ],
            records: ids.iter()
                .map(|id| Record::new(
                    vec![
                        ("PayerMemberId".into(), CellValue::Text(id.to_string())),
                        ("MarketCode".into(), CellValue::Text("AZ".into())),
                        ("PracticeName".into(), CellValue::Text("North".into())),
                        ("PCP".into(), CellValue::Text("Dr. A".into())),
                        ("Escalation Path".into(), CellValue::Text("Practice Escalation".into())),
                    ],
                    &roles,
                    SourceRef::default(),
                ))
                .collect(),
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 21).unwrap().and_hms_opt(7, 30, 0).unwrap()
    }

    #[test]
    fn test_output_file_name_uses_padded_key() {
        let week = WeekKey::parse("4.7").unwrap();
        assert_eq!(output_file_name(week, "AZ", "xlsx"), "04.07 AZ Med Adherence Escalations.xlsx");
        assert_eq!(output_file_name(week, "AZ/CO", "json"), "04.07 AZ_CO Med Adherence Escalations.json");
    }

    #[test]
    fn test_workbook_sheet_order_with_comparison() {
        let config = ReportConfig::default();
        let current = slice(&["1", "2", "3"]);
        let previous = slice(&["1", "2"]);
        let analytics = EscalationAnalytics::new(&current, &config.roles, &config.escalation_categories);

        let report = MarketReport {
            market: "AZ",
            data: Some(&current),
            data_columns: &current.columns,
            pivots: analytics.pivots(at()),
            comparison: Some(reconcile("AZ", Some(&current), Some(&previous), "PayerMemberId", "PracticeName")),
        };
        let spec = report.workbook(at());
        assert_eq!(
            spec.sheet_names(),
            vec!["AZ Data", PRACTICE_SHEET, PROVIDER_SHEET, SUMMARY_SHEET, WOW_SUMMARY_SHEET, NEW_SHEET, PREVIOUS_ONLY_SHEET]
        );
    }

    #[test]
    fn test_empty_listings_keep_a_header_row() {
        let config = ReportConfig::default();
        let empty = MarketSlice::default();
        let analytics = EscalationAnalytics::new(&empty, &config.roles, &config.escalation_categories);
        let report = MarketReport {
            market: "TX",
            data: None,
            data_columns: &config.full_columns,
            pivots: analytics.pivots(at()),
            comparison: Some(reconcile("TX", None, None, "PayerMemberId", "PracticeName")),
        };

        let spec = report.workbook(at());
        let listing = spec.sheets().iter()
            .find(|s| s.name == PREVIOUS_ONLY_SHEET)
            .unwrap();
        match &listing.content {
            crate::export::SheetContent::Table(table) => {
                assert!(table.is_empty());
                assert_eq!(table.headers, vec!["PayerMemberId", "PatientName", "MarketCode", "PracticeName"]);
            }
            other => panic!("unexpected sheet content {:?}", other),
        }
    }

    #[test]
    fn test_unwritable_output_aborts_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("reports");
        fs::write(&blocker, b"not a directory").unwrap();

        let config = crate::config::ConfigBuilder::new()
            .base_path(dir.path())
            .output_path(&blocker)
            .build();
        let err = ReportRunner::new(&config)
            .run(WeekKey::parse("04.21").unwrap())
            .unwrap_err();
        assert!(matches!(err, MedAdhError::Configuration { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_previous_week_outside_year_fails_before_any_io() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("reports");
        let config = crate::config::ConfigBuilder::new()
            .base_path(dir.path())
            .output_path(&output)
            .year(2025)
            .build();
        let week = WeekKey::parse("02.29").unwrap();

        let err = ReportRunner::new(&config).run(week).unwrap_err();
        assert!(matches!(err, MedAdhError::InvalidDateKey { .. }));
        assert!(!output.exists());

        let err = ReportRunner::new(&config).compare(week).unwrap_err();
        assert!(matches!(err, MedAdhError::InvalidDateKey { .. }));
    }

    struct Refusing;

    impl ReportExporter for Refusing {
        fn export(&self, _workbook: &WorkbookSpec, path: &Path) -> Result<()> {
            Err(MedAdhError::workbook("disk full", path))
        }

        fn format(&self) -> crate::error::ExportFormat {
            crate::error::ExportFormat::Xlsx
        }
    }

    #[test]
    fn test_failed_export_leaves_no_chart_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::config::ConfigBuilder::new()
            .output_path(dir.path())
            .chart(true)
            .build();
        let current = slice(&["1", "2", "3"]);
        let analytics = EscalationAnalytics::new(&current, &config.roles, &config.escalation_categories);
        let report = MarketReport {
            market: "AZ",
            data: Some(&current),
            data_columns: &current.columns,
            pivots: analytics.pivots(at()),
            comparison: None,
        };

        let path = dir.path().join(output_file_name(WeekKey::parse("04.21").unwrap(), "AZ", "xlsx"));
        let runner = ReportRunner::new(&config).with_exporter(Box::new(Refusing));
        assert!(runner.write_market(&report, &path, at()).is_err());
        assert!(!path.exists());
        assert!(!chart_path(&path).exists());
    }
}
