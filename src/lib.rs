/*!
 * # Medication Adherence Escalation Reporting
 *
 * A Rust library for turning weekly medication-adherence worklists into
 * per-market escalation workbooks.
 *
 * ## Features
 *
 * - 📂 **Week discovery**: finds `Week of MM.DD` / `Week of M.D` folders and their worklists
 * - 🧭 **Tolerant headers**: case-insensitive column resolution, per sheet
 * - 🗂️ **Market partitioning**: allow-listed escalations grouped by market code
 * - 🔁 **Week over week**: new and resolved members against the previous week
 * - 📊 **Pivots and charts**: practice/provider cross-tabs and a stacked bar chart
 * - 💾 **XLSX or JSON output**: one artifact per market, never half-written
 *
 * ## Quick Start
 *
 * ```no_run
 * use medadh::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let config = ConfigBuilder::new()
 *     .base_path("./worklists")
 *     .output_path("./reports")
 *     .build();
 *
 * // Fails before any file is touched when the key is not a date
 * let week = WeekKey::parse("04.21")?;
 *
 * let summary = ReportRunner::new(&config).run(week)?;
 * summary.print_summary();
 * # Ok(())
 * # }
 * ```
 *
 * ## Loading a Single Week
 *
 * ```no_run
 * # use medadh::prelude::*;
 * # fn main() -> Result<()> {
 * let config = ReportConfig::from_env();
 * let period = PeriodLoader::new(&config).load(WeekKey::parse("04.21")?, FieldSet::Full);
 *
 * period.dataset.statistics().print_summary();
 * for skip in &period.diagnostics.sheets_skipped {
 *     println!("skipped {} / {}: {}", skip.file.display(), skip.sheet, skip.reason);
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Comparing Two Weeks
 *
 * ```no_run
 * # use medadh::prelude::*;
 * # fn main() -> Result<()> {
 * # let config = ReportConfig::default();
 * let loader = PeriodLoader::new(&config);
 * let current = loader.load(WeekKey::parse("04.21")?, FieldSet::Comparison);
 * let previous = loader.load(WeekKey::parse("04.14")?, FieldSet::Comparison);
 *
 * let roles = &config.roles;
 * for (market, result) in reconcile_all(&current.dataset, &previous.dataset, &roles.member_id, &roles.practice_name) {
 *     println!("{}: {:+} ({} new, {} resolved)", market, result.net_change(), result.new_ids.len(), result.resolved_ids.len());
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Configuration
 *
 * Settings layer as defaults, then a TOML file, then `MEDADH_*`
 * environment variables:
 *
 * ```no_run
 * # use medadh::prelude::*;
 * # fn main() -> Result<()> {
 * let config = ReportConfig::load(None)?;
 * let config = ConfigBuilder::from_config(config)
 *     .discovery(DiscoveryMode::Fixed)
 *     .year(2025)
 *     .chart(false)
 *     .build();
 * # Ok(())
 * # }
 * ```
 *
 * ## Input Layout
 *
 * - `<base>/Week of 04.21/04.21 AZ Med Adherence Escalations.xlsx` (pattern mode, every sheet
 *   except `Validation_Lists`)
 * - `<base>/Week of 04.21/TX Medication Adherence Worklist File Week of 04.21.2025.xlsx`
 *   (fixed mode, first sheet)
 */

// Re-export error types from root
pub use error::{MedAdhError, Result, ErrorContext, ExportFormat};
pub use constants::REPORT_TIMESTAMP_FORMAT;

// Public modules
pub mod error;
pub mod config;
pub mod week;
pub mod data_types;
pub mod schema;
pub mod reader;
pub mod dataset;
pub mod period;
pub mod reconcile;
pub mod analytics;
pub mod chart;
pub mod export;
pub mod report;
pub mod consolidate;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```
/// use medadh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::data_types::{CellValue, FieldRoles, Record, SourceRef};
    pub use crate::week::WeekKey;
    pub use crate::schema::{ColumnMapping, ColumnResolver, WorklistSchema, resolve_columns};
    pub use crate::reader::{RawSheet, ReadStrategy, WorkbookReader};
    pub use crate::error::{MedAdhError, Result};
    pub use crate::dataset::{DatasetStatistics, MarketSlice, PartitionedDataset, RecordFilter};
    pub use crate::period::{DiscoveryMode, FieldSet, Period, PeriodLoader, WeekFolder, list_week_folders};
    pub use crate::reconcile::{ComparisonResult, ComparisonSummary, reconcile, reconcile_all};
    pub use crate::analytics::{CrossTab, EscalationAnalytics, PivotSet, SummaryTable};
    pub use crate::export::{ColumnWidthPolicy, JsonExporter, ReportExporter, WorkbookSpec, XlsxExporter};
    pub use crate::report::{MarketOutcome, ReportRunner, RunSummary};
    pub use crate::consolidate::{Consolidator, MasterWorklist};
    pub use crate::config::{ConfigBuilder, ReportConfig};
    pub use crate::ExportFormat;
}

/// Worklist naming and formatting constants
pub mod constants {
    /// Timestamp written into the "Report Generated" rows
    pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

    /// Week folder naming, zero padded or not
    pub const WEEK_FOLDER_PATTERN: &str = "Week of MM.DD";

    /// Per-market output naming
    pub const OUTPUT_FILE_PATTERN: &str = "<MM.DD> <Market> Med Adherence Escalations.xlsx";

    /// Sheets that hold dropdown values, not worklist rows
    pub const VALIDATION_SHEET: &str = "Validation_Lists";
}

/// Common recipes and utility functions
pub mod cookbook {
    use crate::prelude::*;
    use std::path::Path;

    /// Report one week with default settings
    ///
    /// # Example
    /// ```no_run
    /// # use medadh::prelude::*;
    /// # use medadh::cookbook::report_week;
    /// # fn main() -> Result<()> {
    /// let summary = report_week("./worklists", "./reports", "04.21")?;
    /// println!("{} workbook(s) written", summary.written().len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn report_week<P: AsRef<Path>, Q: AsRef<Path>>(base: P, output: Q, week: &str) -> Result<RunSummary> {
        let week = WeekKey::parse(week)?;
        let config = ConfigBuilder::new()
            .base_path(base)
            .output_path(output)
            .build();
        ReportRunner::new(&config).run(week)
    }

    /// Most recent week folder under `base`, by calendar order
    pub fn latest_week<P: AsRef<Path>>(base: P) -> Result<Option<WeekKey>> {
        Ok(list_week_folders(base.as_ref())?
            .last()
            .map(|folder| folder.week))
    }
}
