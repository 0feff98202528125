/*!
 * Period loading: week folder lookup, file discovery and sheet ingestion
 *
 * A period is one "Week of MM.DD" folder under the base path. Loading it
 * never fails as a whole: a missing folder yields an empty dataset, and an
 * unreadable file or a sheet without the required columns is logged,
 * recorded in the diagnostics and skipped.
 */

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::ReportConfig;
use crate::data_types::SourceRef;
use crate::dataset::{PartitionStats, PartitionedDataset, RecordFilter};
use crate::error::{ErrorContext, MedAdhError, Result};
use crate::reader::{RawSheet, WorkbookReader};
use crate::schema::ColumnResolver;
use crate::week::WeekKey;

/// How input files are found inside a week folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// `<MM.DD> <anything> Med Adherence Escalations.xlsx`, every sheet
    #[default]
    Pattern,
    /// Fixed per-family worklist file names, first sheet only
    Fixed,
}

impl std::str::FromStr for DiscoveryMode {
    type Err = MedAdhError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pattern" => Ok(Self::Pattern),
            "fixed" => Ok(Self::Fixed),
            other => Err(MedAdhError::Configuration {
                message: format!("Unknown discovery mode '{}'", other),
                suggestion: Some("Use 'pattern' or 'fixed'".to_string()),
            }),
        }
    }
}

/// Which desired-column set a load resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldSet {
    /// All report fields, dates normalized
    Full,
    /// Identifier and classification fields only
    Comparison,
}

impl FieldSet {
    pub fn columns(&self, config: &ReportConfig) -> Vec<String> {
        match self {
            FieldSet::Full => config.full_columns.clone(),
            FieldSet::Comparison => config.comparison_columns.clone(),
        }
    }
}

/// A file that no read strategy could open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub reason: String,
}

/// A sheet left out of the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSkip {
    pub file: PathBuf,
    pub sheet: String,
    pub reason: String,
}

/// What happened while loading one period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadDiagnostics {
    pub folder: Option<PathBuf>,
    pub files_scanned: usize,
    pub sheets_scanned: usize,
    /// Expected fixed-name files that were not on disk
    pub missing_files: Vec<PathBuf>,
    pub files_failed: Vec<FileFailure>,
    pub sheets_skipped: Vec<SheetSkip>,
    pub stats: PartitionStats,
    pub notes: Vec<String>,
}

/// One loaded week
#[derive(Debug, Clone)]
pub struct Period {
    pub week: WeekKey,
    pub folder: Option<PathBuf>,
    pub dataset: PartitionedDataset,
    pub diagnostics: LoadDiagnostics,
}

impl Period {
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

/// A "Week of M.D" folder found under the base path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekFolder {
    pub week: WeekKey,
    pub name: String,
    pub path: PathBuf,
}

/// Loads periods according to a run configuration
pub struct PeriodLoader<'a> {
    config: &'a ReportConfig,
    reader: WorkbookReader,
}

impl<'a> PeriodLoader<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self {
            config,
            reader: WorkbookReader::new(),
        }
    }

    /// Replace the read-strategy chain
    pub fn with_reader(mut self, reader: WorkbookReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        self.config
    }

    /// Find the week folder, discover its files and ingest every sheet
    pub fn load(&self, week: WeekKey, field_set: FieldSet) -> Period {
        let columns = field_set.columns(self.config);
        let mut dataset = PartitionedDataset::new(columns.clone());
        let mut diagnostics = LoadDiagnostics::default();

        info!("Loading week {} ({:?} fields)", week, field_set);

        let folder = match find_week_folder(&self.config.base_path, week) {
            Some(folder) => folder,
            None => {
                let err = MedAdhError::folder_not_found(&week.padded(), &self.config.base_path);
                warn!("{}", err);
                diagnostics.notes.push(err.to_string());
                return Period { week, folder: None, dataset, diagnostics };
            }
        };
        diagnostics.folder = Some(folder.clone());

        let files = self.discover_files(&folder, week, &mut diagnostics);
        if files.is_empty() {
            let note = format!("No input files for week {} in '{}'", week, folder.display());
            warn!("{}", note);
            diagnostics.notes.push(note);
        }

        let resolver = ColumnResolver::new(columns, self.config.required_columns.clone());
        let filter = RecordFilter::new(&self.config.escalation_categories);
        let date_fields: &[String] = match field_set {
            FieldSet::Full => &self.config.date_columns,
            FieldSet::Comparison => &[],
        };

        #[cfg(feature = "progress")]
        let progress = self.progress_bar(files.len());

        for file in &files {
            diagnostics.files_scanned += 1;
            self.load_file(file, &resolver, &filter, date_fields, &mut dataset, &mut diagnostics);

            #[cfg(feature = "progress")]
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        info!(
            "Week {}: {} file(s), {} row(s) scanned, {} escalation(s) kept across {} market(s)",
            week,
            diagnostics.files_scanned,
            diagnostics.stats.rows_scanned,
            diagnostics.stats.rows_retained(),
            dataset.market_count()
        );

        Period {
            week,
            folder: Some(folder),
            dataset,
            diagnostics,
        }
    }

    /// Input files for a week folder according to the discovery mode
    pub fn discover_files(&self, folder: &Path, week: WeekKey, diagnostics: &mut LoadDiagnostics) -> Vec<PathBuf> {
        match self.config.discovery {
            DiscoveryMode::Pattern => match pattern_files(folder, week) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Could not list '{}': {}", folder.display(), e);
                    diagnostics.notes.push(e.to_string());
                    Vec::new()
                }
            },
            DiscoveryMode::Fixed => {
                let year = self.config.reference_year();
                fixed_files(folder, week, &self.config.market_prefixes, year)
                    .into_iter()
                    .filter(|path| {
                        if path.is_file() {
                            true
                        } else {
                            warn!("Expected worklist not found: {}", path.display());
                            diagnostics.missing_files.push(path.clone());
                            false
                        }
                    })
                    .collect()
            }
        }
    }

    fn load_file(
        &self,
        path: &Path,
        resolver: &ColumnResolver,
        filter: &RecordFilter,
        date_fields: &[String],
        dataset: &mut PartitionedDataset,
        diagnostics: &mut LoadDiagnostics,
    ) {
        let file_name = display_name(path);
        debug!("Processing file: {}", file_name);

        let sheets = match self.reader.read(path) {
            Ok(sheets) => sheets,
            Err(e) => {
                warn!("Skipping file '{}': {}", file_name, e.user_message());
                diagnostics.files_failed.push(FileFailure {
                    file: path.to_path_buf(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        for sheet in self.select_sheets(sheets) {
            diagnostics.sheets_scanned += 1;

            let mapping = match resolver.resolve(&sheet.headers, ErrorContext::sheet(path, &sheet.name)) {
                Ok(mapping) => mapping,
                Err(e) => {
                    warn!("Skipping sheet: {}", e);
                    diagnostics.sheets_skipped.push(SheetSkip {
                        file: path.to_path_buf(),
                        sheet: sheet.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let fields = mapping.fields();
            let records = sheet.rows.iter().map(|(row, cells)| {
                mapping.project(
                    cells,
                    date_fields,
                    &self.config.roles,
                    SourceRef {
                        file: file_name.clone(),
                        sheet: sheet.name.clone(),
                        row: *row,
                    },
                )
            });
            let stats = dataset.absorb(records, &fields, filter);

            debug!(
                "  sheet '{}': {} row(s), {} escalation(s), {} without market",
                sheet.name,
                stats.rows_scanned,
                stats.rows_matched,
                stats.rows_without_market
            );
            if stats.rows_matched == 0 {
                debug!("  sheet '{}' has no allow-listed escalations", sheet.name);
            }
            diagnostics.stats.merge(&stats);
        }
    }

    fn select_sheets(&self, sheets: Vec<RawSheet>) -> Vec<RawSheet> {
        match self.config.discovery {
            DiscoveryMode::Fixed => sheets.into_iter().take(1).collect(),
            DiscoveryMode::Pattern => sheets
                .into_iter()
                .filter(|sheet| {
                    let skip = self.config.skip_sheets.iter().any(|s| s == &sheet.name);
                    if skip {
                        debug!("  skipping sheet '{}'", sheet.name);
                    }
                    !skip
                })
                .collect(),
        }
    }

    #[cfg(feature = "progress")]
    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.show_progress_bar || len < 2 {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Whether `name` contains `token` not directly followed by another digit
///
/// Keeps "Week of 4.2" from matching a "Week of 4.21" folder.
fn contains_week_token(name: &str, token: &str) -> bool {
    name.match_indices(token).any(|(start, _)| {
        !name[start + token.len()..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

/// Locate the folder for a week under `base`
///
/// A padded `Week of 04.21` match beats an un-padded `Week of 4.21` one.
/// Ties within a priority go to the lexicographically first name.
pub fn find_week_folder(base: &Path, week: WeekKey) -> Option<PathBuf> {
    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Base path '{}' is not readable: {}", base.display(), e);
            return None;
        }
    };

    let padded = week.folder_token();
    let unpadded = week.unpadded_folder_token();

    let mut candidates: Vec<(u8, String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let priority = if contains_week_token(&name, &padded) {
                1
            } else if unpadded != padded && contains_week_token(&name, &unpadded) {
                2
            } else {
                return None;
            };
            Some((priority, name, entry.path()))
        })
        .collect();

    candidates.sort();
    if candidates.len() > 1 {
        warn!(
            "{} folders match week {}; using '{}'",
            candidates.len(),
            week,
            candidates[0].1
        );
    }
    candidates.into_iter().next().map(|(_, name, path)| {
        debug!("Selected folder: {}", name);
        path
    })
}

/// Files named `<MM.DD> <anything> Med Adherence Escalations.xlsx|xls`
///
/// Excel lock files (`~$...`) are ignored. Results are sorted by name.
pub fn pattern_files(folder: &Path, week: WeekKey) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        r"(?i)^{} .+ Med Adherence Escalations\.(xlsx|xls)$",
        regex::escape(&week.padded())
    );
    let matcher = Regex::new(&pattern).map_err(|e| MedAdhError::Custom {
        message: format!("Invalid file pattern '{}': {}", pattern, e),
        suggestion: None,
    })?;

    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .map_err(|e| MedAdhError::from(e).with_path(folder))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .map(|name| !name.starts_with('~') && matcher.is_match(&name))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Expected fixed-name worklists for each market family prefix
pub fn fixed_files<S: AsRef<str>>(folder: &Path, week: WeekKey, prefixes: &[S], year: i32) -> Vec<PathBuf> {
    prefixes.iter()
        .map(|prefix| {
            folder.join(format!(
                "{} Medication Adherence Worklist File Week of {}.{}.xlsx",
                prefix.as_ref(),
                week.padded(),
                year
            ))
        })
        .collect()
}

/// Every week folder under `base`, in calendar order
pub fn list_week_folders(base: &Path) -> Result<Vec<WeekFolder>> {
    let mut folders: Vec<WeekFolder> = fs::read_dir(base)
        .map_err(|e| MedAdhError::from(e).with_path(base))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            WeekKey::from_folder_name(&name).map(|week| WeekFolder {
                week,
                name,
                path: entry.path(),
            })
        })
        .collect();

    folders.sort_by(|a, b| a.week.cmp(&b.week).then_with(|| a.name.cmp(&b.name)));
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn week(key: &str) -> WeekKey {
        WeekKey::parse(key).unwrap()
    }

    #[test]
    fn test_unpadded_folder_found_for_padded_key() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Week of 4.21")).unwrap();
        let found = find_week_folder(dir.path(), week("04.21")).unwrap();
        assert!(found.ends_with("Week of 4.21"));
    }

    #[test]
    fn test_padded_folder_preferred() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Week of 4.21")).unwrap();
        fs::create_dir(dir.path().join("Week of 04.21")).unwrap();
        let found = find_week_folder(dir.path(), week("4.21")).unwrap();
        assert!(found.ends_with("Week of 04.21"));
    }

    #[test]
    fn test_token_must_not_run_into_more_digits() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("Week of 4.21")).unwrap();
        assert_eq!(find_week_folder(dir.path(), week("04.02")), None);
        assert!(contains_week_token("Week of 4.2 (final)", "Week of 4.2"));
        assert!(!contains_week_token("Week of 4.21", "Week of 4.2"));
    }

    #[test]
    fn test_missing_base_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_week_folder(&dir.path().join("nope"), week("04.21")), None);
    }

    #[test]
    fn test_pattern_files_filters_names() {
        let dir = TempDir::new().unwrap();
        for name in [
            "04.21 AZ Med Adherence Escalations.xlsx",
            "04.21 TX med adherence escalations.XLS",
            "~$04.21 AZ Med Adherence Escalations.xlsx",
            "04.21 Med Adherence Escalations.xlsx",
            "04.14 AZ Med Adherence Escalations.xlsx",
            "04.21 AZ Med Adherence Escalations.xlsx.bak",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = pattern_files(dir.path(), week("04.21")).unwrap();
        let names: Vec<_> = files.iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![
            "04.21 AZ Med Adherence Escalations.xlsx",
            "04.21 TX med adherence escalations.XLS",
        ]);
    }

    #[test]
    fn test_fixed_file_names() {
        let files = fixed_files(Path::new("/w"), week("11.18"), &["AZ.CO.MI", "TX"], 2024);
        assert_eq!(
            files[0],
            Path::new("/w/AZ.CO.MI Medication Adherence Worklist File Week of 11.18.2024.xlsx")
        );
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_list_week_folders_in_calendar_order() {
        let dir = TempDir::new().unwrap();
        for name in ["Week of 11.18", "Week of 4.7", "Archive", "Week of 04.21"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let weeks: Vec<_> = list_week_folders(dir.path()).unwrap()
            .into_iter()
            .map(|w| w.week.padded())
            .collect();
        assert_eq!(weeks, vec!["04.07", "04.21", "11.18"]);
    }
}
