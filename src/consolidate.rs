/*!
 * Master worklist consolidation
 *
 * Stacks the first sheet of every workbook under a folder into one table.
 * Headers are unioned in first-seen order and each row is tagged with the
 * file it came from and that file's folder relative to the scanned root.
 */

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::data_types::CellValue;
use crate::error::{MedAdhError, Result};
use crate::export::{ColumnWidthPolicy, ReportExporter, Table, WorkbookSpec, XlsxExporter};
use crate::period::FileFailure;
use crate::reader::{RawSheet, WorkbookReader};

pub const SOURCE_FILE_COLUMN: &str = "Source_File";
pub const FOLDER_PATH_COLUMN: &str = "Folder_Path";
pub const MASTER_SHEET: &str = "Master_Worklist";

const SPREADSHEET_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];

/// `Master_Worklist_<YYYYMMDD_HHMM>.xlsx`
pub fn master_file_name(at: NaiveDateTime) -> String {
    format!("Master_Worklist_{}.xlsx", at.format("%Y%m%d_%H%M"))
}

/// Spreadsheets under `root`, recursively, sorted; `~` temp files excluded
pub fn spreadsheet_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| MedAdhError::from(e).with_path(dir))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
            continue;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let is_spreadsheet = path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SPREADSHEET_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
            .unwrap_or(false);
        if is_spreadsheet && !name.starts_with('~') {
            files.push(path);
        }
    }
    Ok(())
}

/// Stacked rows from every readable workbook
#[derive(Debug, Clone, Default)]
pub struct MasterWorklist {
    /// Unioned data headers, first seen first
    pub headers: Vec<String>,
    /// Data cells; rows read before a header appeared are shorter
    pub rows: Vec<Vec<CellValue>>,
    /// (file name, relative folder) per row
    pub sources: Vec<(String, String)>,
    pub files_read: usize,
    pub files_failed: Vec<FileFailure>,
}

impl MasterWorklist {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Append one sheet, adding headers not seen before
    fn append(&mut self, sheet: &RawSheet, source_file: &str, folder: &str) {
        let mut index: HashMap<String, usize> = self.headers.iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();

        let mut positions: Vec<Option<usize>> = Vec::with_capacity(sheet.headers.len());
        for header in &sheet.headers {
            if header.is_empty() || header == SOURCE_FILE_COLUMN || header == FOLDER_PATH_COLUMN {
                positions.push(None);
                continue;
            }
            let pos = *index.entry(header.clone()).or_insert_with(|| {
                self.headers.push(header.clone());
                self.headers.len() - 1
            });
            // a repeated header within one sheet keeps its first column
            let repeated = positions.contains(&Some(pos));
            positions.push(if repeated { None } else { Some(pos) });
        }

        let width = self.headers.len();
        for (_, cells) in &sheet.rows {
            let mut row = vec![CellValue::Empty; width];
            for (cell, pos) in cells.iter().zip(&positions) {
                if let Some(pos) = pos {
                    row[*pos] = cell.clone();
                }
            }
            self.rows.push(row);
            self.sources.push((source_file.to_string(), folder.to_string()));
        }
    }

    /// Table with `Source_File` and `Folder_Path` last
    pub fn to_table(&self) -> Table {
        let width = self.headers.len();
        let mut headers = self.headers.clone();
        headers.push(SOURCE_FILE_COLUMN.to_string());
        headers.push(FOLDER_PATH_COLUMN.to_string());

        let rows = self.rows.iter()
            .zip(&self.sources)
            .map(|(data, (file, folder))| {
                let mut row = data.clone();
                row.resize(width, CellValue::Empty);
                row.push(CellValue::Text(file.clone()));
                row.push(CellValue::Text(folder.clone()));
                row
            })
            .collect();
        Table { headers, rows }
    }
}

/// Builds master worklists
pub struct Consolidator {
    reader: WorkbookReader,
    exporter: XlsxExporter,
}

impl Default for Consolidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Consolidator {
    pub fn new() -> Self {
        Self {
            reader: WorkbookReader::new(),
            exporter: XlsxExporter::new(),
        }
    }

    pub fn with_widths(mut self, widths: ColumnWidthPolicy) -> Self {
        self.exporter = self.exporter.with_widths(widths);
        self
    }

    pub fn with_reader(mut self, reader: WorkbookReader) -> Self {
        self.reader = reader;
        self
    }

    /// Read the first sheet of every spreadsheet under `root`
    pub fn consolidate(&self, root: &Path) -> Result<MasterWorklist> {
        if !root.is_dir() {
            return Err(MedAdhError::Custom {
                message: format!("Folder '{}' does not exist", root.display()),
                suggestion: Some("Pass a week folder such as 'Week of 11.18'".to_string()),
            });
        }

        let mut master = MasterWorklist::default();
        for path in spreadsheet_files(root)? {
            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let sheets = match self.reader.read(&path) {
                Ok(sheets) => sheets,
                Err(e) => {
                    warn!("Failed to read {}: {}", file_name, e);
                    master.files_failed.push(FileFailure { file: path.clone(), reason: e.to_string() });
                    continue;
                }
            };
            let Some(sheet) = sheets.first() else {
                debug!("{} has no data rows", file_name);
                master.files_read += 1;
                continue;
            };

            let folder = path.parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.display().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| ".".to_string());
            debug!("{}: {} row(s) from sheet '{}'", file_name, sheet.row_count(), sheet.name);
            master.append(sheet, &file_name, &folder);
            master.files_read += 1;
        }

        info!(
            "Consolidated {} row(s) from {} file(s), {} failed",
            master.row_count(),
            master.files_read,
            master.files_failed.len()
        );
        Ok(master)
    }

    /// Write the master worklist into `output_dir`
    pub fn write(&self, master: &MasterWorklist, output_dir: &Path, at: NaiveDateTime) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).map_err(|e| MedAdhError::from(e).with_path(output_dir))?;
        let path = output_dir.join(master_file_name(at));

        let mut spec = WorkbookSpec::new();
        spec.add_table(MASTER_SHEET, master.to_table());
        self.exporter.export(&spec, &path)?;
        info!("Master worklist saved: {}", path.display());
        Ok(path)
    }
}
