/*!
 * Spreadsheet reader with a fallback strategy chain
 *
 * Worklist files come out of several tools and are not always what their
 * extension claims. Each `ReadStrategy` is one way of opening a file; the
 * `WorkbookReader` tries them in order and keeps the first success. When
 * every strategy fails the individual failures are reported together.
 */

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use calamine::{open_workbook, open_workbook_auto, Data, Range, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use log::debug;

use crate::data_types::{excel_serial_to_date, CellValue};
use crate::error::{MedAdhError, ReadAttempt, Result};

/// One sheet as read from disk, before column resolution
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSheet {
    pub name: String,
    /// Trimmed header row
    pub headers: Vec<String>,
    /// Data rows with their 1-based spreadsheet row numbers
    pub rows: Vec<(usize, Vec<CellValue>)>,
}

impl RawSheet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// A single way of turning a file into sheets
pub trait ReadStrategy: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &'static str;

    /// Whether this strategy should be attempted for the path at all
    fn supports(&self, path: &Path) -> bool;

    /// Read every sheet of the file, in workbook order
    fn read(&self, path: &Path) -> Result<Vec<RawSheet>>;
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Native Office Open XML reader
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxStrategy;

impl ReadStrategy for XlsxStrategy {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn supports(&self, path: &Path) -> bool {
        matches!(extension_of(path).as_deref(), Some("xlsx") | Some("xlsm"))
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>> {
        let mut workbook = open_workbook::<Xlsx<BufReader<File>>, _>(path)
            .map_err(|e| MedAdhError::from(e).with_path(path))?;
        collect_sheets(&mut workbook, path)
    }
}

/// Legacy BIFF reader, only for `.xls`
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsStrategy;

impl ReadStrategy for XlsStrategy {
    fn name(&self) -> &'static str {
        "xls"
    }

    fn supports(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("xls")
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>> {
        let mut workbook = open_workbook::<Xls<BufReader<File>>, _>(path)
            .map_err(|e| MedAdhError::from(e).with_path(path))?;
        collect_sheets(&mut workbook, path)
    }
}

/// Format sniffing reader for files whose extension lies
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDetectStrategy;

impl ReadStrategy for AutoDetectStrategy {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| MedAdhError::from(e).with_path(path))?;
        collect_sheets(&mut workbook, path)
    }
}

/// Delimited text reader for `.csv` exports
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvStrategy;

impl ReadStrategy for CsvStrategy {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn supports(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("csv")
    }

    fn read(&self, path: &Path) -> Result<Vec<RawSheet>> {
        let csv_error = |e: csv::Error| MedAdhError::from(e).with_path(path);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_error)?;

        let headers = reader.headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(csv_error)?;
            let cells: Vec<CellValue> = record.iter().map(text_cell).collect();
            if cells.iter().all(CellValue::is_empty) {
                continue;
            }
            // header is row 1
            rows.push((index + 2, cells));
        }

        let name = path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Sheet1".to_string());

        Ok(vec![RawSheet { name, headers, rows }])
    }
}

fn text_cell(value: &str) -> CellValue {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(value.to_string())
    }
}

fn collect_sheets<RS, R>(workbook: &mut R, path: &Path) -> Result<Vec<RawSheet>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    calamine::Error: From<R::Error>,
{
    let names = workbook.sheet_names();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| MedAdhError::from(calamine::Error::from(e)).with_path(path).in_sheet(&name))?;
        sheets.push(sheet_from_range(name, &range));
    }
    Ok(sheets)
}

fn sheet_from_range(name: String, range: &Range<Data>) -> RawSheet {
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows_iter = range.rows().enumerate();

    let headers = match rows_iter.next() {
        Some((_, header_row)) => header_row.iter()
            .map(|cell| convert_cell(cell).to_string().trim().to_string())
            .collect(),
        None => return RawSheet { name, ..Default::default() },
    };

    let rows = rows_iter
        .filter_map(|(offset, row)| {
            let cells: Vec<CellValue> = row.iter().map(convert_cell).collect();
            if cells.iter().all(CellValue::is_empty) {
                None
            } else {
                Some((first_row + offset + 1, cells))
            }
        })
        .collect();

    RawSheet { name, headers, rows }
}

/// Convert a calamine cell to the crate's cell model
pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => text_cell(s),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => text_cell(s),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Ordered list of read strategies; first success wins
pub struct WorkbookReader {
    strategies: Vec<Box<dyn ReadStrategy>>,
}

impl Default for WorkbookReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkbookReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookReader")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl WorkbookReader {
    /// Reader with the standard chain: xlsx, xls, auto-detect, csv
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(XlsxStrategy),
                Box::new(XlsStrategy),
                Box::new(AutoDetectStrategy),
                Box::new(CsvStrategy),
            ],
        }
    }

    /// Reader with no strategies, for custom chains
    pub fn empty() -> Self {
        Self { strategies: Vec::new() }
    }

    /// Append a strategy to the end of the chain
    pub fn with_strategy<S: ReadStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Read all sheets of a file
    ///
    /// Fails with `UnreadableFile` carrying one `ReadAttempt` per strategy
    /// that was tried.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<Vec<RawSheet>> {
        let path = path.as_ref();
        let mut attempts = Vec::new();

        for strategy in self.strategies.iter().filter(|s| s.supports(path)) {
            match strategy.read(path) {
                Ok(sheets) => {
                    debug!(
                        "Read {} sheet(s) from '{}' with the {} strategy",
                        sheets.len(),
                        path.display(),
                        strategy.name()
                    );
                    return Ok(sheets);
                }
                Err(err) => {
                    debug!("{} strategy failed for '{}': {}", strategy.name(), path.display(), err);
                    attempts.push(ReadAttempt {
                        strategy: strategy.name().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if attempts.is_empty() {
            attempts.push(ReadAttempt {
                strategy: "none".to_string(),
                message: "no read strategy supports this file type".to_string(),
            });
        }
        Err(MedAdhError::unreadable(path, attempts))
    }
}
