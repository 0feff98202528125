/*!
 * Export functionality for market reports
 *
 * A report is assembled as a `WorkbookSpec` (an ordered list of table and
 * image sheets) and handed to a `ReportExporter`. The XLSX exporter builds
 * the whole workbook in memory and moves it into place only once it is
 * complete, so a failed market never leaves a partial file behind.
 */

use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Image, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analytics::{CrossTab, SummaryTable, TOTAL_LABEL};
use crate::data_types::{CellValue, Record};
use crate::error::{ExportFormat, MedAdhError, Result};

/// Longest sheet name a workbook accepts
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Header row plus data rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    /// Records laid out under `columns`; fields a record lacks are empty
    pub fn from_records<'r, I>(columns: &[String], records: I) -> Self
    where
        I: IntoIterator<Item = &'r Record>,
    {
        Self {
            headers: columns.to_vec(),
            rows: records.into_iter().map(|r| r.row_for(columns)).collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest rendered text per column, header included
    pub fn column_text_widths(&self) -> Vec<usize> {
        self.headers.iter()
            .enumerate()
            .map(|(col, header)| {
                self.rows.iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| cell.to_string().chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// Conversion into a sheet table
pub trait ToTable {
    fn to_table(&self) -> Table;
}

impl ToTable for CrossTab {
    /// Group column, one column per category, a Total column and a Total row
    fn to_table(&self) -> Table {
        let mut headers = Vec::with_capacity(self.categories.len() + 2);
        headers.push(self.dimension.clone());
        headers.extend(self.categories.iter().cloned());
        headers.push(TOTAL_LABEL.to_string());

        let count = |n: usize| CellValue::Number(n as f64);
        let mut table = Table::new(headers);
        for row in &self.rows {
            let mut cells = vec![CellValue::Text(row.group.clone())];
            cells.extend(row.counts.iter().copied().map(count));
            cells.push(count(row.total));
            table.push_row(cells);
        }

        let mut totals = vec![CellValue::Text(TOTAL_LABEL.to_string())];
        totals.extend(self.totals.iter().copied().map(count));
        totals.push(count(self.grand_total));
        table.push_row(totals);
        table
    }
}

impl ToTable for SummaryTable {
    fn to_table(&self) -> Table {
        let mut table = Table::new(vec!["Metric".to_string(), "Value".to_string()]);
        for (metric, value) in &self.rows {
            table.push_row(vec![CellValue::Text(metric.clone()), value.clone()]);
        }
        table
    }
}

/// Column width bounds: clamp(widest text + padding, min, max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnWidthPolicy {
    #[serde(default = "default_min_width")]
    pub min_width: usize,
    #[serde(default = "default_max_width")]
    pub max_width: usize,
    #[serde(default = "default_padding")]
    pub padding: usize,
}

fn default_min_width() -> usize {
    8
}

fn default_max_width() -> usize {
    50
}

fn default_padding() -> usize {
    2
}

impl Default for ColumnWidthPolicy {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            max_width: default_max_width(),
            padding: default_padding(),
        }
    }
}

impl ColumnWidthPolicy {
    pub fn width_for(&self, text_width: usize) -> usize {
        (text_width + self.padding).clamp(self.min_width, self.max_width.max(self.min_width))
    }

    /// Widths for every column of a table
    pub fn widths(&self, table: &Table) -> Vec<usize> {
        table.column_text_widths()
            .into_iter()
            .map(|w| self.width_for(w))
            .collect()
    }
}

/// Replace characters a sheet name may not contain and cut to 31 characters
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name.chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim_matches('\'');
    let base = if trimmed.is_empty() { "Sheet" } else { trimmed };
    base.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// What a sheet holds
#[derive(Debug, Clone, PartialEq)]
pub enum SheetContent {
    Table(Table),
    /// PNG anchored at B2
    Image(PathBuf),
}

/// One named sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSpec {
    pub name: String,
    pub content: SheetContent,
}

/// Ordered sheets of one output artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookSpec {
    sheets: Vec<SheetSpec>,
}

impl WorkbookSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table sheet; the name is sanitized and made unique
    pub fn add_table(&mut self, name: &str, table: Table) -> &mut Self {
        let name = self.unique_name(name);
        self.sheets.push(SheetSpec { name, content: SheetContent::Table(table) });
        self
    }

    /// Add an image sheet; the name is sanitized and made unique
    pub fn add_image<P: AsRef<Path>>(&mut self, name: &str, image: P) -> &mut Self {
        let name = self.unique_name(name);
        self.sheets.push(SheetSpec {
            name,
            content: SheetContent::Image(image.as_ref().to_path_buf()),
        });
        self
    }

    pub fn sheets(&self) -> &[SheetSpec] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Drop the image sheets, e.g. after a failed chart
    pub fn without_images(mut self) -> Self {
        self.sheets.retain(|s| !matches!(s.content, SheetContent::Image(_)));
        self
    }

    fn unique_name(&self, name: &str) -> String {
        let base = sanitize_sheet_name(name);
        let taken = |candidate: &str| {
            self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(candidate))
        };
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| {
                let suffix = format!("_{}", n);
                let keep = MAX_SHEET_NAME_LEN - suffix.len();
                format!("{}{}", base.chars().take(keep).collect::<String>(), suffix)
            })
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }
}

/// Trait for report writers
pub trait ReportExporter: Send + Sync {
    /// Write the workbook to `path`
    fn export(&self, workbook: &WorkbookSpec, path: &Path) -> Result<()>;

    /// Get the export format
    fn format(&self) -> ExportFormat;

    /// File extension for artifacts of this format
    fn extension(&self) -> &'static str {
        match self.format() {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

/// Exporter for the configured format
pub fn exporter_for(format: ExportFormat, widths: ColumnWidthPolicy) -> Box<dyn ReportExporter> {
    match format {
        ExportFormat::Xlsx => Box::new(XlsxExporter::new().with_widths(widths)),
        ExportFormat::Json => Box::new(JsonExporter::new()),
    }
}

/// XLSX exporter with bold headers, frozen header rows and auto-sized columns
pub struct XlsxExporter {
    pub widths: ColumnWidthPolicy,
    pub freeze_header: bool,
}

impl Default for XlsxExporter {
    fn default() -> Self {
        Self {
            widths: ColumnWidthPolicy::default(),
            freeze_header: true,
        }
    }
}

impl XlsxExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widths(mut self, widths: ColumnWidthPolicy) -> Self {
        self.widths = widths;
        self
    }

    pub fn with_freeze_header(mut self, freeze: bool) -> Self {
        self.freeze_header = freeze;
        self
    }

    fn write_table(&self, worksheet: &mut Worksheet, table: &Table, header: &Format) -> Result<()> {
        for (col, name) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, name, header)?;
        }

        for (i, row) in table.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let c = col as u16;
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(s) => {
                        worksheet.write_string(r, c, s)?;
                    }
                    CellValue::Number(n) => {
                        worksheet.write_number(r, c, *n)?;
                    }
                    CellValue::Bool(b) => {
                        worksheet.write_boolean(r, c, *b)?;
                    }
                    CellValue::Date(_) => {
                        worksheet.write_string(r, c, cell.to_string())?;
                    }
                }
            }
        }

        for (col, width) in self.widths.widths(table).into_iter().enumerate() {
            worksheet.set_column_width(col as u16, width as f64)?;
        }
        if self.freeze_header && !table.headers.is_empty() {
            worksheet.set_freeze_panes(1, 0)?;
        }
        Ok(())
    }

    /// Build the complete workbook in memory
    pub fn to_buffer(&self, spec: &WorkbookSpec) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        for sheet in spec.sheets() {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            match &sheet.content {
                SheetContent::Table(table) => self.write_table(worksheet, table, &header)?,
                SheetContent::Image(path) => {
                    let image = Image::new(path)
                        .map_err(|e| MedAdhError::workbook(format!("cannot load image: {}", e), path))?;
                    worksheet.insert_image(1, 1, &image)?;
                }
            }
        }

        Ok(workbook.save_to_buffer()?)
    }
}

/// Write `bytes` next to `path` and rename into place
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = fs::write(&partial, bytes).and_then(|_| fs::rename(&partial, path)) {
        let _ = fs::remove_file(&partial);
        return Err(MedAdhError::from(e).with_path(path));
    }
    Ok(())
}

impl ReportExporter for XlsxExporter {
    fn export(&self, workbook: &WorkbookSpec, path: &Path) -> Result<()> {
        let bytes = self.to_buffer(workbook).map_err(|e| e.with_path(path))?;
        write_atomically(path, &bytes)
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Xlsx
    }
}

/// JSON exporter: one object per sheet, rows keyed by header
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self { pretty_print: true }
    }
}

impl JsonExporter {
    /// Create a new JSON exporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Set pretty printing
    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// JSON document for a workbook
    pub fn to_value(&self, spec: &WorkbookSpec) -> Value {
        let sheets = spec.sheets().iter()
            .map(|sheet| {
                let body = match &sheet.content {
                    SheetContent::Table(table) => Value::Array(
                        table.rows.iter()
                            .map(|row| {
                                let object: Map<String, Value> = table.headers.iter()
                                    .enumerate()
                                    .map(|(col, h)| (h.clone(), cell_to_json(row.get(col))))
                                    .collect();
                                Value::Object(object)
                            })
                            .collect(),
                    ),
                    SheetContent::Image(path) => serde_json::json!({ "image": path.display().to_string() }),
                };
                serde_json::json!({ "name": sheet.name, "content": body })
            })
            .collect();
        serde_json::json!({ "sheets": Value::Array(sheets) })
    }
}

fn cell_to_json(cell: Option<&CellValue>) -> Value {
    match cell {
        None | Some(CellValue::Empty) => Value::Null,
        Some(CellValue::Text(s)) => Value::String(s.clone()),
        Some(CellValue::Number(n)) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(CellValue::Bool(b)) => Value::Bool(*b),
        Some(date @ CellValue::Date(_)) => Value::String(date.to_string()),
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, workbook: &WorkbookSpec, path: &Path) -> Result<()> {
        let value = self.to_value(workbook);
        let bytes = if self.pretty_print {
            serde_json::to_vec_pretty(&value)?
        } else {
            serde_json::to_vec(&value)?
        };
        write_atomically(path, &bytes)
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }
}
