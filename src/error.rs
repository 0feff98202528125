/*!
 * Error handling for escalation worklist processing
 *
 * Provides error types with file/sheet context, suggestions, and a split
 * between failures that only cost one input and failures that end a run.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Library result type
pub type Result<T> = std::result::Result<T, MedAdhError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum MedAdhError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// A sheet lacks one or more required logical fields
    #[error("Missing required columns [{}] in {context}", .missing.join(", "))]
    MissingRequiredColumns {
        missing: Vec<String>,
        context: ErrorContext,
    },

    /// Every read strategy failed for a file
    #[error("Unreadable file {}: {} read strategies failed", .path.display(), .attempts.len())]
    UnreadableFile {
        path: PathBuf,
        attempts: Vec<ReadAttempt>,
    },

    /// No week folder matched the requested week
    #[error("No folder matching 'Week of {week}' under {}", .base.display())]
    FolderNotFound {
        week: String,
        base: PathBuf,
    },

    /// The week key does not parse as a month and day
    #[error("Invalid week key '{value}': {reason}")]
    InvalidDateKey {
        value: String,
        reason: String,
    },

    /// Chart rendering or embedding failed
    #[error("Visualization failed for market {market}: {message}")]
    Visualization {
        market: String,
        message: String,
    },

    /// Spreadsheet read errors that carry a sheet location
    #[error("Spreadsheet error in {context}: {message}")]
    Spreadsheet {
        message: String,
        context: ErrorContext,
    },

    /// Output workbook could not be built or written
    #[error("Workbook error: {message}")]
    Workbook {
        message: String,
        path: Option<PathBuf>,
    },

    /// CSV parsing errors with location information
    #[error("CSV parsing error in {context}: {message}")]
    CsvParse {
        message: String,
        context: ErrorContext,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Where in the input an error happened
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub sheet_name: Option<String>,
    pub row_number: Option<usize>,
}

impl ErrorContext {
    /// Context pointing at a whole file
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file_path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Context pointing at one sheet of a file
    pub fn sheet<P: AsRef<Path>>(path: P, sheet: &str) -> Self {
        Self {
            file_path: Some(path.as_ref().to_path_buf()),
            sheet_name: Some(sheet.to_string()),
            ..Default::default()
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(path) = &self.file_path {
            let name = path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            parts.push(format!("file '{}'", name));
        }
        if let Some(sheet) = &self.sheet_name {
            parts.push(format!("sheet '{}'", sheet));
        }
        if let Some(row) = self.row_number {
            parts.push(format!("row {}", row));
        }
        if parts.is_empty() {
            write!(f, "<unknown location>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// One failed attempt in a read-strategy chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAttempt {
    pub strategy: String,
    pub message: String,
}

impl fmt::Display for ReadAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

/// Output format for report artifacts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Xlsx => write!(f, "XLSX"),
            ExportFormat::Json => write!(f, "JSON"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = MedAdhError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "json" => Ok(ExportFormat::Json),
            other => Err(MedAdhError::Configuration {
                message: format!("Unknown export format '{}'", other),
                suggestion: Some("Use 'xlsx' or 'json'".to_string()),
            }),
        }
    }
}

impl MedAdhError {
    /// Create a missing-columns error for one sheet
    pub fn missing_columns(missing: Vec<String>, context: ErrorContext) -> Self {
        Self::MissingRequiredColumns { missing, context }
    }

    /// Create an invalid week key error
    pub fn invalid_date_key(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDateKey {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unreadable-file error from the failed attempts
    pub fn unreadable(path: &Path, attempts: Vec<ReadAttempt>) -> Self {
        Self::UnreadableFile {
            path: path.to_path_buf(),
            attempts,
        }
    }

    /// Create a folder-not-found error
    pub fn folder_not_found(week: &str, base: &Path) -> Self {
        Self::FolderNotFound {
            week: week.to_string(),
            base: base.to_path_buf(),
        }
    }

    /// Create a visualization error
    pub fn visualization(market: &str, message: impl Into<String>) -> Self {
        Self::Visualization {
            market: market.to_string(),
            message: message.into(),
        }
    }

    /// Create a workbook error tied to an output path
    pub fn workbook(message: impl Into<String>, path: &Path) -> Self {
        Self::Workbook {
            message: message.into(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Attach a file path to an error that has none
    pub fn with_path(self, path: &Path) -> Self {
        let fill = |mut context: ErrorContext| {
            if context.file_path.is_none() {
                context.file_path = Some(path.to_path_buf());
            }
            context
        };
        match self {
            Self::Io { message, source, context } => Self::Io { message, source, context: fill(context) },
            Self::Spreadsheet { message, context } => Self::Spreadsheet { message, context: fill(context) },
            Self::CsvParse { message, context } => Self::CsvParse { message, context: fill(context) },
            Self::Workbook { message, path: None } => Self::Workbook {
                message,
                path: Some(path.to_path_buf()),
            },
            other => other,
        }
    }

    /// Attach a sheet name to a spreadsheet error that has none
    pub fn in_sheet(self, sheet: &str) -> Self {
        match self {
            Self::Spreadsheet { message, mut context } => {
                if context.sheet_name.is_none() {
                    context.sheet_name = Some(sheet.to_string());
                }
                Self::Spreadsheet { message, context }
            }
            other => other,
        }
    }

    /// Whether the batch can continue past this error
    ///
    /// Per-file, per-sheet and per-chart failures are isolated; a bad week
    /// key or configuration ends the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MissingRequiredColumns { .. }
            | Self::UnreadableFile { .. }
            | Self::FolderNotFound { .. }
            | Self::Visualization { .. }
            | Self::Spreadsheet { .. }
            | Self::CsvParse { .. } => true,
            Self::InvalidDateKey { .. } | Self::Configuration { .. } => false,
            Self::Io { .. } | Self::Workbook { .. } | Self::Custom { .. } => false,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingRequiredColumns { missing, .. } => {
                format!(
                    "{}\n\nSuggestion: add a header named {} to the sheet (matching ignores case and surrounding spaces)",
                    self,
                    missing.iter().map(|m| format!("'{}'", m)).collect::<Vec<_>>().join(" / ")
                )
            }
            Self::UnreadableFile { attempts, .. } => {
                let detail = attempts.iter()
                    .map(|a| format!("  {}", a))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n{}\n\nSuggestion: close the file in Excel and check it is a valid .xlsx/.xls workbook", self, detail)
            }
            Self::FolderNotFound { .. } => {
                format!("{}\n\nSuggestion: week folders must be named like 'Week of 04.21' or 'Week of 4.21'", self)
            }
            Self::InvalidDateKey { .. } => {
                format!("{}\n\nExpected format: MM.DD (e.g. '04.21')", self)
            }
            Self::Configuration { suggestion: Some(sug), .. } | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for MedAdhError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for MedAdhError {
    fn from(err: csv::Error) -> Self {
        let context = ErrorContext {
            row_number: err.position().map(|pos| pos.line() as usize),
            ..Default::default()
        };
        Self::CsvParse {
            message: err.to_string(),
            context,
        }
    }
}

impl From<calamine::Error> for MedAdhError {
    fn from(err: calamine::Error) -> Self {
        Self::Spreadsheet {
            message: err.to_string(),
            context: ErrorContext::default(),
        }
    }
}

impl From<calamine::XlsxError> for MedAdhError {
    fn from(err: calamine::XlsxError) -> Self {
        calamine::Error::from(err).into()
    }
}

impl From<calamine::XlsError> for MedAdhError {
    fn from(err: calamine::XlsError) -> Self {
        calamine::Error::from(err).into()
    }
}

impl From<rust_xlsxwriter::XlsxError> for MedAdhError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Workbook {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for MedAdhError {
    fn from(err: serde_json::Error) -> Self {
        Self::Custom {
            message: format!("JSON serialization failed: {}", err),
            suggestion: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_names_fields_and_location() {
        let err = MedAdhError::missing_columns(
            vec!["MarketCode".to_string(), "PayerMemberId".to_string()],
            ErrorContext::sheet("/tmp/04.21 AZ Med Adherence Escalations.xlsx", "Sheet1"),
        );
        let text = err.to_string();
        assert!(text.contains("MarketCode, PayerMemberId"));
        assert!(text.contains("file '04.21 AZ Med Adherence Escalations.xlsx'"));
        assert!(text.contains("sheet 'Sheet1'"));
    }

    #[test]
    fn test_recoverability_split() {
        assert!(MedAdhError::folder_not_found("04.21", Path::new("/data")).is_recoverable());
        assert!(MedAdhError::visualization("AZ", "no fonts").is_recoverable());
        assert!(!MedAdhError::invalid_date_key("13.40", "month out of range").is_recoverable());
    }

    #[test]
    fn test_csv_error_keeps_line_and_gains_path() {
        let data = "PayerMemberId,MarketCode\n1,AZ\n2\n";
        let mut reader = csv::ReaderBuilder::new().from_reader(data.as_bytes());
        let err = reader.records()
            .find_map(|r| r.err())
            .map(MedAdhError::from)
            .unwrap()
            .with_path(Path::new("/data/TX.csv"));

        match &err {
            MedAdhError::CsvParse { context, .. } => {
                assert_eq!(context.row_number, Some(3));
                assert_eq!(context.file_path.as_deref(), Some(Path::new("/data/TX.csv")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("file 'TX.csv', row 3"));
    }

    #[test]
    fn test_spreadsheet_error_names_sheet() {
        let err = MedAdhError::Spreadsheet { message: "bad range".into(), context: ErrorContext::default() }
            .with_path(Path::new("AZ.xlsx"))
            .in_sheet("Sheet1");
        assert_eq!(err.to_string(), "Spreadsheet error in file 'AZ.xlsx', sheet 'Sheet1': bad range");
    }

    #[test]
    fn test_unreadable_user_message_lists_attempts() {
        let err = MedAdhError::unreadable(Path::new("broken.xlsx"), vec![
            ReadAttempt { strategy: "xlsx".into(), message: "zip error".into() },
            ReadAttempt { strategy: "auto".into(), message: "unknown format".into() },
        ]);
        let msg = err.user_message();
        assert!(msg.contains("2 read strategies failed"));
        assert!(msg.contains("xlsx: zip error"));
        assert!(msg.contains("auto: unknown format"));
    }
}
