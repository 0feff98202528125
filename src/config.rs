/*!
 * Configuration support for escalation report runs
 *
 * A `ReportConfig` is an explicit value handed to every operation; there is
 * no global configuration. Values come from built-in defaults, an optional
 * TOML file, `MEDADH_*` environment variables and finally CLI flags, each
 * layer overriding the one before.
 */

use std::path::{Path, PathBuf};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::data_types::FieldRoles;
use crate::error::{ExportFormat, MedAdhError, Result};
use crate::export::ColumnWidthPolicy;
use crate::period::DiscoveryMode;
use crate::schema::WorklistSchema;

/// Configuration for one report run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory holding the "Week of MM.DD" folders
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Directory the market workbooks are written to
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Escalation categories kept by the record filter
    #[serde(default = "default_escalation_categories")]
    pub escalation_categories: Vec<String>,

    /// Fields resolved for primary reports
    #[serde(default = "default_full_columns")]
    pub full_columns: Vec<String>,

    /// Fields resolved for week-over-week comparison
    #[serde(default = "default_comparison_columns")]
    pub comparison_columns: Vec<String>,

    /// Fields every sheet must expose
    #[serde(default = "default_required_columns")]
    pub required_columns: Vec<String>,

    /// Fields normalized to MM/DD/YYYY in primary reports
    #[serde(default = "default_date_columns")]
    pub date_columns: Vec<String>,

    /// Sheet names never ingested
    #[serde(default = "default_skip_sheets")]
    pub skip_sheets: Vec<String>,

    /// Canonical fields carrying identifier, market, category, practice and provider
    #[serde(default)]
    pub roles: FieldRoles,

    #[serde(default)]
    pub discovery: DiscoveryMode,

    /// Market-family prefixes for fixed-name discovery
    #[serde(default = "default_market_prefixes")]
    pub market_prefixes: Vec<String>,

    /// Year used for week arithmetic and fixed file names (None = current year)
    #[serde(default)]
    pub year: Option<i32>,

    /// Whether to add week-over-week sheets
    #[serde(default = "default_true")]
    pub comparison: bool,

    /// Whether to render and embed the practice chart
    #[serde(default = "default_true")]
    pub chart: bool,

    /// Whether to show progress bars while loading
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,

    #[serde(default)]
    pub column_widths: ColumnWidthPolicy,

    /// Artifact format for market reports
    #[serde(default)]
    pub format: ExportFormat,
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("reports")
}

fn owned(items: Vec<&'static str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

fn default_escalation_categories() -> Vec<String> {
    owned(WorklistSchema::escalation_categories())
}

fn default_full_columns() -> Vec<String> {
    owned(WorklistSchema::full_columns())
}

fn default_comparison_columns() -> Vec<String> {
    owned(WorklistSchema::comparison_columns())
}

fn default_required_columns() -> Vec<String> {
    owned(WorklistSchema::required_columns())
}

fn default_date_columns() -> Vec<String> {
    owned(WorklistSchema::date_columns())
}

fn default_skip_sheets() -> Vec<String> {
    vec!["Validation_Lists".to_string()]
}

fn default_market_prefixes() -> Vec<String> {
    owned(vec!["AZ.CO.MI", "TX", "ATL.KY"])
}

fn default_true() -> bool {
    true
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            output_path: default_output_path(),
            escalation_categories: default_escalation_categories(),
            full_columns: default_full_columns(),
            comparison_columns: default_comparison_columns(),
            required_columns: default_required_columns(),
            date_columns: default_date_columns(),
            skip_sheets: default_skip_sheets(),
            roles: FieldRoles::default(),
            discovery: DiscoveryMode::default(),
            market_prefixes: default_market_prefixes(),
            year: None,
            comparison: true,
            chart: true,
            show_progress_bar: true,
            column_widths: ColumnWidthPolicy::default(),
            format: ExportFormat::default(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ReportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - `MEDADH_BASE_PATH`: input directory
    /// - `MEDADH_OUTPUT_PATH`: output directory
    /// - `MEDADH_DISCOVERY`: "pattern" or "fixed"
    /// - `MEDADH_COMPARISON`: "true" or "false"
    /// - `MEDADH_CHART`: "true" or "false"
    /// - `MEDADH_PROGRESS_BAR`: "true" or "false"
    /// - `MEDADH_YEAR`: four-digit year
    /// - `MEDADH_FORMAT`: "xlsx" or "json"
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MEDADH_BASE_PATH") {
            self.base_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("MEDADH_OUTPUT_PATH") {
            self.output_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("MEDADH_DISCOVERY") {
            match val.parse() {
                Ok(mode) => self.discovery = mode,
                Err(e) => log::warn!("Ignoring MEDADH_DISCOVERY: {}", e),
            }
        }

        if let Some(flag) = lookup("MEDADH_COMPARISON").as_deref().and_then(parse_bool) {
            self.comparison = flag;
        }

        if let Some(flag) = lookup("MEDADH_CHART").as_deref().and_then(parse_bool) {
            self.chart = flag;
        }

        if let Some(flag) = lookup("MEDADH_PROGRESS_BAR").as_deref().and_then(parse_bool) {
            self.show_progress_bar = flag;
        }

        if let Some(val) = lookup("MEDADH_YEAR") {
            match val.trim().parse() {
                Ok(year) => self.year = Some(year),
                Err(_) => log::warn!("Ignoring MEDADH_YEAR '{}': not a year", val),
            }
        }

        if let Some(val) = lookup("MEDADH_FORMAT") {
            match val.parse() {
                Ok(format) => self.format = format,
                Err(e) => log::warn!("Ignoring MEDADH_FORMAT: {}", e),
            }
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MedAdhError::from(e).with_path(path.as_ref()))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| MedAdhError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                suggestion: Some("Check that the file is valid TOML format".to_string()),
            })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| MedAdhError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                suggestion: None,
            })?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/medadh/config.toml` on Unix-like systems
    /// or `%APPDATA%\medadh\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "medadh")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Layer a config file (explicit, else the default location) and the
    /// environment over the built-in defaults
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (Self::default_config_path(), false),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = file {
            if required || file.exists() {
                builder = builder.add_source(
                    config::File::from(file)
                        .format(config::FileFormat::Toml)
                        .required(required),
                );
            }
        }

        let mut config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MedAdhError::Configuration {
                message: format!("Failed to load configuration: {}", e),
                suggestion: Some("Run `medadh config init` to write a default file".to_string()),
            })?;

        config.apply_env();
        Ok(config)
    }

    /// Year used when a week key needs a calendar date
    pub fn reference_year(&self) -> i32 {
        self.year.unwrap_or_else(|| chrono::Local::now().year())
    }

    /// Check the configuration is usable before any file is read
    pub fn validate(&self) -> Result<()> {
        if self.escalation_categories.is_empty() {
            return Err(MedAdhError::Configuration {
                message: "No escalation categories configured".to_string(),
                suggestion: Some("Set escalation_categories, e.g. [\"Practice Escalation\"]".to_string()),
            });
        }

        for (label, desired) in [("full_columns", &self.full_columns), ("comparison_columns", &self.comparison_columns)] {
            let absent: Vec<&str> = self.required_columns.iter()
                .filter(|r| !desired.iter().any(|d| d.eq_ignore_ascii_case(r)))
                .map(String::as_str)
                .collect();
            if !absent.is_empty() {
                return Err(MedAdhError::Configuration {
                    message: format!("Required columns [{}] are not in {}", absent.join(", "), label),
                    suggestion: Some(format!("Add them to {} or drop them from required_columns", label)),
                });
            }
        }

        if self.column_widths.min_width > self.column_widths.max_width {
            return Err(MedAdhError::Configuration {
                message: format!(
                    "Column width bounds are inverted: min {} > max {}",
                    self.column_widths.min_width, self.column_widths.max_width
                ),
                suggestion: None,
            });
        }

        if let Some(year) = self.year {
            if !(1900..=9999).contains(&year) {
                return Err(MedAdhError::Configuration {
                    message: format!("Year {} is out of range", year),
                    suggestion: Some("Use a four-digit year such as 2025".to_string()),
                });
            }
        }

        Ok(())
    }
}

/// Builder for customizing configuration
pub struct ConfigBuilder {
    config: ReportConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Start from the built-in defaults
    pub fn new() -> Self {
        Self {
            config: ReportConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn base_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.base_path = path.as_ref().to_path_buf();
        self
    }

    pub fn output_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.output_path = path.as_ref().to_path_buf();
        self
    }

    pub fn discovery(mut self, mode: DiscoveryMode) -> Self {
        self.config.discovery = mode;
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.config.year = Some(year);
        self
    }

    pub fn comparison(mut self, enabled: bool) -> Self {
        self.config.comparison = enabled;
        self
    }

    pub fn chart(mut self, enabled: bool) -> Self {
        self.config.chart = enabled;
        self
    }

    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.show_progress_bar = enabled;
        self
    }

    pub fn escalation_categories<S: AsRef<str>>(mut self, categories: &[S]) -> Self {
        self.config.escalation_categories = categories.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn market_prefixes<S: AsRef<str>>(mut self, prefixes: &[S]) -> Self {
        self.config.market_prefixes = prefixes.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn column_widths(mut self, widths: ColumnWidthPolicy) -> Self {
        self.config.column_widths = widths;
        self
    }

    pub fn format(mut self, format: ExportFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ReportConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = ReportConfig::default();
        assert!(config.comparison);
        assert!(config.chart);
        assert_eq!(config.discovery, DiscoveryMode::Pattern);
        assert_eq!(config.skip_sheets, vec!["Validation_Lists"]);
        assert_eq!(config.roles.member_id, "PayerMemberId");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .base_path("/data/dropzone")
            .output_path("/data/out")
            .discovery(DiscoveryMode::Fixed)
            .year(2024)
            .chart(false)
            .build();

        assert_eq!(config.base_path, PathBuf::from("/data/dropzone"));
        assert_eq!(config.discovery, DiscoveryMode::Fixed);
        assert_eq!(config.reference_year(), 2024);
        assert!(!config.chart);
        assert!(config.comparison);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MEDADH_OUTPUT_PATH", "/tmp/reports"),
            ("MEDADH_DISCOVERY", "fixed"),
            ("MEDADH_COMPARISON", "no"),
            ("MEDADH_YEAR", "2023"),
            ("MEDADH_CHART", "maybe"),
            ("MEDADH_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = ReportConfig::default();
        config.apply_env_with(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.output_path, PathBuf::from("/tmp/reports"));
        assert_eq!(config.discovery, DiscoveryMode::Fixed);
        assert!(!config.comparison);
        assert_eq!(config.year, Some(2023));
        assert_eq!(config.format, ExportFormat::Json);
        // unparseable flags leave the value alone
        assert!(config.chart);
    }

    #[test]
    fn test_toml_round_trip_and_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("medadh.toml");
        std::fs::write(&path, "base_path = \"/in\"\ndiscovery = \"fixed\"\n[column_widths]\nmax_width = 40\n").unwrap();

        let config = ReportConfig::from_file(&path).unwrap();
        assert_eq!(config.base_path, PathBuf::from("/in"));
        assert_eq!(config.discovery, DiscoveryMode::Fixed);
        assert_eq!(config.column_widths.max_width, 40);
        assert_eq!(config.column_widths.min_width, 8);
        assert_eq!(config.full_columns, ReportConfig::default().full_columns);

        let saved = dir.path().join("nested").join("saved.toml");
        config.save(&saved).unwrap();
        assert_eq!(ReportConfig::from_file(&saved).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_unreachable_required_columns() {
        let mut config = ReportConfig::default();
        config.comparison_columns.retain(|c| c != "MarketCode");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("comparison_columns"));
    }
}
