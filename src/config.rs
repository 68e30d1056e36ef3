use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::ReportResult;
use crate::routes::RouteCatalog;
use crate::sheets::SheetNaming;

pub const DEFAULT_TEMPLATE_PATH: &str = "PlantillaSegunda.xlsx";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// A required column: looked up by name, else taken from a fixed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// 0-based column position (column A = 0) used only when `name` is absent.
    pub fallback_index: usize,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, fallback_index: usize) -> Self {
        Self {
            name: name.into(),
            fallback_index,
        }
    }
}

/// Where an input sheet keeps its date, route and metric columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub sheet_name: String,
    pub date: ColumnSpec,
    pub route: ColumnSpec,
    pub metric: ColumnSpec,
    /// Label rows (read in the date column) that are not records.
    #[serde(default)]
    pub sentinel_labels: Vec<String>,
}

impl TableLayout {
    pub fn users() -> Self {
        Self {
            sheet_name: "Data Usuarios".to_string(),
            date: ColumnSpec::new("Fecha", 1),
            route: ColumnSpec::new("Ruta", 6),
            metric: ColumnSpec::new("Pax", 7),
            sentinel_labels: default_sentinels(),
        }
    }

    pub fn kilometers() -> Self {
        Self {
            sheet_name: "Data Kilometros".to_string(),
            date: ColumnSpec::new("Fecha", 1),
            route: ColumnSpec::new("Ruta", 6),
            metric: ColumnSpec::new("Km", 7),
            sentinel_labels: default_sentinels(),
        }
    }
}

fn default_sentinels() -> Vec<String> {
    vec!["Prom. Pax x Mes".to_string(), "Prom. Km x Mes".to_string()]
}

/// Everything that distinguishes one report variant from another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub template_path: PathBuf,
    pub halve_passenger_total: bool,
    pub users: TableLayout,
    pub kilometers: TableLayout,
    pub sheet_naming: SheetNaming,
    pub routes: RouteCatalog,
    /// Holidays on top of the national calendar.
    pub extra_holidays: Vec<NaiveDate>,
    pub max_upload_bytes: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            halve_passenger_total: true,
            users: TableLayout::users(),
            kilometers: TableLayout::kilometers(),
            sheet_naming: SheetNaming::default(),
            routes: RouteCatalog::default(),
            extra_holidays: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ReportConfig {
    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = path.into();
        self
    }
}

pub fn load_config_from_json<P: AsRef<Path>>(path: P) -> ReportResult<ReportConfig> {
    let file = File::open(path)?;
    let config: ReportConfig = serde_json::from_reader(file)?;
    Ok(config)
}

pub fn save_config_to_json<P: AsRef<Path>>(config: &ReportConfig, path: P) -> ReportResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}
